//! # Inventory Ledger
//!
//! The only code that writes `inventory.quantity_milli`.
//!
//! ## Adjustment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust_in(tx, product_id, delta, source, reason)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read current quantity (inside the caller's transaction)               │
//! │       │                                                                 │
//! │       ├── no record, no product ──────────────► NotFound               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  rules::check_adjustment(current, delta)                               │
//! │       ├── no record, delta < 0 ───────────────► NoSuchRecord           │
//! │       ├── current + delta < 0 ────────────────► WouldGoNegative        │
//! │       ▼                                                                 │
//! │  INSERT or UPDATE inventory                                            │
//! │       │                                                                 │
//! │       ├── source == Manual ──► append inventory_adjustments row        │
//! │       ▼                                                                 │
//! │  tx.emit(ProductStockChanged)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `adjust_in` never opens a transaction of its own. A sale that fails on
//! its third line rolls back the stock taken by the first two.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};
use tracing::{debug, info};

use crate::error::{DbResult, LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::repository::catalog;
use crate::store::LedgerStore;
use crate::tx::LedgerTx;
use tally_core::rules;
use tally_core::validation::validate_reason;
use tally_core::{InventoryAdjustment, InventoryRecord, Quantity, StockLevel, StockSource};

#[derive(Debug, sqlx::FromRow)]
struct StockLevelRow {
    product_id: i64,
    product_name: String,
    quantity_milli: i64,
}

impl From<StockLevelRow> for StockLevel {
    fn from(row: StockLevelRow) -> Self {
        StockLevel {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: Quantity::from_milli(row.quantity_milli),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    id: i64,
    product_id: i64,
    quantity_change_milli: i64,
    reason: String,
    date: DateTime<Utc>,
}

impl From<AdjustmentRow> for InventoryAdjustment {
    fn from(row: AdjustmentRow) -> Self {
        InventoryAdjustment {
            id: row.id,
            product_id: row.product_id,
            quantity_change: Quantity::from_milli(row.quantity_change_milli),
            reason: row.reason,
            date: row.date,
        }
    }
}

async fn fetch_quantity<'e, E>(executor: E, product_id: i64) -> DbResult<Option<Quantity>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let milli: Option<i64> =
        sqlx::query_scalar("SELECT quantity_milli FROM inventory WHERE product_id = ?1")
            .bind(product_id)
            .fetch_optional(executor)
            .await?;
    Ok(milli.map(Quantity::from_milli))
}

/// Stock operations.
///
/// ## Usage
/// ```rust,ignore
/// // Manual correction, audited:
/// store.inventory().adjust(product_id, "-2".parse()?, "breakage").await?;
///
/// // Stock-take:
/// store.inventory().set_absolute(product_id, "48".parse()?, "count 2024-06").await?;
/// ```
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    store: LedgerStore,
}

impl InventoryLedger {
    pub fn new(store: LedgerStore) -> Self {
        InventoryLedger { store }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Committed inventory record of a product, if it ever had stock.
    pub async fn get(&self, product_id: i64) -> LedgerResult<Option<InventoryRecord>> {
        let quantity = fetch_quantity(self.store.reader(), product_id).await?;
        Ok(quantity.map(|quantity| InventoryRecord {
            product_id,
            quantity,
        }))
    }

    /// Committed on-hand quantity, zero when there is no record.
    pub async fn quantity(&self, product_id: i64) -> LedgerResult<Quantity> {
        Ok(fetch_quantity(self.store.reader(), product_id)
            .await?
            .unwrap_or_default())
    }

    /// Inventory record as seen by the open transaction.
    pub async fn get_in(tx: &mut LedgerTx, product_id: i64) -> LedgerResult<Option<InventoryRecord>> {
        let quantity = fetch_quantity(tx.conn(), product_id).await?;
        Ok(quantity.map(|quantity| InventoryRecord {
            product_id,
            quantity,
        }))
    }

    /// Every product with its on-hand quantity (zero without a record).
    pub async fn list_inventory(&self) -> LedgerResult<Vec<StockLevel>> {
        let rows = sqlx::query_as::<_, StockLevelRow>(
            r#"
            SELECT
                p.id AS product_id,
                p.name AS product_name,
                COALESCE(i.quantity_milli, 0) AS quantity_milli
            FROM products p
            LEFT JOIN inventory i ON i.product_id = p.id
            ORDER BY p.name, p.id
            "#,
        )
        .fetch_all(self.store.reader())
        .await?;

        Ok(rows.into_iter().map(StockLevel::from).collect())
    }

    /// Manual adjustment history of a product, newest first.
    pub async fn adjustments(&self, product_id: i64) -> LedgerResult<Vec<InventoryAdjustment>> {
        let rows = sqlx::query_as::<_, AdjustmentRow>(
            r#"
            SELECT id, product_id, quantity_change_milli, reason, date
            FROM inventory_adjustments
            WHERE product_id = ?1
            ORDER BY id DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(self.store.reader())
        .await?;

        Ok(rows.into_iter().map(InventoryAdjustment::from).collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Applies a manual, audited stock change in its own transaction.
    /// Returns the new on-hand quantity.
    pub async fn adjust(&self, product_id: i64, delta: Quantity, reason: &str) -> LedgerResult<Quantity> {
        validate_reason(reason)?;
        let reason = reason.to_string();

        let new = self
            .store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    Self::adjust_in(tx, product_id, delta, StockSource::Manual, &reason).await
                })
            })
            .await?;

        info!(product_id, delta = %delta, quantity = %new, "Inventory adjusted");
        Ok(new)
    }

    /// Sets the on-hand quantity to `target` (stock-take correction).
    /// Recorded as an adjustment of `target - current`.
    pub async fn set_absolute(&self, product_id: i64, target: Quantity, reason: &str) -> LedgerResult<Quantity> {
        validate_reason(reason)?;
        let reason = reason.to_string();

        let new = self
            .store
            .with_transaction(move |tx| {
                Box::pin(async move { Self::set_absolute_in(tx, product_id, target, &reason).await })
            })
            .await?;

        info!(product_id, quantity = %new, "Inventory set");
        Ok(new)
    }

    /// Applies `delta` to a product's stock inside the caller's transaction.
    ///
    /// `reason` is only stored (and required) for [`StockSource::Manual`].
    /// A zero delta changes nothing.
    pub async fn adjust_in(
        tx: &mut LedgerTx,
        product_id: i64,
        delta: Quantity,
        source: StockSource,
        reason: &str,
    ) -> LedgerResult<Quantity> {
        if source.records_adjustment() {
            validate_reason(reason)?;
        }

        let current = fetch_quantity(tx.conn(), product_id).await?;
        if current.is_none() && !catalog::product_exists(tx.conn(), product_id).await? {
            return Err(LedgerError::not_found("Product", product_id));
        }
        if delta.is_zero() {
            return Ok(current.unwrap_or_default());
        }

        let new = rules::check_adjustment(product_id, current, delta)?;

        if current.is_some() {
            sqlx::query("UPDATE inventory SET quantity_milli = ?1 WHERE product_id = ?2")
                .bind(new.milli())
                .bind(product_id)
                .execute(tx.conn())
                .await?;
        } else {
            sqlx::query("INSERT INTO inventory (product_id, quantity_milli) VALUES (?1, ?2)")
                .bind(product_id)
                .bind(new.milli())
                .execute(tx.conn())
                .await?;
        }

        if source.records_adjustment() {
            sqlx::query(
                r#"
                INSERT INTO inventory_adjustments (product_id, quantity_change_milli, reason, date)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(product_id)
            .bind(delta.milli())
            .bind(reason.trim())
            .bind(Utc::now())
            .execute(tx.conn())
            .await?;
        }

        debug!(product_id, delta = %delta, quantity = %new, ?source, "Stock adjusted");
        tx.emit(LedgerEvent::ProductStockChanged { product_id });
        Ok(new)
    }

    /// Stock-take inside the caller's transaction. A negative target fails
    /// the same non-negativity check as any other adjustment.
    pub async fn set_absolute_in(
        tx: &mut LedgerTx,
        product_id: i64,
        target: Quantity,
        reason: &str,
    ) -> LedgerResult<Quantity> {
        let current = fetch_quantity(tx.conn(), product_id)
            .await?
            .unwrap_or_default();
        let delta = target
            .checked_sub(current)
            .ok_or_else(|| tally_core::ValidationError::Overflow {
                field: "quantity".to_string(),
            })?;
        Self::adjust_in(tx, product_id, delta, StockSource::Manual, reason).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::test_support::{on_hand, open_store, qty, seed_product, stock};
    use tally_core::{InventoryError, ValidationError};

    #[tokio::test]
    async fn test_first_adjustment_creates_record_and_audit_row() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Flour", 40, 60).await;
        assert!(store.inventory().get(id).await.unwrap().is_none());

        let new = store.inventory().adjust(id, qty("12.5"), "delivery count").await.unwrap();
        assert_eq!(new, qty("12.5"));

        let record = store.inventory().get(id).await.unwrap().unwrap();
        assert_eq!(record.quantity, qty("12.500"));

        let audit = store.inventory().adjustments(id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].quantity_change, qty("12.5"));
        assert_eq!(audit[0].reason, "delivery count");
    }

    #[tokio::test]
    async fn test_would_go_negative_leaves_stock_unchanged() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Sugar", 40, 60).await;
        stock(&store, id, 3).await;

        let result = store.inventory().adjust(id, qty("-3.001"), "breakage").await;
        assert!(matches!(
            result,
            Err(LedgerError::Inventory(InventoryError::WouldGoNegative { product_id, .. })) if product_id == id
        ));
        assert_eq!(on_hand(&store, id).await, qty("3"));
        assert_eq!(store.inventory().adjustments(id).await.unwrap().len(), 1);

        // Exactly to zero is allowed.
        let new = store.inventory().adjust(id, qty("-3"), "breakage").await.unwrap();
        assert!(new.is_zero());
    }

    #[tokio::test]
    async fn test_decrement_without_record() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Salt", 10, 20).await;

        let result = store.inventory().adjust(id, qty("-1"), "sold").await;
        assert!(matches!(
            result,
            Err(LedgerError::Inventory(InventoryError::NoSuchRecord { .. }))
        ));
        assert!(store.inventory().get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_product_and_missing_reason() {
        let (_dir, store) = open_store().await;
        assert!(matches!(
            store.inventory().adjust(404, qty("1"), "count").await,
            Err(LedgerError::NotFound { id: 404, .. })
        ));

        let id = seed_product(&store, "Rice", 10, 20).await;
        assert!(matches!(
            store.inventory().adjust(id, qty("1"), "   ").await,
            Err(LedgerError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_set_absolute_records_delta() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Oil", 100, 150).await;
        stock(&store, id, 10).await;

        let new = store.inventory().set_absolute(id, qty("7.25"), "stock-take").await.unwrap();
        assert_eq!(new, qty("7.25"));

        let audit = store.inventory().adjustments(id).await.unwrap();
        assert_eq!(audit[0].quantity_change, qty("-2.75"));

        let result = store.inventory().set_absolute(id, qty("-1"), "stock-take").await;
        assert!(matches!(
            result,
            Err(LedgerError::Inventory(InventoryError::WouldGoNegative { .. }))
        ));
        assert_eq!(on_hand(&store, id).await, qty("7.25"));
    }

    #[tokio::test]
    async fn test_sale_source_is_not_audited() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Tea", 10, 20).await;
        stock(&store, id, 5).await;

        store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    InventoryLedger::adjust_in(tx, id, qty("-2"), StockSource::Sale, "").await
                })
            })
            .await
            .unwrap();

        assert_eq!(on_hand(&store, id).await, qty("3"));
        assert_eq!(store.inventory().adjustments(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stock_changed_event_after_commit() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Coffee", 10, 20).await;
        let mut rx = store.subscribe();

        stock(&store, id, 2).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            LedgerEvent::ProductStockChanged { product_id: id }
        );

        let _ = store.inventory().adjust(id, qty("-5"), "oops").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_schema_rejects_negative_stock() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Milk", 10, 20).await;
        stock(&store, id, 1).await;

        let result: LedgerResult<()> = store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    sqlx::query("UPDATE inventory SET quantity_milli = -1 WHERE product_id = ?1")
                        .bind(id)
                        .execute(tx.conn())
                        .await?;
                    Ok(())
                })
            })
            .await;

        match result {
            Err(LedgerError::Store(DbError::CheckViolation { constraint })) => {
                assert_eq!(constraint, "inventory_quantity_non_negative");
            }
            other => panic!("expected check violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_inventory_includes_products_without_stock() {
        let (_dir, store) = open_store().await;
        let a = seed_product(&store, "Apples", 10, 20).await;
        let b = seed_product(&store, "Bananas", 10, 20).await;
        stock(&store, a, 4).await;

        let levels = store.inventory().list_inventory().await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!((levels[0].product_id, levels[0].quantity), (a, qty("4")));
        assert_eq!((levels[1].product_id, levels[1].quantity), (b, Quantity::zero()));
    }

    #[tokio::test]
    async fn test_random_sequence_never_goes_negative() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Nails", 1, 2).await;
        stock(&store, id, 10).await;

        // Deterministic pseudo-random walk of deltas in [-6.000, +5.999].
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut expected = qty("10");
        for _ in 0..60 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let delta = Quantity::from_milli((seed % 12_000) as i64 - 6_000);

            let result = store.inventory().adjust(id, delta, "walk").await;
            match expected.checked_add(delta) {
                Some(next) if !next.is_negative() => {
                    assert_eq!(result.unwrap(), next);
                    expected = next;
                }
                _ => assert!(result.is_err()),
            }
            let actual = on_hand(&store, id).await;
            assert_eq!(actual, expected);
            assert!(!actual.is_negative());
        }
    }
}
