//! # Purchase Service
//!
//! Goods received from suppliers. The mirror image of a sale: stock goes
//! up, and every line refreshes the product's `cost_price`.
//!
//! ```text
//! create ──► INSERT header + items ──► adjust_in(+qty) ──► cost_price = price
//! update ──► net delta of old vs new lines ──► replace items ──► cost_price
//! delete ──► adjust_in(-qty) (may fail: stock already sold) ──► DELETE
//! ```
//!
//! Purchases have no edit window. Deleting a purchase does not restore
//! earlier cost prices.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, Sqlite};
use tracing::{debug, info};

use crate::error::{DbResult, LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::repository::catalog;
use crate::repository::inventory::InventoryLedger;
use crate::store::LedgerStore;
use crate::tx::LedgerTx;
use tally_core::arithmetic::{aggregate_totals, line_total, purchase_line_amounts};
use tally_core::rules::net_stock_deltas;
use tally_core::validation::{validate_purchase_lines, validate_supplier};
use tally_core::{
    LineAmounts, Money, Purchase, PurchaseItem, PurchaseLine, Quantity, StockSource, ValidationError,
};

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: i64,
    supplier: String,
    date: DateTime<Utc>,
    total_amount: i64,
}

impl From<PurchaseRow> for Purchase {
    fn from(row: PurchaseRow) -> Self {
        Purchase {
            id: row.id,
            supplier: row.supplier,
            date: row.date,
            total_amount: Money::from_units(row.total_amount),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseItemRow {
    id: i64,
    purchase_id: i64,
    product_id: i64,
    quantity_milli: i64,
    price: i64,
    line_total: i64,
}

impl From<PurchaseItemRow> for PurchaseItem {
    fn from(row: PurchaseItemRow) -> Self {
        PurchaseItem {
            id: row.id,
            purchase_id: row.purchase_id,
            product_id: row.product_id,
            quantity: Quantity::from_milli(row.quantity_milli),
            price: Money::from_units(row.price),
            line_total: Money::from_units(row.line_total),
        }
    }
}

async fn fetch_purchase<'e, E>(executor: E, purchase_id: i64) -> DbResult<Option<Purchase>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, PurchaseRow>(
        "SELECT id, supplier, date, total_amount FROM purchases WHERE id = ?1",
    )
    .bind(purchase_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Purchase::from))
}

async fn fetch_items<'e, E>(executor: E, purchase_id: i64) -> DbResult<Vec<PurchaseItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, PurchaseItemRow>(
        r#"
        SELECT id, purchase_id, product_id, quantity_milli, price, line_total
        FROM purchase_items
        WHERE purchase_id = ?1
        ORDER BY id
        "#,
    )
    .bind(purchase_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(PurchaseItem::from).collect())
}

/// Purchase operations.
#[derive(Debug, Clone)]
pub struct PurchaseService {
    store: LedgerStore,
}

impl PurchaseService {
    pub fn new(store: LedgerStore) -> Self {
        PurchaseService { store }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, purchase_id: i64) -> LedgerResult<Option<Purchase>> {
        Ok(fetch_purchase(self.store.reader(), purchase_id).await?)
    }

    pub async fn items(&self, purchase_id: i64) -> LedgerResult<Vec<PurchaseItem>> {
        Ok(fetch_items(self.store.reader(), purchase_id).await?)
    }

    /// Purchases dated within `start..=end` (UTC days), oldest first.
    pub async fn list(&self, start: NaiveDate, end: NaiveDate) -> LedgerResult<Vec<Purchase>> {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }

        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, supplier, date, total_amount
            FROM purchases
            WHERE date(date) BETWEEN ?1 AND ?2
            ORDER BY date, id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.store.reader())
        .await?;

        Ok(rows.into_iter().map(Purchase::from).collect())
    }

    /// Distinct supplier names, alphabetically.
    pub async fn suppliers(&self) -> LedgerResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT DISTINCT supplier FROM purchases ORDER BY supplier")
            .fetch_all(self.store.reader())
            .await?;
        Ok(names)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn create(
        &self,
        supplier: &str,
        date: DateTime<Utc>,
        lines: &[PurchaseLine],
    ) -> LedgerResult<i64> {
        validate_supplier(supplier)?;
        validate_purchase_lines(lines, &self.store.settings().purchase_limits())?;
        let supplier = supplier.to_string();
        let lines = lines.to_vec();

        let purchase_id = self
            .store
            .with_transaction(move |tx| {
                Box::pin(async move { Self::create_in(tx, &supplier, date, &lines).await })
            })
            .await?;

        info!(purchase_id, "Purchase committed");
        Ok(purchase_id)
    }

    pub async fn update(
        &self,
        purchase_id: i64,
        supplier: &str,
        date: DateTime<Utc>,
        lines: &[PurchaseLine],
    ) -> LedgerResult<()> {
        validate_supplier(supplier)?;
        validate_purchase_lines(lines, &self.store.settings().purchase_limits())?;
        let supplier = supplier.to_string();
        let lines = lines.to_vec();

        self.store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    Self::update_in(tx, purchase_id, &supplier, date, &lines).await
                })
            })
            .await?;

        info!(purchase_id, "Purchase updated");
        Ok(())
    }

    /// Deletes a purchase and takes its stock back out. Fails with
    /// `WouldGoNegative` when part of that stock has been sold since.
    pub async fn delete(&self, purchase_id: i64) -> LedgerResult<()> {
        self.store
            .with_transaction(move |tx| Box::pin(async move { Self::delete_in(tx, purchase_id).await }))
            .await?;

        info!(purchase_id, "Purchase deleted");
        Ok(())
    }

    // =========================================================================
    // Transaction Bodies
    // =========================================================================

    pub async fn create_in(
        tx: &mut LedgerTx,
        supplier: &str,
        date: DateTime<Utc>,
        lines: &[PurchaseLine],
    ) -> LedgerResult<i64> {
        validate_supplier(supplier)?;
        validate_purchase_lines(lines, &tx.settings().purchase_limits())?;
        ensure_products(tx, lines).await?;

        let amounts = price_lines(lines)?;
        let totals = aggregate_totals(&amounts)?;

        let purchase_id = sqlx::query(
            "INSERT INTO purchases (supplier, date, total_amount) VALUES (?1, ?2, ?3)",
        )
        .bind(supplier.trim())
        .bind(date)
        .bind(totals.total_amount.units())
        .execute(tx.conn())
        .await?
        .last_insert_rowid();

        debug!(purchase_id, lines = lines.len(), "Inserted purchase header");

        insert_items(tx, purchase_id, lines, &amounts).await?;
        for line in lines {
            InventoryLedger::adjust_in(tx, line.product_id, line.quantity, StockSource::Purchase, "")
                .await?;
        }
        refresh_cost_prices(tx, lines).await?;

        verify_totals(tx, purchase_id).await?;
        tx.emit(LedgerEvent::PurchaseCommitted { purchase_id });
        Ok(purchase_id)
    }

    pub async fn update_in(
        tx: &mut LedgerTx,
        purchase_id: i64,
        supplier: &str,
        date: DateTime<Utc>,
        lines: &[PurchaseLine],
    ) -> LedgerResult<()> {
        validate_supplier(supplier)?;
        validate_purchase_lines(lines, &tx.settings().purchase_limits())?;

        if fetch_purchase(tx.conn(), purchase_id).await?.is_none() {
            return Err(LedgerError::not_found("Purchase", purchase_id));
        }
        ensure_products(tx, lines).await?;

        let old_items = fetch_items(tx.conn(), purchase_id).await?;
        let amounts = price_lines(lines)?;
        let totals = aggregate_totals(&amounts)?;

        let deltas = net_stock_deltas(
            old_items.iter().map(|item| (item.product_id, item.quantity)),
            lines.iter().map(|line| (line.product_id, line.quantity)),
        )?;
        for (product_id, delta) in deltas {
            InventoryLedger::adjust_in(tx, product_id, delta, StockSource::Purchase, "").await?;
        }

        sqlx::query("DELETE FROM purchase_items WHERE purchase_id = ?1")
            .bind(purchase_id)
            .execute(tx.conn())
            .await?;
        insert_items(tx, purchase_id, lines, &amounts).await?;
        refresh_cost_prices(tx, lines).await?;

        sqlx::query("UPDATE purchases SET supplier = ?1, date = ?2, total_amount = ?3 WHERE id = ?4")
            .bind(supplier.trim())
            .bind(date)
            .bind(totals.total_amount.units())
            .bind(purchase_id)
            .execute(tx.conn())
            .await?;

        debug!(purchase_id, replaced = old_items.len(), lines = lines.len(), "Rewrote purchase");

        verify_totals(tx, purchase_id).await?;
        tx.emit(LedgerEvent::PurchaseUpdated { purchase_id });
        Ok(())
    }

    pub async fn delete_in(tx: &mut LedgerTx, purchase_id: i64) -> LedgerResult<()> {
        if fetch_purchase(tx.conn(), purchase_id).await?.is_none() {
            return Err(LedgerError::not_found("Purchase", purchase_id));
        }

        let items = fetch_items(tx.conn(), purchase_id).await?;
        let deltas = net_stock_deltas(
            items.iter().map(|item| (item.product_id, item.quantity)),
            std::iter::empty(),
        )?;
        for (product_id, delta) in deltas {
            InventoryLedger::adjust_in(tx, product_id, delta, StockSource::Purchase, "").await?;
        }

        sqlx::query("DELETE FROM purchase_items WHERE purchase_id = ?1")
            .bind(purchase_id)
            .execute(tx.conn())
            .await?;
        sqlx::query("DELETE FROM purchases WHERE id = ?1")
            .bind(purchase_id)
            .execute(tx.conn())
            .await?;

        debug!(purchase_id, lines = items.len(), "Deleted purchase");
        tx.emit(LedgerEvent::PurchaseDeleted { purchase_id });
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn ensure_products(tx: &mut LedgerTx, lines: &[PurchaseLine]) -> LedgerResult<()> {
    for line in lines {
        if !catalog::product_exists(tx.conn(), line.product_id).await? {
            return Err(LedgerError::not_found("Product", line.product_id));
        }
    }
    Ok(())
}

fn price_lines(lines: &[PurchaseLine]) -> LedgerResult<Vec<LineAmounts>> {
    lines
        .iter()
        .map(|line| purchase_line_amounts(line).map_err(LedgerError::from))
        .collect()
}

async fn insert_items(
    tx: &mut LedgerTx,
    purchase_id: i64,
    lines: &[PurchaseLine],
    amounts: &[LineAmounts],
) -> LedgerResult<()> {
    for (line, amount) in lines.iter().zip(amounts) {
        sqlx::query(
            r#"
            INSERT INTO purchase_items (purchase_id, product_id, quantity_milli, price, line_total)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(purchase_id)
        .bind(line.product_id)
        .bind(line.quantity.milli())
        .bind(line.price.units())
        .bind(amount.line_total.units())
        .execute(tx.conn())
        .await?;
    }
    Ok(())
}

/// Last line wins when a product appears more than once.
async fn refresh_cost_prices(tx: &mut LedgerTx, lines: &[PurchaseLine]) -> LedgerResult<()> {
    for line in lines {
        sqlx::query("UPDATE products SET cost_price = ?1 WHERE id = ?2")
            .bind(line.price.units())
            .bind(line.product_id)
            .execute(tx.conn())
            .await?;
    }
    Ok(())
}

async fn verify_totals(tx: &mut LedgerTx, purchase_id: i64) -> LedgerResult<Money> {
    let purchase = fetch_purchase(tx.conn(), purchase_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Purchase", purchase_id))?;
    let items = fetch_items(tx.conn(), purchase_id).await?;

    let mut sum = Money::zero();
    for item in &items {
        let expected = line_total(item.quantity, item.price)?;
        if expected != item.line_total {
            return Err(LedgerError::Consistency {
                entity: "Purchase".to_string(),
                id: purchase_id,
                detail: format!("item {} line_total {} != {}", item.id, item.line_total, expected),
            });
        }
        sum += item.line_total;
    }

    if sum != purchase.total_amount {
        return Err(LedgerError::Consistency {
            entity: "Purchase".to_string(),
            id: purchase_id,
            detail: format!("header {} != lines {}", purchase.total_amount, sum),
        });
    }
    Ok(sum)
}

// =============================================================================
// Unit Tests
// =============================================================================
