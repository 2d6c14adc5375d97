//! # Sale Service
//!
//! Sales as atomic units: header, lines and stock decrements commit
//! together or not at all.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (one transaction)                                           │
//! │     └── validate lines → price lines at current cost                   │
//! │     └── INSERT header (receipt YYYYMMDD-NNNN) + items                  │
//! │     └── adjust_in(-qty) per line                                       │
//! │     └── verify header == Σ lines → COMMIT → SaleCommitted              │
//! │                                                                         │
//! │  2. EDIT (within edit_window_hours of the date first recorded)         │
//! │     └── net stock delta of old vs new lines, applied once              │
//! │     └── replace items, rewrite header, verify → SaleUpdated            │
//! │                                                                         │
//! │  3. VOID (within the window)                                           │
//! │     └── +qty back per line, delete items + header → SaleVoided         │
//! │                                                                         │
//! │  Past the window the sale is immutable: EditWindowExpired.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line profit is frozen at the product's cost when the line is written.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, Sqlite};
use tracing::{debug, info};

use crate::error::{DbResult, LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::repository::catalog;
use crate::repository::inventory::InventoryLedger;
use crate::store::LedgerStore;
use crate::tx::LedgerTx;
use tally_core::arithmetic::{aggregate_totals, line_total, sale_line_amounts};
use tally_core::rules::{self, check_edit_window, net_stock_deltas};
use tally_core::validation::validate_sale_lines;
use tally_core::{
    EditState, LineAmounts, Money, Quantity, Sale, SaleItem, SaleLine, StockSource, Totals,
    ValidationError,
};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i64,
    customer_id: Option<i64>,
    date: DateTime<Utc>,
    total_amount: i64,
    total_profit: i64,
    receipt_id: Option<String>,
}

impl From<SaleRow> for Sale {
    fn from(row: SaleRow) -> Self {
        Sale {
            id: row.id,
            customer_id: row.customer_id,
            date: row.date,
            total_amount: Money::from_units(row.total_amount),
            total_profit: Money::from_units(row.total_profit),
            receipt_id: row.receipt_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: i64,
    sale_id: i64,
    product_id: i64,
    quantity_milli: i64,
    price: i64,
    line_total: i64,
    profit: i64,
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        SaleItem {
            id: row.id,
            sale_id: row.sale_id,
            product_id: row.product_id,
            quantity: Quantity::from_milli(row.quantity_milli),
            price: Money::from_units(row.price),
            line_total: Money::from_units(row.line_total),
            profit: Money::from_units(row.profit),
        }
    }
}

async fn fetch_sale<'e, E>(executor: E, sale_id: i64) -> DbResult<Option<Sale>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, SaleRow>(
        r#"
        SELECT id, customer_id, date, total_amount, total_profit, receipt_id
        FROM sales
        WHERE id = ?1
        "#,
    )
    .bind(sale_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Sale::from))
}

/// Sale date as first recorded. Edits may change `date`, never this.
async fn fetch_recorded_date<'e, E>(executor: E, sale_id: i64) -> DbResult<Option<DateTime<Utc>>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let recorded = sqlx::query_scalar("SELECT recorded_date FROM sales WHERE id = ?1")
        .bind(sale_id)
        .fetch_optional(executor)
        .await?;
    Ok(recorded)
}

async fn fetch_items<'e, E>(executor: E, sale_id: i64) -> DbResult<Vec<SaleItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, SaleItemRow>(
        r#"
        SELECT id, sale_id, product_id, quantity_milli, price, line_total, profit
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY id
        "#,
    )
    .bind(sale_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(SaleItem::from).collect())
}

// =============================================================================
// Service
// =============================================================================

/// Sale operations.
///
/// ## Usage
/// ```rust,ignore
/// let sale_id = store.sales().create(Some(customer_id), Utc::now(), &[SaleLine {
///     product_id: cola,
///     quantity: "2".parse()?,
///     price: Money::from_units(1000),
/// }]).await?;
///
/// store.sales().delete(sale_id).await?; // void, stock goes back
/// ```
#[derive(Debug, Clone)]
pub struct SaleService {
    store: LedgerStore,
}

impl SaleService {
    pub fn new(store: LedgerStore) -> Self {
        SaleService { store }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, sale_id: i64) -> LedgerResult<Option<Sale>> {
        Ok(fetch_sale(self.store.reader(), sale_id).await?)
    }

    /// Lines of a sale in insertion order.
    pub async fn items(&self, sale_id: i64) -> LedgerResult<Vec<SaleItem>> {
        Ok(fetch_items(self.store.reader(), sale_id).await?)
    }

    /// Sales whose date falls within `start..=end` (UTC days), oldest first.
    pub async fn list(&self, start: NaiveDate, end: NaiveDate) -> LedgerResult<Vec<Sale>> {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }

        let rows = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, customer_id, date, total_amount, total_profit, receipt_id
            FROM sales
            WHERE date(date) BETWEEN ?1 AND ?2
            ORDER BY date, id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.store.reader())
        .await?;

        Ok(rows.into_iter().map(Sale::from).collect())
    }

    /// Whether the sale may still be edited or voided now.
    pub async fn edit_state(&self, sale_id: i64) -> LedgerResult<EditState> {
        let recorded = fetch_recorded_date(self.store.reader(), sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        Ok(rules::edit_state(
            recorded,
            Utc::now(),
            self.store.settings().edit_window_hours,
        ))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Records a sale and takes its stock. Returns the new sale id.
    pub async fn create(
        &self,
        customer_id: Option<i64>,
        date: DateTime<Utc>,
        lines: &[SaleLine],
    ) -> LedgerResult<i64> {
        validate_sale_lines(lines, &self.store.settings().sale_limits())?;
        let lines = lines.to_vec();

        let sale_id = self
            .store
            .with_transaction(move |tx| {
                Box::pin(async move { Self::create_in(tx, customer_id, date, &lines).await })
            })
            .await?;

        info!(sale_id, "Sale committed");
        Ok(sale_id)
    }

    /// Replaces the customer, date and lines of a sale inside its edit
    /// window. The receipt id is kept.
    pub async fn update(
        &self,
        sale_id: i64,
        customer_id: Option<i64>,
        date: DateTime<Utc>,
        lines: &[SaleLine],
    ) -> LedgerResult<()> {
        validate_sale_lines(lines, &self.store.settings().sale_limits())?;
        let lines = lines.to_vec();

        self.store
            .with_transaction(move |tx| {
                Box::pin(async move { Self::update_in(tx, sale_id, customer_id, date, &lines).await })
            })
            .await?;

        info!(sale_id, "Sale updated");
        Ok(())
    }

    /// Voids a sale inside its edit window, returning its stock.
    pub async fn delete(&self, sale_id: i64) -> LedgerResult<()> {
        self.store
            .with_transaction(move |tx| Box::pin(async move { Self::delete_in(tx, sale_id).await }))
            .await?;

        info!(sale_id, "Sale voided");
        Ok(())
    }

    // =========================================================================
    // Transaction Bodies
    // =========================================================================

    /// Creates a sale inside the caller's transaction.
    pub async fn create_in(
        tx: &mut LedgerTx,
        customer_id: Option<i64>,
        date: DateTime<Utc>,
        lines: &[SaleLine],
    ) -> LedgerResult<i64> {
        validate_sale_lines(lines, &tx.settings().sale_limits())?;
        ensure_customer(tx, customer_id).await?;

        let amounts = price_lines(tx, lines).await?;
        let totals = aggregate_totals(&amounts)?;
        let receipt_id = next_receipt_id(tx, date).await?;

        let sale_id = sqlx::query(
            r#"
            INSERT INTO sales (customer_id, date, recorded_date, total_amount, total_profit, receipt_id)
            VALUES (?1, ?2, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(customer_id)
        .bind(date)
        .bind(totals.total_amount.units())
        .bind(totals.total_profit.units())
        .bind(&receipt_id)
        .execute(tx.conn())
        .await?
        .last_insert_rowid();

        debug!(sale_id, receipt_id = %receipt_id, lines = lines.len(), "Inserted sale header");

        insert_items(tx, sale_id, lines, &amounts).await?;
        for line in lines {
            InventoryLedger::adjust_in(tx, line.product_id, -line.quantity, StockSource::Sale, "")
                .await?;
        }

        verify_totals(tx, sale_id).await?;
        tx.emit(LedgerEvent::SaleCommitted { sale_id });
        Ok(sale_id)
    }

    /// Updates a sale inside the caller's transaction.
    pub async fn update_in(
        tx: &mut LedgerTx,
        sale_id: i64,
        customer_id: Option<i64>,
        date: DateTime<Utc>,
        lines: &[SaleLine],
    ) -> LedgerResult<()> {
        validate_sale_lines(lines, &tx.settings().sale_limits())?;

        let recorded = fetch_recorded_date(tx.conn(), sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        check_edit_window(sale_id, recorded, Utc::now(), tx.settings().edit_window_hours)?;
        ensure_customer(tx, customer_id).await?;

        let old_items = fetch_items(tx.conn(), sale_id).await?;
        let amounts = price_lines(tx, lines).await?;
        let totals = aggregate_totals(&amounts)?;

        let deltas = net_stock_deltas(
            old_items.iter().map(|item| (item.product_id, -item.quantity)),
            lines.iter().map(|line| (line.product_id, -line.quantity)),
        )?;
        for (product_id, delta) in deltas {
            InventoryLedger::adjust_in(tx, product_id, delta, StockSource::Sale, "").await?;
        }

        sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(tx.conn())
            .await?;
        insert_items(tx, sale_id, lines, &amounts).await?;

        sqlx::query(
            r#"
            UPDATE sales
            SET customer_id = ?1, date = ?2, total_amount = ?3, total_profit = ?4
            WHERE id = ?5
            "#,
        )
        .bind(customer_id)
        .bind(date)
        .bind(totals.total_amount.units())
        .bind(totals.total_profit.units())
        .bind(sale_id)
        .execute(tx.conn())
        .await?;

        debug!(sale_id, replaced = old_items.len(), lines = lines.len(), "Rewrote sale");

        verify_totals(tx, sale_id).await?;
        tx.emit(LedgerEvent::SaleUpdated { sale_id });
        Ok(())
    }

    /// Voids a sale inside the caller's transaction.
    pub async fn delete_in(tx: &mut LedgerTx, sale_id: i64) -> LedgerResult<()> {
        let recorded = fetch_recorded_date(tx.conn(), sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        check_edit_window(sale_id, recorded, Utc::now(), tx.settings().edit_window_hours)?;

        let items = fetch_items(tx.conn(), sale_id).await?;
        let deltas = net_stock_deltas(
            items.iter().map(|item| (item.product_id, -item.quantity)),
            std::iter::empty(),
        )?;
        for (product_id, delta) in deltas {
            InventoryLedger::adjust_in(tx, product_id, delta, StockSource::Sale, "").await?;
        }

        sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(tx.conn())
            .await?;
        sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(sale_id)
            .execute(tx.conn())
            .await?;

        debug!(sale_id, lines = items.len(), "Deleted sale");
        tx.emit(LedgerEvent::SaleVoided { sale_id });
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn ensure_customer(tx: &mut LedgerTx, customer_id: Option<i64>) -> LedgerResult<()> {
    if let Some(id) = customer_id {
        if !catalog::customer_exists(tx.conn(), id).await? {
            return Err(LedgerError::not_found("Customer", id));
        }
    }
    Ok(())
}

/// Rounded amounts of every line, priced at each product's current cost.
async fn price_lines(tx: &mut LedgerTx, lines: &[SaleLine]) -> LedgerResult<Vec<LineAmounts>> {
    let mut costs: HashMap<i64, Money> = HashMap::new();
    let mut amounts = Vec::with_capacity(lines.len());

    for line in lines {
        let cost = match costs.get(&line.product_id) {
            Some(cost) => *cost,
            None => {
                let cost = catalog::product_cost(tx.conn(), line.product_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Product", line.product_id))?;
                costs.insert(line.product_id, cost);
                cost
            }
        };
        amounts.push(sale_line_amounts(line, Some(cost))?);
    }

    Ok(amounts)
}

async fn insert_items(
    tx: &mut LedgerTx,
    sale_id: i64,
    lines: &[SaleLine],
    amounts: &[LineAmounts],
) -> LedgerResult<()> {
    for (line, amount) in lines.iter().zip(amounts) {
        sqlx::query(
            r#"
            INSERT INTO sale_items (sale_id, product_id, quantity_milli, price, line_total, profit)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(sale_id)
        .bind(line.product_id)
        .bind(line.quantity.milli())
        .bind(line.price.units())
        .bind(amount.line_total.units())
        .bind(amount.profit.units())
        .execute(tx.conn())
        .await?;
    }
    Ok(())
}

/// Next receipt id for the sale's day: `YYYYMMDD-NNNN`.
async fn next_receipt_id(tx: &mut LedgerTx, date: DateTime<Utc>) -> LedgerResult<String> {
    let day = date.format("%Y%m%d").to_string();
    let last: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(CAST(SUBSTR(receipt_id, 10) AS INTEGER)) FROM sales WHERE receipt_id LIKE ?1",
    )
    .bind(format!("{day}-%"))
    .fetch_one(tx.conn())
    .await?;

    Ok(format!("{}-{:04}", day, last.unwrap_or(0) + 1))
}

/// Double-entry check before commit: every stored line total must match
/// its quantity × price, and the header must equal the sum of the lines.
pub(crate) async fn verify_totals(tx: &mut LedgerTx, sale_id: i64) -> LedgerResult<Totals> {
    let sale = fetch_sale(tx.conn(), sale_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
    let items = fetch_items(tx.conn(), sale_id).await?;

    let inconsistent = |detail: String| LedgerError::Consistency {
        entity: "Sale".to_string(),
        id: sale_id,
        detail,
    };

    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        let expected = line_total(item.quantity, item.price)?;
        if expected != item.line_total {
            return Err(inconsistent(format!(
                "item {} line_total {} != {} x {} = {}",
                item.id, item.line_total, item.quantity, item.price, expected
            )));
        }
        lines.push(LineAmounts {
            line_total: item.line_total,
            profit: item.profit,
        });
    }

    let totals = aggregate_totals(&lines)?;
    if totals.total_amount != sale.total_amount || totals.total_profit != sale.total_profit {
        return Err(inconsistent(format!(
            "header {} / {} != lines {} / {}",
            sale.total_amount, sale.total_profit, totals.total_amount, totals.total_profit
        )));
    }
    Ok(totals)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::error::DbError;
    use crate::test_support::{on_hand, open_store, open_store_configured, qty, seed_customer, seed_product, stock};
    use chrono::Duration;
    use tally_core::InventoryError;

    fn line(product_id: i64, quantity: &str, price: i64) -> SaleLine {
        SaleLine {
            product_id,
            quantity: qty(quantity),
            price: Money::from_units(price),
        }
    }

    async fn sale_count(store: &LedgerStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(store.reader())
            .await
            .unwrap()
    }

    async fn item_count(store: &LedgerStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sale_items")
            .fetch_one(store.reader())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_void_restores_stock() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Cola", 500, 1000).await;
        stock(&store, id, 10).await;

        let sale_id = store
            .sales()
            .create(None, Utc::now(), &[line(id, "2", 1000)])
            .await
            .unwrap();

        let sale = store.sales().get(sale_id).await.unwrap().unwrap();
        assert_eq!(sale.total_amount, Money::from_units(2000));
        assert_eq!(sale.total_profit, Money::from_units(1000));
        let items = store.sales().items(sale_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].profit, Money::from_units(1000));
        assert_eq!(on_hand(&store, id).await, qty("8"));

        store.sales().delete(sale_id).await.unwrap();
        assert_eq!(on_hand(&store, id).await, qty("10"));
        assert!(store.sales().get(sale_id).await.unwrap().is_none());
        assert_eq!(item_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_selling_from_empty_stock_creates_nothing() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Bread", 30, 50).await;
        stock(&store, id, 1).await;
        store.inventory().adjust(id, qty("-1"), "spoiled").await.unwrap();

        let result = store.sales().create(None, Utc::now(), &[line(id, "1", 50)]).await;
        assert!(matches!(
            result,
            Err(LedgerError::Inventory(InventoryError::WouldGoNegative { .. }))
        ));
        assert_eq!(sale_count(&store).await, 0);
        assert_eq!(on_hand(&store, id).await, Quantity::zero());
    }

    #[tokio::test]
    async fn test_failing_third_line_rolls_back_everything() {
        let (_dir, store) = open_store().await;
        let mut products = Vec::new();
        for i in 0..5 {
            let id = seed_product(&store, &format!("Item {i}"), 10, 20).await;
            stock(&store, id, 5).await;
            products.push(id);
        }
        store.inventory().set_absolute(products[2], qty("0.5"), "count").await.unwrap();

        let lines: Vec<SaleLine> = products.iter().map(|&id| line(id, "1", 20)).collect();
        let result = store.sales().create(None, Utc::now(), &lines).await;

        assert!(matches!(
            result,
            Err(LedgerError::Inventory(InventoryError::WouldGoNegative { product_id, .. })) if product_id == products[2]
        ));
        assert_eq!(sale_count(&store).await, 0);
        assert_eq!(item_count(&store).await, 0);
        assert_eq!(on_hand(&store, products[0]).await, qty("5"));
        assert_eq!(on_hand(&store, products[1]).await, qty("5"));
        assert_eq!(on_hand(&store, products[2]).await, qty("0.5"));
    }

    #[tokio::test]
    async fn test_fractional_round_trip_has_no_drift() {
        let (_dir, store) = open_store().await;
        let a = seed_product(&store, "Cheese", 333, 1000).await;
        let b = seed_product(&store, "Olives", 1, 1).await;
        stock(&store, a, 3).await;
        stock(&store, b, 3).await;

        let lines = [line(a, "1.333", 1000), line(b, "0.5", 1), line(a, "0.667", 999)];
        let sale_id = store.sales().create(None, Utc::now(), &lines).await.unwrap();

        let sale = store.sales().get(sale_id).await.unwrap().unwrap();
        // 1333 + round(0.5) + round(666.333)
        assert_eq!(sale.total_amount, Money::from_units(1333 + 1 + 666));
        assert_eq!(on_hand(&store, a).await, qty("1"));
        assert_eq!(on_hand(&store, b).await, qty("2.5"));

        store.sales().delete(sale_id).await.unwrap();
        assert_eq!(on_hand(&store, a).await, qty("3"));
        assert_eq!(on_hand(&store, b).await, qty("3"));
    }

    #[tokio::test]
    async fn test_receipt_ids_count_per_day() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Gum", 1, 2).await;
        stock(&store, id, 10).await;

        let day = |d: u32| {
            NaiveDate::from_ymd_opt(2024, 6, d)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
                .and_utc()
        };
        let first = store.sales().create(None, day(1), &[line(id, "1", 2)]).await.unwrap();
        let second = store.sales().create(None, day(1), &[line(id, "1", 2)]).await.unwrap();
        let other_day = store.sales().create(None, day(2), &[line(id, "1", 2)]).await.unwrap();

        let receipt = |sale: Option<Sale>| sale.unwrap().receipt_id.unwrap();
        assert_eq!(receipt(store.sales().get(first).await.unwrap()), "20240601-0001");
        assert_eq!(receipt(store.sales().get(second).await.unwrap()), "20240601-0002");
        assert_eq!(receipt(store.sales().get(other_day).await.unwrap()), "20240602-0001");

        let june_first = store
            .sales()
            .list(day(1).date_naive(), day(1).date_naive())
            .await
            .unwrap();
        assert_eq!(june_first.len(), 2);
    }

    #[tokio::test]
    async fn test_update_applies_net_deltas() {
        let (_dir, store) = open_store().await;
        let a = seed_product(&store, "Beans", 100, 200).await;
        let b = seed_product(&store, "Corn", 100, 150).await;
        stock(&store, a, 2).await;
        stock(&store, b, 5).await;

        let sale_id = store.sales().create(None, Utc::now(), &[line(a, "2", 200)]).await.unwrap();
        assert_eq!(on_hand(&store, a).await, Quantity::zero());
        let receipt = store.sales().get(sale_id).await.unwrap().unwrap().receipt_id;

        // Stock of `a` is 0; reducing its line must not trip on a transient state.
        let mut rx = store.subscribe();
        store
            .sales()
            .update(sale_id, None, Utc::now(), &[line(a, "1", 200), line(b, "3", 150)])
            .await
            .unwrap();

        assert_eq!(on_hand(&store, a).await, qty("1"));
        assert_eq!(on_hand(&store, b).await, qty("2"));

        let sale = store.sales().get(sale_id).await.unwrap().unwrap();
        assert_eq!(sale.total_amount, Money::from_units(200 + 450));
        assert_eq!(sale.total_profit, Money::from_units(100 + 150));
        assert_eq!(sale.receipt_id, receipt);
        assert_eq!(store.sales().items(sale_id).await.unwrap().len(), 2);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&LedgerEvent::SaleUpdated { sale_id }));
        assert!(events.contains(&LedgerEvent::ProductStockChanged { product_id: b }));
    }

    #[tokio::test]
    async fn test_update_beyond_stock_changes_nothing() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Lentils", 100, 200).await;
        stock(&store, id, 3).await;
        let sale_id = store.sales().create(None, Utc::now(), &[line(id, "2", 200)]).await.unwrap();

        let result = store
            .sales()
            .update(sale_id, None, Utc::now(), &[line(id, "3.5", 200)])
            .await;
        assert!(matches!(result, Err(LedgerError::Inventory(_))));

        assert_eq!(on_hand(&store, id).await, qty("1"));
        let items = store.sales().items(sale_id).await.unwrap();
        assert_eq!(items[0].quantity, qty("2"));
    }

    #[tokio::test]
    async fn test_expired_sale_is_immutable() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Soap", 100, 200).await;
        stock(&store, id, 5).await;

        let old = Utc::now() - Duration::hours(1300);
        let sale_id = store.sales().create(None, old, &[line(id, "1", 200)]).await.unwrap();
        assert_eq!(store.sales().edit_state(sale_id).await.unwrap(), EditState::Expired);

        let result = store
            .sales()
            .update(sale_id, None, Utc::now(), &[line(id, "2", 200)])
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::EditWindowExpired { window_hours: 1240, .. })
        ));
        assert!(matches!(
            store.sales().delete(sale_id).await,
            Err(LedgerError::EditWindowExpired { .. })
        ));

        assert_eq!(on_hand(&store, id).await, qty("4"));
        assert_eq!(store.sales().items(sale_id).await.unwrap()[0].quantity, qty("1"));
    }

    #[tokio::test]
    async fn test_edit_window_follows_config() {
        let (_dir, store) = open_store_configured(|config| config.ledger.edit_window_hours = 2).await;
        let id = seed_product(&store, "Tape", 1, 2).await;
        stock(&store, id, 5).await;

        let fresh = store
            .sales()
            .create(None, Utc::now() - Duration::hours(1), &[line(id, "1", 2)])
            .await
            .unwrap();
        let stale = store
            .sales()
            .create(None, Utc::now() - Duration::hours(3), &[line(id, "1", 2)])
            .await
            .unwrap();

        store.sales().delete(fresh).await.unwrap();
        assert!(matches!(
            store.sales().delete(stale).await,
            Err(LedgerError::EditWindowExpired { window_hours: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_moving_the_date_keeps_the_edit_window() {
        let (dir, store) = open_store().await;
        let id = seed_product(&store, "Twine", 1, 2).await;
        stock(&store, id, 5).await;

        let sale_id = store
            .sales()
            .create(None, Utc::now() - Duration::minutes(90), &[line(id, "1", 2)])
            .await
            .unwrap();
        let moved = Utc::now();
        store
            .sales()
            .update(sale_id, None, moved, &[line(id, "1", 2)])
            .await
            .unwrap();
        let sale = store.sales().get(sale_id).await.unwrap().unwrap();
        assert_eq!(sale.date.timestamp(), moved.timestamp());

        // A one-hour window has passed for the date first recorded, even
        // though the current date is only moments old.
        let mut config = LedgerConfig::with_database_path(dir.path().join("tally.db"));
        config.ledger.edit_window_hours = 1;
        let strict = LedgerStore::open(&config).await.unwrap();

        assert_eq!(strict.sales().edit_state(sale_id).await.unwrap(), EditState::Expired);
        assert!(matches!(
            strict.sales().update(sale_id, None, Utc::now(), &[line(id, "2", 2)]).await,
            Err(LedgerError::EditWindowExpired { window_hours: 1, .. })
        ));
        assert_eq!(on_hand(&strict, id).await, qty("4"));
        strict.close().await;
    }

    #[tokio::test]
    async fn test_unknown_references() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Pen", 1, 2).await;
        stock(&store, id, 5).await;

        assert!(matches!(
            store.sales().create(Some(77), Utc::now(), &[line(id, "1", 2)]).await,
            Err(LedgerError::NotFound { ref entity, id: 77 }) if entity == "Customer"
        ));
        assert!(matches!(
            store.sales().create(None, Utc::now(), &[line(id, "1", 2), line(999, "1", 2)]).await,
            Err(LedgerError::NotFound { id: 999, .. })
        ));
        assert!(matches!(
            store.sales().delete(12345).await,
            Err(LedgerError::NotFound { .. })
        ));
        assert_eq!(sale_count(&store).await, 0);
        assert_eq!(on_hand(&store, id).await, qty("5"));

        let customer = seed_customer(&store, "900000001").await;
        let sale_id = store
            .sales()
            .create(Some(customer), Utc::now(), &[line(id, "1", 2)])
            .await
            .unwrap();
        assert_eq!(
            store.sales().get(sale_id).await.unwrap().unwrap().customer_id,
            Some(customer)
        );
    }

    #[tokio::test]
    async fn test_line_validation_runs_before_the_store() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Cup", 1, 2).await;

        assert!(matches!(
            store.sales().create(None, Utc::now(), &[]).await,
            Err(LedgerError::Validation(ValidationError::Required { .. }))
        ));
        assert!(matches!(
            store.sales().create(None, Utc::now(), &[line(id, "0", 2)]).await,
            Err(LedgerError::Validation(ValidationError::MustBePositive { .. }))
        ));

        let too_many: Vec<SaleLine> = (0..1001).map(|_| line(id, "1", 2)).collect();
        assert!(matches!(
            store.sales().create(None, Utc::now(), &too_many).await,
            Err(LedgerError::Validation(ValidationError::TooManyItems { max: 1000, .. }))
        ));
    }

    #[tokio::test]
    async fn test_sold_product_cannot_be_deleted() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Lamp", 10, 20).await;
        stock(&store, id, 1).await;
        store.sales().create(None, Utc::now(), &[line(id, "1", 20)]).await.unwrap();

        assert!(matches!(
            store.catalog().delete_product(id).await,
            Err(LedgerError::Store(DbError::ForeignKeyViolation { .. }))
        ));
    }

    #[tokio::test]
    async fn test_deleting_header_cascades_to_items() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Mug", 10, 20).await;
        stock(&store, id, 2).await;
        let sale_id = store.sales().create(None, Utc::now(), &[line(id, "2", 20)]).await.unwrap();

        store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM sales WHERE id = ?1")
                        .bind(sale_id)
                        .execute(tx.conn())
                        .await?;
                    Ok(())
                })
            })
            .await
            .unwrap();
        assert_eq!(item_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_corrupted_line_fails_consistency_check() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Vase", 10, 20).await;
        stock(&store, id, 2).await;

        let result = store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let sale_id =
                        SaleService::create_in(tx, None, Utc::now(), &[line(id, "1", 20)]).await?;
                    sqlx::query("UPDATE sale_items SET line_total = line_total + 1 WHERE sale_id = ?1")
                        .bind(sale_id)
                        .execute(tx.conn())
                        .await?;
                    verify_totals(tx, sale_id).await
                })
            })
            .await;

        match result {
            Err(err @ LedgerError::Consistency { .. }) => assert!(!err.is_expected()),
            other => panic!("expected consistency error, got {other:?}"),
        }
        assert_eq!(sale_count(&store).await, 0);
        assert_eq!(on_hand(&store, id).await, qty("2"));
    }

    #[tokio::test]
    async fn test_committed_events() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Fork", 1, 2).await;
        stock(&store, id, 2).await;
        let mut rx = store.subscribe();

        let sale_id = store.sales().create(None, Utc::now(), &[line(id, "1", 2)]).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            LedgerEvent::ProductStockChanged { product_id: id }
        );
        assert_eq!(rx.recv().await.unwrap(), LedgerEvent::SaleCommitted { sale_id });

        store.sales().delete(sale_id).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            LedgerEvent::ProductStockChanged { product_id: id }
        );
        assert_eq!(rx.recv().await.unwrap(), LedgerEvent::SaleVoided { sale_id });
    }
}
