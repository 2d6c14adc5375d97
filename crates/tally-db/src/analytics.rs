//! # Analytics Gateway
//!
//! Aggregate reporting over the read-only pool.
//!
//! ## Read Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gateway.daily_sales(start, end)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate_date_range(start, end, today) ── bad ──► ValidationError     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  QueryCache::get("daily_sales:2024-06-01:2024-06-30") ── hit ──► rows  │
//! │       │ miss                                                            │
//! │       ▼                                                                 │
//! │  read-only pool (never takes the writer lock, sees committed data)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  MetricResult { data, meta } ──► cached (unless a commit raced it)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every metric is a pure function of its parameters and the committed
//! ledger. Date ranges are inclusive UTC calendar days.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::cache::QueryCache;
use crate::error::{LedgerError, LedgerResult};
use tally_core::validation::validate_date_range;
use tally_core::{Money, Quantity};

/// Default row cap of [`AnalyticsGateway::top_products`].
pub const DEFAULT_TOP_PRODUCTS: u32 = 10;

/// Default threshold of [`AnalyticsGateway::low_stock`], in units.
pub const DEFAULT_LOW_STOCK_UNITS: i64 = 10;

/// Default age of [`AnalyticsGateway::inventory_aging`], in days.
pub const DEFAULT_AGING_DAYS: i64 = 30;

/// Default sale count of [`AnalyticsGateway::loyal_customers`].
pub const DEFAULT_LOYALTY_THRESHOLD: i64 = 5;

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

// =============================================================================
// Results
// =============================================================================

/// What ran and how many rows it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricMeta {
    pub metric: String,
    pub count: usize,
    pub params: BTreeMap<String, String>,
}

/// Rows of one metric plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricResult<T> {
    pub data: Vec<T>,
    pub meta: MetricMeta,
}

impl<T> MetricResult<T> {
    fn new(metric: &str, params: &[(&str, String)], data: Vec<T>) -> Self {
        MetricResult {
            meta: MetricMeta {
                metric: metric.to_string(),
                count: data.len(),
                params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            },
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub day: NaiveDate,
    pub total_sales: Money,
    pub sale_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub product_id: i64,
    pub name: String,
    pub quantity: Quantity,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: Quantity,
}

/// Stock on hand that has not sold recently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: Quantity,
    /// `None` when the product never sold.
    pub last_sold: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPerformance {
    /// `Uncategorized` for products without a category.
    pub category: String,
    pub revenue: Money,
    pub units_sold: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdaySales {
    pub weekday: String,
    /// 0 = Sunday
    pub weekday_index: i64,
    pub total_sales: Money,
    pub sale_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SalesSummary {
    pub total_amount: Money,
    pub total_profit: Money,
    pub sale_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyalCustomer {
    pub customer_id: i64,
    pub identifier_9: String,
    pub name: String,
    pub sale_count: i64,
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct DailySalesRow {
    day: NaiveDate,
    total_sales: i64,
    sale_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductQuantityRow {
    product_id: i64,
    name: String,
    quantity_milli: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TopProductRow {
    product_id: i64,
    name: String,
    quantity_milli: i64,
    revenue: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct AgingRow {
    product_id: i64,
    name: String,
    quantity_milli: i64,
    last_sold: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    category: String,
    revenue: i64,
    quantity_milli: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct WeekdayRow {
    weekday_index: i64,
    total_sales: i64,
    sale_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    total_amount: i64,
    total_profit: i64,
    sale_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LoyalRow {
    customer_id: i64,
    identifier_9: String,
    name: String,
    sale_count: i64,
}

// =============================================================================
// Gateway
// =============================================================================

/// Read-only aggregate queries with a short-lived cache in front.
///
/// ## Usage
/// ```rust,ignore
/// let june = store.analytics().daily_sales(d("2024-06-01"), d("2024-06-30")).await?;
/// for row in &june.data {
///     println!("{} {}", row.day, row.total_sales);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AnalyticsGateway {
    pool: SqlitePool,
    cache: QueryCache,
}

impl AnalyticsGateway {
    pub fn new(pool: SqlitePool, cache: QueryCache) -> Self {
        AnalyticsGateway { pool, cache }
    }

    async fn cached<T, F, Fut>(&self, key: String, load: F) -> LedgerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        self.cache.get_or_load(&key, load).await
    }

    fn check_range(start: NaiveDate, end: NaiveDate) -> LedgerResult<()> {
        validate_date_range(start, end, Utc::now().date_naive()).map_err(LedgerError::from)
    }

    /// Revenue and sale count per day.
    pub async fn daily_sales(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> LedgerResult<MetricResult<DailySales>> {
        Self::check_range(start, end)?;
        let key = format!("daily_sales:{start}:{end}");

        self.cached(key, || async {
            info!(metric = "daily_sales", %start, %end, "Executing metric");
            let rows = sqlx::query_as::<_, DailySalesRow>(
                r#"
                SELECT
                    date(date) AS day,
                    SUM(total_amount) AS total_sales,
                    COUNT(*) AS sale_count
                FROM sales
                WHERE date(date) BETWEEN ?1 AND ?2
                GROUP BY day
                ORDER BY day
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

            let data = rows
                .into_iter()
                .map(|row| DailySales {
                    day: row.day,
                    total_sales: Money::from_units(row.total_sales),
                    sale_count: row.sale_count,
                })
                .collect();
            Ok(MetricResult::new(
                "daily_sales",
                &[("start_date", start.to_string()), ("end_date", end.to_string())],
                data,
            ))
        })
        .await
    }

    /// Best sellers by quantity.
    pub async fn top_products(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        limit: u32,
    ) -> LedgerResult<MetricResult<TopProduct>> {
        Self::check_range(start, end)?;
        let key = format!("top_products:{start}:{end}:{limit}");

        self.cached(key, || async {
            info!(metric = "top_products", %start, %end, limit, "Executing metric");
            let rows = sqlx::query_as::<_, TopProductRow>(
                r#"
                SELECT
                    p.id AS product_id,
                    p.name AS name,
                    SUM(si.quantity_milli) AS quantity_milli,
                    SUM(si.line_total) AS revenue
                FROM sale_items si
                JOIN sales s ON s.id = si.sale_id
                JOIN products p ON p.id = si.product_id
                WHERE date(s.date) BETWEEN ?1 AND ?2
                GROUP BY p.id
                ORDER BY quantity_milli DESC, p.id
                LIMIT ?3
                "#,
            )
            .bind(start)
            .bind(end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            let data = rows
                .into_iter()
                .map(|row| TopProduct {
                    product_id: row.product_id,
                    name: row.name,
                    quantity: Quantity::from_milli(row.quantity_milli),
                    revenue: Money::from_units(row.revenue),
                })
                .collect();
            Ok(MetricResult::new(
                "top_products",
                &[
                    ("start_date", start.to_string()),
                    ("end_date", end.to_string()),
                    ("limit", limit.to_string()),
                ],
                data,
            ))
        })
        .await
    }

    /// Products with stock strictly below `threshold`, lowest first.
    /// Products that never had stock are not listed.
    pub async fn low_stock(&self, threshold: Quantity) -> LedgerResult<MetricResult<LowStockItem>> {
        let key = format!("low_stock:{}", threshold.milli());

        self.cached(key, || async {
            info!(metric = "low_stock", threshold = %threshold, "Executing metric");
            let rows = sqlx::query_as::<_, ProductQuantityRow>(
                r#"
                SELECT p.id AS product_id, p.name AS name, i.quantity_milli AS quantity_milli
                FROM inventory i
                JOIN products p ON p.id = i.product_id
                WHERE i.quantity_milli < ?1
                ORDER BY i.quantity_milli, p.name
                "#,
            )
            .bind(threshold.milli())
            .fetch_all(&self.pool)
            .await?;

            let data = rows
                .into_iter()
                .map(|row| LowStockItem {
                    product_id: row.product_id,
                    name: row.name,
                    quantity: Quantity::from_milli(row.quantity_milli),
                })
                .collect();
            Ok(MetricResult::new(
                "low_stock",
                &[("threshold", threshold.to_string())],
                data,
            ))
        })
        .await
    }

    /// Products with stock on hand that have not sold in the last `days`
    /// days, never-sold products first.
    pub async fn inventory_aging(&self, days: i64) -> LedgerResult<MetricResult<AgingItem>> {
        if days < 0 {
            return Err(tally_core::ValidationError::MustBePositive {
                field: "days".to_string(),
            }
            .into());
        }
        let key = format!("inventory_aging:{days}");

        self.cached(key, || async {
            info!(metric = "inventory_aging", days, "Executing metric");
            let cutoff = Utc::now() - Duration::days(days);
            let rows = sqlx::query_as::<_, AgingRow>(
                r#"
                SELECT
                    p.id AS product_id,
                    p.name AS name,
                    i.quantity_milli AS quantity_milli,
                    MAX(s.date) AS last_sold
                FROM products p
                JOIN inventory i ON i.product_id = p.id
                LEFT JOIN sale_items si ON si.product_id = p.id
                LEFT JOIN sales s ON s.id = si.sale_id
                WHERE i.quantity_milli > 0
                GROUP BY p.id
                HAVING last_sold IS NULL OR last_sold < ?1
                ORDER BY last_sold IS NOT NULL, last_sold, p.name
                "#,
            )
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

            let data = rows
                .into_iter()
                .map(|row| AgingItem {
                    product_id: row.product_id,
                    name: row.name,
                    quantity: Quantity::from_milli(row.quantity_milli),
                    last_sold: row.last_sold,
                })
                .collect();
            Ok(MetricResult::new("inventory_aging", &[("days", days.to_string())], data))
        })
        .await
    }

    /// Revenue and units per category, best first.
    pub async fn category_performance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> LedgerResult<MetricResult<CategoryPerformance>> {
        Self::check_range(start, end)?;
        let key = format!("category_performance:{start}:{end}");

        self.cached(key, || async {
            info!(metric = "category_performance", %start, %end, "Executing metric");
            let rows = sqlx::query_as::<_, CategoryRow>(
                r#"
                SELECT
                    COALESCE(c.name, 'Uncategorized') AS category,
                    SUM(si.line_total) AS revenue,
                    SUM(si.quantity_milli) AS quantity_milli
                FROM sale_items si
                JOIN sales s ON s.id = si.sale_id
                JOIN products p ON p.id = si.product_id
                LEFT JOIN categories c ON c.id = p.category_id
                WHERE date(s.date) BETWEEN ?1 AND ?2
                GROUP BY c.id
                ORDER BY revenue DESC, category
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

            let data = rows
                .into_iter()
                .map(|row| CategoryPerformance {
                    category: row.category,
                    revenue: Money::from_units(row.revenue),
                    units_sold: Quantity::from_milli(row.quantity_milli),
                })
                .collect();
            Ok(MetricResult::new(
                "category_performance",
                &[("start_date", start.to_string()), ("end_date", end.to_string())],
                data,
            ))
        })
        .await
    }

    /// Revenue per day of the week, Sunday first.
    pub async fn sales_by_weekday(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> LedgerResult<MetricResult<WeekdaySales>> {
        Self::check_range(start, end)?;
        let key = format!("sales_by_weekday:{start}:{end}");

        self.cached(key, || async {
            info!(metric = "sales_by_weekday", %start, %end, "Executing metric");
            let rows = sqlx::query_as::<_, WeekdayRow>(
                r#"
                SELECT
                    CAST(strftime('%w', date) AS INTEGER) AS weekday_index,
                    SUM(total_amount) AS total_sales,
                    COUNT(*) AS sale_count
                FROM sales
                WHERE date(date) BETWEEN ?1 AND ?2
                GROUP BY weekday_index
                ORDER BY weekday_index
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

            let data = rows
                .into_iter()
                .map(|row| WeekdaySales {
                    weekday: WEEKDAYS
                        .get(row.weekday_index as usize)
                        .copied()
                        .unwrap_or("Unknown")
                        .to_string(),
                    weekday_index: row.weekday_index,
                    total_sales: Money::from_units(row.total_sales),
                    sale_count: row.sale_count,
                })
                .collect();
            Ok(MetricResult::new(
                "sales_by_weekday",
                &[("start_date", start.to_string()), ("end_date", end.to_string())],
                data,
            ))
        })
        .await
    }

    /// Totals over a date range.
    pub async fn sales_summary(&self, start: NaiveDate, end: NaiveDate) -> LedgerResult<SalesSummary> {
        Self::check_range(start, end)?;
        let key = format!("sales_summary:{start}:{end}");

        self.cached(key, || async {
            info!(metric = "sales_summary", %start, %end, "Executing metric");
            let row = sqlx::query_as::<_, SummaryRow>(
                r#"
                SELECT
                    COALESCE(SUM(total_amount), 0) AS total_amount,
                    COALESCE(SUM(total_profit), 0) AS total_profit,
                    COUNT(*) AS sale_count
                FROM sales
                WHERE date(date) BETWEEN ?1 AND ?2
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

            Ok(SalesSummary {
                total_amount: Money::from_units(row.total_amount),
                total_profit: Money::from_units(row.total_profit),
                sale_count: row.sale_count,
            })
        })
        .await
    }

    /// Customers with at least `threshold` sales, most frequent first.
    pub async fn loyal_customers(&self, threshold: i64) -> LedgerResult<MetricResult<LoyalCustomer>> {
        let key = format!("loyal_customers:{threshold}");

        self.cached(key, || async {
            info!(metric = "loyal_customers", threshold, "Executing metric");
            let rows = sqlx::query_as::<_, LoyalRow>(
                r#"
                SELECT
                    c.id AS customer_id,
                    c.identifier_9 AS identifier_9,
                    c.name AS name,
                    COUNT(DISTINCT s.id) AS sale_count
                FROM customers c
                JOIN sales s ON s.customer_id = c.id
                GROUP BY c.id
                HAVING sale_count >= ?1
                ORDER BY sale_count DESC, c.id
                "#,
            )
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;

            let data = rows
                .into_iter()
                .map(|row| LoyalCustomer {
                    customer_id: row.customer_id,
                    identifier_9: row.identifier_9,
                    name: row.name,
                    sale_count: row.sale_count,
                })
                .collect();
            Ok(MetricResult::new(
                "loyal_customers",
                &[("threshold", threshold.to_string())],
                data,
            ))
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerStore;
    use crate::test_support::{open_store, qty, seed_customer, seed_product, stock};
    use tally_core::{NewProduct, SaleLine, ValidationError};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
            .and_utc()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn sell(store: &LedgerStore, when: DateTime<Utc>, customer: Option<i64>, lines: &[(i64, &str, i64)]) -> i64 {
        let lines: Vec<SaleLine> = lines
            .iter()
            .map(|&(product_id, quantity, price)| SaleLine {
                product_id,
                quantity: qty(quantity),
                price: Money::from_units(price),
            })
            .collect();
        store.sales().create(customer, when, &lines).await.unwrap()
    }

    #[tokio::test]
    async fn test_daily_sales_and_summary() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Tea", 50, 100).await;
        stock(&store, id, 50).await;

        sell(&store, at(2024, 6, 1), None, &[(id, "1", 100)]).await;
        sell(&store, at(2024, 6, 1), None, &[(id, "2", 100)]).await;
        sell(&store, at(2024, 6, 3), None, &[(id, "1.5", 100)]).await;
        sell(&store, at(2024, 7, 1), None, &[(id, "1", 100)]).await;

        let result = store
            .analytics()
            .daily_sales(day(2024, 6, 1), day(2024, 6, 30))
            .await
            .unwrap();
        assert_eq!(result.meta.metric, "daily_sales");
        assert_eq!(result.meta.count, 2);
        assert_eq!(result.meta.params["start_date"], "2024-06-01");
        assert_eq!(
            result.data,
            vec![
                DailySales {
                    day: day(2024, 6, 1),
                    total_sales: Money::from_units(300),
                    sale_count: 2,
                },
                DailySales {
                    day: day(2024, 6, 3),
                    total_sales: Money::from_units(150),
                    sale_count: 1,
                },
            ]
        );

        let summary = store
            .analytics()
            .sales_summary(day(2024, 6, 1), day(2024, 6, 30))
            .await
            .unwrap();
        assert_eq!(summary.total_amount, Money::from_units(450));
        assert_eq!(summary.total_profit, Money::from_units(225));
        assert_eq!(summary.sale_count, 3);

        let empty = store
            .analytics()
            .sales_summary(day(2023, 1, 1), day(2023, 1, 31))
            .await
            .unwrap();
        assert_eq!(empty, SalesSummary::default());
    }

    #[tokio::test]
    async fn test_date_range_validation() {
        let (_dir, store) = open_store().await;
        let analytics = store.analytics();

        assert!(matches!(
            analytics.daily_sales(day(2024, 6, 30), day(2024, 6, 1)).await,
            Err(LedgerError::Validation(ValidationError::InvalidDateRange { .. }))
        ));

        let tomorrow = Utc::now().date_naive() + Duration::days(1);
        assert!(matches!(
            analytics.top_products(day(2024, 6, 1), tomorrow, 10).await,
            Err(LedgerError::Validation(ValidationError::FutureDate { .. }))
        ));
    }

    #[tokio::test]
    async fn test_top_products_ranked_by_quantity() {
        let (_dir, store) = open_store().await;
        let a = seed_product(&store, "Apples", 1, 10).await;
        let b = seed_product(&store, "Pears", 1, 30).await;
        let c = seed_product(&store, "Plums", 1, 20).await;
        for id in [a, b, c] {
            stock(&store, id, 100).await;
        }

        sell(&store, at(2024, 5, 2), None, &[(a, "5", 10), (b, "1", 30)]).await;
        sell(&store, at(2024, 5, 3), None, &[(a, "2", 10), (c, "3", 20)]).await;

        let top = store
            .analytics()
            .top_products(day(2024, 5, 1), day(2024, 5, 31), 2)
            .await
            .unwrap();
        let ranked: Vec<(i64, Quantity, Money)> = top
            .data
            .iter()
            .map(|row| (row.product_id, row.quantity, row.revenue))
            .collect();
        assert_eq!(
            ranked,
            vec![
                (a, qty("7"), Money::from_units(70)),
                (c, qty("3"), Money::from_units(60)),
            ]
        );
    }

    #[tokio::test]
    async fn test_low_stock_and_aging() {
        let (_dir, store) = open_store().await;
        let fresh = seed_product(&store, "Fresh", 1, 2).await;
        let stale = seed_product(&store, "Stale", 1, 2).await;
        let never = seed_product(&store, "Never", 1, 2).await;
        let _no_stock = seed_product(&store, "Ghost", 1, 2).await;
        stock(&store, fresh, 20).await;
        stock(&store, stale, 5).await;
        stock(&store, never, 8).await;

        sell(&store, Utc::now() - Duration::days(2), None, &[(fresh, "1", 2)]).await;
        sell(&store, Utc::now() - Duration::days(45), None, &[(stale, "1", 2)]).await;

        let low = store.analytics().low_stock(qty("10")).await.unwrap();
        let names: Vec<&str> = low.data.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["Stale", "Never"]);
        assert_eq!(low.data[0].quantity, qty("4"));

        let aging = store.analytics().inventory_aging(DEFAULT_AGING_DAYS).await.unwrap();
        let aged: Vec<(i64, bool)> = aging
            .data
            .iter()
            .map(|row| (row.product_id, row.last_sold.is_some()))
            .collect();
        assert_eq!(aged, vec![(never, false), (stale, true)]);
    }

    #[tokio::test]
    async fn test_category_performance_groups_uncategorized() {
        let (_dir, store) = open_store().await;
        let drinks = store.catalog().create_category("Drinks").await.unwrap();
        let cola = store
            .catalog()
            .create_product(NewProduct {
                name: "Cola".to_string(),
                category_id: Some(drinks.id),
                cost_price: Money::from_units(5),
                sell_price: Money::from_units(10),
            })
            .await
            .unwrap()
            .id;
        let misc = seed_product(&store, "Misc", 1, 2).await;
        stock(&store, cola, 10).await;
        stock(&store, misc, 10).await;

        sell(&store, at(2024, 4, 10), None, &[(cola, "3", 10), (misc, "2", 2)]).await;

        let result = store
            .analytics()
            .category_performance(day(2024, 4, 1), day(2024, 4, 30))
            .await
            .unwrap();
        assert_eq!(
            result.data,
            vec![
                CategoryPerformance {
                    category: "Drinks".to_string(),
                    revenue: Money::from_units(30),
                    units_sold: qty("3"),
                },
                CategoryPerformance {
                    category: "Uncategorized".to_string(),
                    revenue: Money::from_units(4),
                    units_sold: qty("2"),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_weekday_and_loyal_customers() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Bagel", 1, 3).await;
        stock(&store, id, 100).await;
        let regular = seed_customer(&store, "911111111").await;
        let once = seed_customer(&store, "922222222").await;

        // 2024-06-01 is a Saturday, 2024-06-02 a Sunday.
        for _ in 0..3 {
            sell(&store, at(2024, 6, 1), Some(regular), &[(id, "1", 3)]).await;
        }
        sell(&store, at(2024, 6, 2), Some(once), &[(id, "2", 3)]).await;

        let weekdays = store
            .analytics()
            .sales_by_weekday(day(2024, 6, 1), day(2024, 6, 2))
            .await
            .unwrap();
        let by_day: Vec<(&str, i64)> = weekdays
            .data
            .iter()
            .map(|row| (row.weekday.as_str(), row.total_sales.units()))
            .collect();
        assert_eq!(by_day, vec![("Sunday", 6), ("Saturday", 9)]);

        let loyal = store.analytics().loyal_customers(3).await.unwrap();
        assert_eq!(loyal.meta.count, 1);
        assert_eq!(loyal.data[0].customer_id, regular);
        assert_eq!(loyal.data[0].sale_count, 3);
    }

    #[tokio::test]
    async fn test_results_are_cached_until_next_commit() {
        let (_dir, store) = open_store().await;
        let id = seed_product(&store, "Salt", 1, 2).await;
        stock(&store, id, 10).await;
        let analytics = store.analytics();
        let range = (day(2024, 3, 1), day(2024, 3, 31));

        let before = analytics.sales_summary(range.0, range.1).await.unwrap();
        assert_eq!(before.sale_count, 0);
        assert!(!store.cache().is_empty().await);

        sell(&store, at(2024, 3, 5), None, &[(id, "1", 2)]).await;

        let after = analytics.sales_summary(range.0, range.1).await.unwrap();
        assert_eq!(after.sale_count, 1);
    }

    #[tokio::test]
    async fn test_gateway_pool_is_read_only() {
        let (_dir, store) = open_store().await;
        let result = sqlx::query("INSERT INTO categories (name) VALUES ('x')")
            .execute(store.reader())
            .await;
        assert!(result.is_err());
    }
}
