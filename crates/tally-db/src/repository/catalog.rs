//! # Catalog Repository
//!
//! The master data the ledger references: products, categories and
//! customers.
//!
//! The ledger itself only reads from here, except for `cost_price`, which
//! purchases refresh. Catalog maintenance beyond what the ledger needs
//! (search, bulk import, price lists) lives elsewhere.

use sqlx::{Executor, Sqlite};
use tracing::{debug, info};

use crate::error::{DbResult, LedgerError, LedgerResult};
use crate::store::LedgerStore;
use crate::tx::LedgerTx;
use tally_core::validation::{
    validate_category_name, validate_customer_name, validate_identifier_9, validate_product_name,
    validate_unit_price,
};
use tally_core::{Category, Customer, Money, NewProduct, Product};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    category_id: Option<i64>,
    cost_price: i64,
    sell_price: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            category_id: row.category_id,
            cost_price: Money::from_units(row.cost_price),
            sell_price: Money::from_units(row.sell_price),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    identifier_9: String,
    name: String,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            identifier_9: row.identifier_9,
            name: row.name,
        }
    }
}

// =============================================================================
// Shared Queries
// =============================================================================
// Usable on the reader pool and inside a LedgerTx alike.

pub(crate) async fn fetch_product<'e, E>(executor: E, id: i64) -> DbResult<Option<Product>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, name, category_id, cost_price, sell_price FROM products WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Product::from))
}

pub(crate) async fn product_exists<'e, E>(executor: E, id: i64) -> DbResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

pub(crate) async fn customer_exists<'e, E>(executor: E, id: i64) -> DbResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM customers WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

/// Current cost of a product, or `None` when the product is unknown.
pub(crate) async fn product_cost<'e, E>(executor: E, id: i64) -> DbResult<Option<Money>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let cost: Option<i64> = sqlx::query_scalar("SELECT cost_price FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(cost.map(Money::from_units))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog rows.
///
/// ## Usage
/// ```rust,ignore
/// let drinks = store.catalog().create_category("Drinks").await?;
/// let cola = store.catalog().create_product(NewProduct {
///     name: "Cola 330ml".into(),
///     category_id: Some(drinks.id),
///     cost_price: Money::from_units(500),
///     sell_price: Money::from_units(1000),
/// }).await?;
/// ```
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    store: LedgerStore,
}

impl CatalogRepository {
    pub fn new(store: LedgerStore) -> Self {
        CatalogRepository { store }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Inserts a product.
    pub async fn create_product(&self, product: NewProduct) -> LedgerResult<Product> {
        let max_price = self.store.settings().max_unit_price;
        validate_product_name(&product.name)?;
        validate_unit_price("cost_price", product.cost_price, max_price)?;
        validate_unit_price("sell_price", product.sell_price, max_price)?;

        let created = self
            .store
            .with_transaction(move |tx| Box::pin(async move { Self::create_product_in(tx, &product).await }))
            .await?;

        info!(product_id = created.id, name = %created.name, "Product created");
        Ok(created)
    }

    /// Inserts a product inside an open transaction.
    pub async fn create_product_in(tx: &mut LedgerTx, product: &NewProduct) -> LedgerResult<Product> {
        if let Some(category_id) = product.category_id {
            let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM categories WHERE id = ?1")
                .bind(category_id)
                .fetch_optional(tx.conn())
                .await?;
            if found.is_none() {
                return Err(LedgerError::not_found("Category", category_id));
            }
        }

        let id = sqlx::query(
            "INSERT INTO products (name, category_id, cost_price, sell_price) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(product.name.trim())
        .bind(product.category_id)
        .bind(product.cost_price.units())
        .bind(product.sell_price.units())
        .execute(tx.conn())
        .await?
        .last_insert_rowid();

        debug!(product_id = id, "Inserted product");
        Ok(Product {
            id,
            name: product.name.trim().to_string(),
            category_id: product.category_id,
            cost_price: product.cost_price,
            sell_price: product.sell_price,
        })
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_product(&self, id: i64) -> LedgerResult<Option<Product>> {
        Ok(fetch_product(self.store.reader(), id).await?)
    }

    /// Lists all products by name.
    pub async fn list_products(&self) -> LedgerResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, category_id, cost_price, sell_price FROM products ORDER BY name, id",
        )
        .fetch_all(self.store.reader())
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Changes the shelf price. Existing sale lines keep the price they
    /// were sold at.
    pub async fn update_sell_price(&self, id: i64, sell_price: Money) -> LedgerResult<()> {
        validate_unit_price("sell_price", sell_price, self.store.settings().max_unit_price)?;

        self.store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let updated = sqlx::query("UPDATE products SET sell_price = ?1 WHERE id = ?2")
                        .bind(sell_price.units())
                        .bind(id)
                        .execute(tx.conn())
                        .await?
                        .rows_affected();
                    if updated == 0 {
                        return Err(LedgerError::not_found("Product", id));
                    }
                    Ok(())
                })
            })
            .await?;

        info!(product_id = id, sell_price = %sell_price, "Sell price updated");
        Ok(())
    }

    /// Deletes a product.
    ///
    /// Fails with a foreign key violation while any sale line, purchase
    /// line or manual adjustment references it. Its inventory record goes
    /// with it.
    pub async fn delete_product(&self, id: i64) -> LedgerResult<()> {
        self.store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let deleted = sqlx::query("DELETE FROM products WHERE id = ?1")
                        .bind(id)
                        .execute(tx.conn())
                        .await?
                        .rows_affected();
                    if deleted == 0 {
                        return Err(LedgerError::not_found("Product", id));
                    }
                    Ok(())
                })
            })
            .await?;

        info!(product_id = id, "Product deleted");
        Ok(())
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(&self, name: &str) -> LedgerResult<Category> {
        validate_category_name(name)?;
        let name = name.trim().to_string();

        let category = self
            .store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let id = sqlx::query("INSERT INTO categories (name) VALUES (?1)")
                        .bind(&name)
                        .execute(tx.conn())
                        .await?
                        .last_insert_rowid();
                    Ok(Category { id, name })
                })
            })
            .await?;

        debug!(category_id = category.id, "Category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> LedgerResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(self.store.reader())
            .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    // =========================================================================
    // Customers
    // =========================================================================

    pub async fn create_customer(&self, identifier_9: &str, name: &str) -> LedgerResult<Customer> {
        validate_identifier_9(identifier_9)?;
        validate_customer_name(name)?;
        let identifier_9 = identifier_9.to_string();
        let name = name.trim().to_string();

        let customer = self
            .store
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let id = sqlx::query("INSERT INTO customers (identifier_9, name) VALUES (?1, ?2)")
                        .bind(&identifier_9)
                        .bind(&name)
                        .execute(tx.conn())
                        .await?
                        .last_insert_rowid();
                    Ok(Customer {
                        id,
                        identifier_9,
                        name,
                    })
                })
            })
            .await?;

        debug!(customer_id = customer.id, "Customer created");
        Ok(customer)
    }

    pub async fn get_customer(&self, id: i64) -> LedgerResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, identifier_9, name FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.store.reader())
        .await?;
        Ok(row.map(Customer::from))
    }

    pub async fn list_customers(&self) -> LedgerResult<Vec<Customer>> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, identifier_9, name FROM customers ORDER BY name, id",
        )
        .fetch_all(self.store.reader())
        .await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
