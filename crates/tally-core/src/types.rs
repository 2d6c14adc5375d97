//! # Domain Types
//!
//! Core domain types used throughout the ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Purchase     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id             │   │  id             │       │
//! │  │  cost_price     │   │  receipt_id     │   │  supplier       │       │
//! │  │  sell_price     │   │  total_amount   │   │  total_amount   │       │
//! │  └────────┬────────┘   │  total_profit   │   └────────┬────────┘       │
//! │           │ 1-1        └────────┬────────┘            │ 1-N            │
//! │  ┌────────▼────────┐            │ 1-N        ┌────────▼────────┐       │
//! │  │ InventoryRecord │   ┌────────▼────────┐   │  PurchaseItem   │       │
//! │  │  quantity ≥ 0   │   │    SaleItem     │   │  quantity       │       │
//! │  └─────────────────┘   │  quantity       │   │  price          │       │
//! │                        │  price, profit  │   └─────────────────┘       │
//! │  InventoryAdjustment   └─────────────────┘                              │
//! │  (append-only audit)                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ids are SQLite integer row ids. Dates are UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Catalog
// =============================================================================

/// A product in the catalog.
///
/// The ledger references products but only ever changes `cost_price`
/// (on purchase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    /// Last known unit cost, refreshed by every purchase line.
    pub cost_price: Money,
    pub sell_price: Money,
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category_id: Option<i64>,
    pub cost_price: Money,
    pub sell_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A customer, identified by a 9-digit business identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub identifier_9: String,
    pub name: String,
}

// =============================================================================
// Inventory
// =============================================================================

/// Current on-hand quantity of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: i64,
    pub quantity: Quantity,
}

/// One row of the stock listing: every product, with zero stock when it
/// has never had an inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: Quantity,
}

/// Audit row for a stock change made outside a sale or purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub id: i64,
    pub product_id: i64,
    pub quantity_change: Quantity,
    pub reason: String,
    pub date: DateTime<Utc>,
}

/// Who is moving stock.
///
/// Sales and purchases carry their own line-level provenance, so only
/// manual changes append an [`InventoryAdjustment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockSource {
    Manual,
    Sale,
    Purchase,
}

impl StockSource {
    /// Whether a change from this source appends an audit row.
    #[inline]
    pub const fn records_adjustment(&self) -> bool {
        matches!(self, StockSource::Manual)
    }
}

// =============================================================================
// Sales
// =============================================================================

/// A committed sale header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub date: DateTime<Utc>,
    /// Σ line_total of the items.
    pub total_amount: Money,
    /// Σ profit of the items.
    pub total_profit: Money,
    /// `YYYYMMDD-NNNN`, assigned on creation and kept on update.
    pub receipt_id: Option<String>,
}

/// A sale line as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub quantity: Quantity,
    pub price: Money,
    pub line_total: Money,
    /// Frozen at creation; later cost changes never touch it.
    pub profit: Money,
}

/// A sale line as submitted by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: i64,
    pub quantity: Quantity,
    /// Unit sell price.
    pub price: Money,
}

/// Where a sale sits in its lifecycle, relative to a given `now`.
///
/// ```text
/// Proposed ──create──► Committed ──┬── within window ──► Editable
///                                  └── past window ────► Expired (immutable)
/// Editable ──delete──► Voided (gone)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditState {
    Editable,
    Expired,
}

// =============================================================================
// Purchases
// =============================================================================

/// A committed purchase header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub supplier: String,
    pub date: DateTime<Utc>,
    pub total_amount: Money,
}

/// A purchase line as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub quantity: Quantity,
    /// Unit cost paid.
    pub price: Money,
    pub line_total: Money,
}

/// A purchase line as submitted by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: i64,
    pub quantity: Quantity,
    /// Unit cost.
    pub price: Money,
}

// =============================================================================
// Computed Amounts
// =============================================================================

/// Rounded money of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub line_total: Money,
    pub profit: Money,
}

/// Header totals, always the sum of already-rounded lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub total_amount: Money,
    pub total_profit: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================
