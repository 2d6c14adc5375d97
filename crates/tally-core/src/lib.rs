//! # tally-core: Pure Ledger Logic
//!
//! Everything the ledger needs to decide, with nothing it needs to touch.
//! No database, no clock, no file system: callers pass `now` in.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Collaborators (UI, reports, exports, batch jobs)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ typed API + change events              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                tally-db (Ledger Engine)                         │   │
//! │  │   LedgerStore ─► LedgerTx ─► Sale/Purchase/Inventory services   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │ quantity  │  │arithmetic │  │   rules   │  │   │
//! │  │   │   Money   │  │ Quantity  │  │line_total │  │ adjust    │  │   │
//! │  │   │           │  │ 3 digits  │  │line_profit│  │ edit win  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Whole-unit currency amounts
//! - [`quantity`] - Exact decimal quantities with 3 fractional digits
//! - [`arithmetic`] - Line totals, line profit, aggregate totals
//! - [`types`] - Domain types (Product, Sale, Purchase, ...)
//! - [`rules`] - Non-negativity, edit window, net inventory deltas
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::arithmetic::line_total;
//! use tally_core::{Money, Quantity};
//!
//! let qty: Quantity = "1.333".parse().unwrap();
//! let total = line_total(qty, Money::from_units(1000)).unwrap();
//! assert_eq!(total.units(), 1333);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod arithmetic;
pub mod error;
pub mod money;
pub mod quantity;
pub mod rules;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, InventoryError, ValidationError};
pub use money::Money;
pub use quantity::Quantity;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of fractional digits every quantity carries.
pub const QUANTITY_SCALE: u32 = 3;

/// Highest unit price (sell, cost or purchase price) accepted on a line.
pub const MAX_UNIT_PRICE: i64 = 1_000_000;

/// Highest quantity accepted on a single line.
///
/// ## Business Reason
/// Guards against typing 1000000 instead of 1.000 on a scale-driven line.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Hard cap on the number of lines in one sale.
pub const MAX_SALE_ITEMS: usize = 1000;

/// Hard cap on the number of lines in one purchase.
pub const MAX_PURCHASE_ITEMS: usize = 1000;

/// Hours after its date during which a sale may still be edited or voided.
pub const EDIT_WINDOW_HOURS: i64 = 1240;
