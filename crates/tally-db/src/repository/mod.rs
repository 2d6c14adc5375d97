//! # Repository Module
//!
//! Ledger services and the catalog rows they reference.
//!
//! ## Service Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  store.sales().create(customer, date, &lines)                          │
//! │       │                                                                 │
//! │       │  validate input (no lock taken yet)                            │
//! │       ▼                                                                 │
//! │  store.with_transaction(|tx| SaleService::create_in(tx, ...))          │
//! │       │                                                                 │
//! │       ├── InventoryLedger::adjust_in(tx, product, -qty, Sale)          │
//! │       ├── INSERT sales / sale_items                                    │
//! │       └── tx.emit(SaleCommitted)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ──► events published                                           │
//! │                                                                         │
//! │  Each public method opens its own transaction. The `*_in` variants     │
//! │  take a `&mut LedgerTx` and join the caller's transaction instead.     │
//! │  Reads go straight to the read-only pool.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Services
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products, categories, customers
//! - [`InventoryLedger`](inventory::InventoryLedger) - Stock levels and manual adjustments
//! - [`SaleService`](sale::SaleService) - Sales with stock deduction
//! - [`PurchaseService`](purchase::PurchaseService) - Purchases with restocking

pub mod catalog;
pub mod inventory;
pub mod purchase;
pub mod sale;
