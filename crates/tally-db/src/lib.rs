//! # tally-db: Ledger Engine for Tally
//!
//! The transactional core of the store: stock, sales and purchases kept
//! consistent with each other in one embedded SQLite file.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Data Flow                                │
//! │                                                                         │
//! │  UI action / batch job (record_sale, receive_purchase, ...)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  LedgerStore  │    │   Services    │    │  Analytics   │  │   │
//! │  │   │  (store.rs)   │    │ (repository/) │    │ (read-only)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ writer lock   │◄───│ SaleService   │    │ daily_sales  │  │   │
//! │  │   │ LedgerTx      │    │ Purchase...   │    │ top_products │  │   │
//! │  │   │ cache, events │    │ InventoryL... │    │ ...          │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SQLite Database (WAL)                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - Connection pools, writer lock, transaction manager
//! - [`tx`] - The `LedgerTx` unit of work
//! - [`repository`] - Catalog, inventory, sale and purchase services
//! - [`analytics`] - Cached read-only aggregate metrics
//! - [`backup`] - Hot backups with `VACUUM INTO`
//! - [`cache`] / [`events`] - Query cache and change notifications
//! - [`config`] - TOML configuration
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{LedgerConfig, LedgerStore};
//!
//! let config = LedgerConfig::load(None)?;
//! let store = LedgerStore::open(&config).await?;
//!
//! let sale_id = store.sales().create(None, Utc::now(), &lines).await?;
//! let stock = store.inventory().quantity(product_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod analytics;
pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod migrations;
pub mod repository;
pub mod store;
pub mod tx;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::LedgerConfig;
pub use error::{ConfigError, DbError, LedgerError, LedgerResult};
pub use events::LedgerEvent;
pub use store::{DbConfig, LedgerStore};
pub use tx::LedgerTx;

// Service re-exports for convenience
pub use analytics::{AnalyticsGateway, MetricResult};
pub use backup::BackupService;
pub use repository::catalog::CatalogRepository;
pub use repository::inventory::InventoryLedger;
pub use repository::purchase::PurchaseService;
pub use repository::sale::SaleService;

pub use tally_core;
