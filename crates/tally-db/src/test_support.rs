//! Fixtures shared by the store tests.

use tempfile::TempDir;

use crate::config::LedgerConfig;
use crate::store::{DbConfig, LedgerStore};
use tally_core::{Money, NewProduct, Quantity};

/// Fresh migrated store in its own temporary directory. Keep the
/// `TempDir` alive for as long as the store is used.
pub(crate) async fn open_store() -> (TempDir, LedgerStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = LedgerConfig::with_database_path(dir.path().join("tally.db"));
    let store = LedgerStore::open(&config).await.expect("open store");
    (dir, store)
}

/// Store with explicit connection settings and default policy.
pub(crate) async fn open_store_with(db: DbConfig) -> LedgerStore {
    let config = LedgerConfig::with_database_path(db.database_path.clone());
    LedgerStore::open_with(db, &config).await.expect("open store")
}

/// Store with a custom configuration in a temporary directory.
pub(crate) async fn open_store_configured(configure: impl FnOnce(&mut LedgerConfig)) -> (TempDir, LedgerStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = LedgerConfig::with_database_path(dir.path().join("tally.db"));
    config.backup.dir = dir.path().join("backups");
    configure(&mut config);
    let store = LedgerStore::open(&config).await.expect("open store");
    (dir, store)
}

pub(crate) async fn seed_product(store: &LedgerStore, name: &str, cost: i64, sell: i64) -> i64 {
    store
        .catalog()
        .create_product(NewProduct {
            name: name.to_string(),
            category_id: None,
            cost_price: Money::from_units(cost),
            sell_price: Money::from_units(sell),
        })
        .await
        .expect("seed product")
        .id
}

pub(crate) async fn seed_customer(store: &LedgerStore, identifier_9: &str) -> i64 {
    store
        .catalog()
        .create_customer(identifier_9, "Test Customer")
        .await
        .expect("seed customer")
        .id
}

/// Puts `units` on hand with a manual adjustment.
pub(crate) async fn stock(store: &LedgerStore, product_id: i64, units: i64) {
    store
        .inventory()
        .adjust(product_id, Quantity::from_units(units).expect("units"), "opening stock")
        .await
        .expect("stock product");
}

pub(crate) fn qty(s: &str) -> Quantity {
    s.parse().expect("quantity literal")
}

pub(crate) async fn on_hand(store: &LedgerStore, product_id: i64) -> Quantity {
    store
        .inventory()
        .quantity(product_id)
        .await
        .expect("read stock")
}
