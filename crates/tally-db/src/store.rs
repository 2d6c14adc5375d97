//! # Ledger Store
//!
//! Connection management and the transaction manager.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          LedgerStore                                    │
//! │                                                                         │
//! │  ┌──────────────────────────────┐   ┌───────────────────────────────┐  │
//! │  │ writer pool (1 connection)   │   │ reader pool (read-only)       │  │
//! │  │ guarded by writer_lock       │   │ max_readers connections       │  │
//! │  └──────────────┬───────────────┘   └───────────────┬───────────────┘  │
//! │                 │                                   │                   │
//! │  with_transaction(body)                  analytics, get/list, backup   │
//! │   inventory / sales / purchases          (WAL: readers never block      │
//! │   / catalog writes                        the writer and see only       │
//! │                                           committed data)               │
//! │                                                                         │
//! │  commit ──► QueryCache::invalidate_all ──► EventBus::publish           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Writer
//! Every ledger write goes through [`LedgerStore::with_transaction`]. The
//! writer lock serializes them, so two sales can never interleave between
//! their stock read and stock write. Waiting for the lock is bounded by
//! `lock_timeout`; a caller that times out gets [`LedgerError::LockTimeout`]
//! and nothing was started.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::analytics::AnalyticsGateway;
use crate::backup::BackupService;
use crate::cache::QueryCache;
use crate::config::{BackupSettings, LedgerConfig, LedgerSettings};
use crate::error::{DbError, DbResult, LedgerError, LedgerResult};
use crate::events::{EventBus, LedgerEvent};
use crate::migrations::{self, MigrationStatus};
use crate::repository::catalog::CatalogRepository;
use crate::repository::inventory::InventoryLedger;
use crate::repository::purchase::PurchaseService;
use crate::repository::sale::SaleService;
use crate::tx::{writer_held_by_current_task, LedgerTx, WRITER_HELD};

// =============================================================================
// Configuration
// =============================================================================

/// Connection configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/srv/tally/tally.db")
///     .max_readers(8)
///     .lock_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file. Created if missing.
    pub database_path: PathBuf,

    /// Connections in the read-only pool.
    /// Default: 4
    pub max_readers: u32,

    /// How long `with_transaction` waits for the writer lock.
    /// Default: 30 seconds
    pub lock_timeout: Duration,

    /// SQLite busy timeout per connection.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// How long to wait for a pooled connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Whether to run migrations on open.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_readers: 4,
            lock_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            run_migrations: true,
        }
    }

    pub fn max_readers(mut self, max: u32) -> Self {
        self.max_readers = max;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

// =============================================================================
// Store
// =============================================================================

/// Handle to an open ledger. Cheap to clone; clones share pools, lock,
/// cache and event channel.
///
/// ## Usage
/// ```rust,ignore
/// let store = LedgerStore::open(&LedgerConfig::load(None)?).await?;
///
/// let sale_id = store.sales().create(Some(customer_id), Utc::now(), &lines).await?;
///
/// // Several operations as one unit of work:
/// store.with_transaction(move |tx| Box::pin(async move {
///     let id = SaleService::create_in(tx, None, Utc::now(), &lines).await?;
///     InventoryLedger::adjust_in(tx, 7, qty, StockSource::Manual, "recount").await?;
///     Ok(id)
/// })).await?;
/// ```
#[derive(Debug, Clone)]
pub struct LedgerStore {
    writer: SqlitePool,
    reader: SqlitePool,
    writer_lock: Arc<Mutex<()>>,
    lock_timeout: Duration,
    cache: QueryCache,
    events: EventBus,
    settings: LedgerSettings,
    backup: BackupSettings,
    path: PathBuf,
}

impl LedgerStore {
    /// Opens (creating if needed) the store described by `config`.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        Self::open_with(config.db_config(), config).await
    }

    /// Opens the store with explicit connection settings. Policy, cache,
    /// event and backup settings still come from `config`.
    ///
    /// ## What This Does
    /// 1. Opens the writer pool (one connection, WAL, foreign keys on)
    /// 2. Runs migrations on it (if enabled)
    /// 3. Opens the read-only pool
    pub async fn open_with(db: DbConfig, config: &LedgerConfig) -> LedgerResult<Self> {
        info!(
            path = %db.database_path.display(),
            "Opening ledger store"
        );

        if let Some(parent) = db.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
            }
        }

        let write_options = SqliteConnectOptions::new()
            .filename(&db.database_path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(db.busy_timeout)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(db.connect_timeout)
            .connect_with(write_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        if db.run_migrations {
            migrations::run_migrations(&writer).await?;
        }

        let read_options = SqliteConnectOptions::new()
            .filename(&db.database_path)
            .read_only(true)
            .foreign_keys(true)
            .busy_timeout(db.busy_timeout);

        let reader = SqlitePoolOptions::new()
            .max_connections(db.max_readers.max(1))
            .acquire_timeout(db.connect_timeout)
            .connect_with(read_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let cache = if config.cache.enabled {
            QueryCache::new(config.cache_ttl(), config.cache.max_entries)
        } else {
            QueryCache::disabled()
        };

        info!(
            max_readers = db.max_readers,
            lock_timeout_ms = db.lock_timeout.as_millis() as u64,
            cache = cache.is_enabled(),
            "Ledger store ready"
        );

        Ok(LedgerStore {
            writer,
            reader,
            writer_lock: Arc::new(Mutex::new(())),
            lock_timeout: db.lock_timeout,
            cache,
            events: EventBus::new(config.events.channel_capacity),
            settings: config.ledger.clone(),
            backup: config.backup.clone(),
            path: db.database_path,
        })
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Runs `body` as one atomic unit of work.
    ///
    /// Commits if `body` returns `Ok`, rolls back otherwise. On commit the
    /// query cache is invalidated and the events queued with
    /// [`LedgerTx::emit`] are published, in that order, before the next
    /// writer may start.
    ///
    /// Calling this from inside another body on the same task fails with
    /// [`LedgerError::NestedTransaction`]; use [`LedgerTx::with_transaction`]
    /// to extend the open transaction instead.
    pub async fn with_transaction<T, F>(&self, body: F) -> LedgerResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut LedgerTx) -> BoxFuture<'t, LedgerResult<T>> + Send,
    {
        if writer_held_by_current_task() {
            error!("with_transaction called while this task already holds the writer");
            return Err(LedgerError::NestedTransaction);
        }

        let guard = tokio::time::timeout(self.lock_timeout, self.writer_lock.clone().lock_owned())
            .await
            .map_err(|_| {
                warn!(
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "Timed out waiting for the writer lock"
                );
                LedgerError::LockTimeout(self.lock_timeout)
            })?;

        let tx = self
            .writer
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        let mut ledger_tx = LedgerTx::new(tx, guard, self.settings.clone());

        let result = WRITER_HELD.scope((), body(&mut ledger_tx)).await;

        match result {
            Ok(value) => {
                let (events, guard) = match ledger_tx.commit().await {
                    Ok(committed) => committed,
                    Err(err) => {
                        error!(error = %err, "Commit failed");
                        return Err(err);
                    }
                };
                self.cache.invalidate_all().await;
                debug!(events = events.len(), "Transaction committed");
                self.events.publish(events);
                drop(guard);
                Ok(value)
            }
            Err(err) => {
                ledger_tx.rollback().await;
                if err.is_expected() {
                    debug!(error = %err, "Transaction rolled back");
                } else {
                    error!(error = %err, "Transaction rolled back");
                }
                Err(err)
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// New receiver for committed-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// The read-only pool. Sees committed data only.
    pub fn reader(&self) -> &SqlitePool {
        &self.reader
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub(crate) fn backup_settings(&self) -> &BackupSettings {
        &self.backup
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.clone())
    }

    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.clone())
    }

    pub fn sales(&self) -> SaleService {
        SaleService::new(self.clone())
    }

    pub fn purchases(&self) -> PurchaseService {
        PurchaseService::new(self.clone())
    }

    pub fn analytics(&self) -> AnalyticsGateway {
        AnalyticsGateway::new(self.reader.clone(), self.cache.clone())
    }

    pub fn backups(&self) -> BackupService {
        BackupService::new(self.clone())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Applied vs embedded migrations.
    pub async fn migration_status(&self) -> DbResult<MigrationStatus> {
        migrations::migration_status(&self.reader).await
    }

    /// Checks both pools can execute queries.
    pub async fn health_check(&self) -> bool {
        let writer_ok = sqlx::query("SELECT 1").execute(&self.writer).await.is_ok();
        let reader_ok = sqlx::query("SELECT 1").execute(&self.reader).await.is_ok();
        writer_ok && reader_ok
    }

    /// Closes both pools. Every later operation fails.
    pub async fn close(&self) {
        info!("Closing ledger store");
        self.reader.close().await;
        self.writer.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
