//! # Ledger Configuration
//!
//! Configuration management for the ledger engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DB_PATH=/srv/tally/tally.db                                  │
//! │     TALLY_EDIT_WINDOW_HOURS=1240                                       │
//! │     TALLY_LOCK_TIMEOUT_SECS=30                                         │
//! │     TALLY_BACKUP_DIR=/srv/tally/backups                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.tally.ledger/tally.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "tally.db"
//! max_readers = 4
//! lock_timeout_secs = 30
//!
//! [ledger]
//! edit_window_hours = 1240
//! max_sale_items = 1000
//!
//! [cache]
//! enabled = true
//! ttl_secs = 60
//!
//! [backup]
//! dir = "backups"
//! retention_days = 7
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tally_core::validation::LineLimits;
use tally_core::{EDIT_WINDOW_HOURS, MAX_PURCHASE_ITEMS, MAX_SALE_ITEMS, MAX_UNIT_PRICE};

use crate::error::ConfigError;
use crate::store::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

/// Where the store lives and how it is accessed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Connections in the read-only analytics pool.
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// How long a writer waits for the writer lock before giving up.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// SQLite busy timeout for each connection.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,

    /// Whether to apply pending migrations on open.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tally.db")
}

fn default_max_readers() -> u32 {
    4
}

fn default_lock_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_readers: default_max_readers(),
            lock_timeout_secs: default_lock_timeout(),
            busy_timeout_secs: default_busy_timeout(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Ledger Policy
// =============================================================================

/// Business policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Hours after its date during which a sale may be edited or voided.
    #[serde(default = "default_edit_window")]
    pub edit_window_hours: i64,

    #[serde(default = "default_max_sale_items")]
    pub max_sale_items: usize,

    #[serde(default = "default_max_purchase_items")]
    pub max_purchase_items: usize,

    /// Upper bound for any unit price on a line.
    #[serde(default = "default_max_unit_price")]
    pub max_unit_price: i64,
}

fn default_edit_window() -> i64 {
    EDIT_WINDOW_HOURS
}

fn default_max_sale_items() -> usize {
    MAX_SALE_ITEMS
}

fn default_max_purchase_items() -> usize {
    MAX_PURCHASE_ITEMS
}

fn default_max_unit_price() -> i64 {
    MAX_UNIT_PRICE
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            edit_window_hours: default_edit_window(),
            max_sale_items: default_max_sale_items(),
            max_purchase_items: default_max_purchase_items(),
            max_unit_price: default_max_unit_price(),
        }
    }
}

impl LedgerSettings {
    /// Line limits applied to sales.
    pub fn sale_limits(&self) -> LineLimits {
        LineLimits {
            max_items: self.max_sale_items,
            max_unit_price: self.max_unit_price,
        }
    }

    /// Line limits applied to purchases.
    pub fn purchase_limits(&self) -> LineLimits {
        LineLimits {
            max_items: self.max_purchase_items,
            max_unit_price: self.max_unit_price,
        }
    }
}

// =============================================================================
// Cache / Events / Backup
// =============================================================================

/// Analytics query cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_cache_entries() -> usize {
    256
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

/// Change notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Hot backups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Relative paths are resolved against the database file's directory.
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,

    /// Backups older than this are pruned by `cleanup_old_backups`.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_retention_days() -> u32 {
    7
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            dir: default_backup_dir(),
            retention_days: default_retention_days(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub backup: BackupSettings,
}

impl LedgerConfig {
    /// Default configuration with the database at `path`.
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.database.path = path.into();
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if self.database.max_readers == 0 {
            return Err(ConfigError::Invalid(
                "database.max_readers must be greater than 0".into(),
            ));
        }
        if self.database.lock_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "database.lock_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.ledger.edit_window_hours < 0 {
            return Err(ConfigError::Invalid(
                "ledger.edit_window_hours must not be negative".into(),
            ));
        }
        if self.ledger.max_sale_items == 0 || self.ledger.max_purchase_items == 0 {
            return Err(ConfigError::Invalid(
                "ledger item caps must be greater than 0".into(),
            ));
        }
        if self.ledger.max_unit_price < 0 {
            return Err(ConfigError::Invalid(
                "ledger.max_unit_price must not be negative".into(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events.channel_capacity must be greater than 0".into(),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_entries must be greater than 0 when the cache is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(hours) = std::env::var("TALLY_EDIT_WINDOW_HOURS") {
            match hours.parse::<i64>() {
                Ok(h) => self.ledger.edit_window_hours = h,
                Err(_) => warn!(value = %hours, "Ignoring invalid TALLY_EDIT_WINDOW_HOURS"),
            }
        }

        if let Ok(secs) = std::env::var("TALLY_LOCK_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.database.lock_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid TALLY_LOCK_TIMEOUT_SECS"),
            }
        }

        if let Ok(dir) = std::env::var("TALLY_BACKUP_DIR") {
            self.backup.dir = PathBuf::from(dir);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "ledger")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Store connection settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_readers(self.database.max_readers)
            .lock_timeout(Duration::from_secs(self.database.lock_timeout_secs))
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
            .run_migrations(self.database.run_migrations)
    }

    /// Cache time-to-live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
