//! # Ledger Error Types
//!
//! Error types for store access and ledger operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError ← Classified by constraint (UNIQUE / FK / CHECK / NOT NULL)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError ← Joins DbError with the business taxonomy:               │
//! │       │        Validation, Inventory, EditWindowExpired,               │
//! │       │        Consistency, NotFound, LockTimeout                       │
//! │       ▼                                                                 │
//! │  Caller (UI / report layer) decides how to present it                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error aborts the whole transaction. There is no partial apply.

use std::time::Duration;

use tally_core::{CoreError, InventoryError, ValidationError};
use thiserror::Error;

// =============================================================================
// Store Errors
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and name the constraint that fired,
/// so a rejected write can be diagnosed without the raw SQLite message.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate receipt id
    /// - Duplicate customer identifier or category name
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent product or customer
    /// - Deleting a product still referenced by a sale or purchase line
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation.
    ///
    /// ## When This Occurs
    /// - `inventory_quantity_non_negative` (stock below zero)
    /// - Negative price or non-positive line quantity
    #[error("Check constraint violated: {constraint}")]
    CheckViolation { constraint: String },

    /// NOT NULL constraint violation.
    #[error("Missing value: {column}")]
    NotNullViolation { column: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created or opened
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// BEGIN, COMMIT or ROLLBACK failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Backup file could not be written or pruned.
    #[error("Backup failed: {0}")]
    Backup(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Whether this is a constraint rejecting caller data, as opposed to
    /// an infrastructure failure.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { .. }
                | DbError::ForeignKeyViolation { .. }
                | DbError::CheckViolation { .. }
                | DbError::NotNullViolation { .. }
        )
    }
}

fn suffix_after(msg: &str, marker: &str) -> String {
    msg.split(marker)
        .nth(1)
        .map(str::trim)
        .unwrap_or("unknown")
        .to_string()
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                //   "UNIQUE constraint failed: <table>.<column>"
                //   "FOREIGN KEY constraint failed"
                //   "CHECK constraint failed: <constraint name or expression>"
                //   "NOT NULL constraint failed: <table>.<column>"
                if msg.contains("UNIQUE constraint failed") {
                    DbError::UniqueViolation {
                        field: suffix_after(msg, "UNIQUE constraint failed:"),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        constraint: suffix_after(msg, "CHECK constraint failed:"),
                    }
                } else if msg.contains("NOT NULL constraint failed") {
                    DbError::NotNullViolation {
                        column: suffix_after(msg, "NOT NULL constraint failed:"),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Ledger Errors
// =============================================================================

/// What every public ledger operation returns on failure.
///
/// ## Handling Policy
/// ```text
/// ┌──────────────────────┬──────────────┬──────────────────────────────────┐
/// │ Variant              │ Expected?    │ Caller action                    │
/// ├──────────────────────┼──────────────┼──────────────────────────────────┤
/// │ Validation           │ yes          │ fix input                        │
/// │ Inventory            │ yes          │ show stock problem               │
/// │ EditWindowExpired    │ yes          │ sale is read-only now            │
/// │ NotFound             │ yes          │ stale id                         │
/// │ LockTimeout          │ yes          │ retry later                      │
/// │ Store (constraint)   │ yes          │ show which constraint            │
/// │ Store (other)        │ no (logged)  │ report                           │
/// │ Consistency          │ no (logged)  │ report, this is a bug            │
/// │ NestedTransaction    │ no (logged)  │ report, this is a bug            │
/// └──────────────────────┴──────────────┴──────────────────────────────────┘
/// ```
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad caller input, rejected before touching the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Stock rule violation.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// The sale is past its edit window.
    #[error("Sale {sale_id} can no longer be modified (edit window of {window_hours}h has expired)")]
    EditWindowExpired { sale_id: i64, window_hours: i64 },

    /// Recomputed totals disagree with what was written.
    #[error("Consistency check failed for {entity} {id}: {detail}")]
    Consistency {
        entity: String,
        id: i64,
        detail: String,
    },

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: i64 },

    /// The writer lock was not acquired in time. Nothing was started.
    #[error("Timed out after {0:?} waiting for the writer lock")]
    LockTimeout(Duration),

    /// `LedgerStore::with_transaction` was called from inside a running
    /// transaction body on the same task.
    #[error("A transaction is already open on this task; extend it with LedgerTx::with_transaction")]
    NestedTransaction,

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] DbError),
}

impl LedgerError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: i64) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Returns true for errors a caller is expected to handle in normal
    /// operation. Everything else indicates a bug or an infrastructure
    /// failure and is logged at error level by the transaction manager.
    pub fn is_expected(&self) -> bool {
        match self {
            LedgerError::Validation(_)
            | LedgerError::Inventory(_)
            | LedgerError::EditWindowExpired { .. }
            | LedgerError::NotFound { .. }
            | LedgerError::LockTimeout(_) => true,
            LedgerError::Store(db) => db.is_constraint_violation(),
            LedgerError::Consistency { .. } | LedgerError::NestedTransaction => false,
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => LedgerError::Validation(e),
            CoreError::Inventory(e) => LedgerError::Inventory(e),
            CoreError::EditWindowExpired {
                sale_id,
                window_hours,
            } => LedgerError::EditWindowExpired {
                sale_id,
                window_hours,
            },
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Store(err.into())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors loading, validating or saving [`LedgerConfig`](crate::config::LedgerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of its allowed range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Failed to read or write the config file.
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize the config.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No platform config directory could be determined.
    #[error("No config path available")]
    NoConfigPath,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Quantity;

    #[test]
    fn test_suffix_parsing() {
        assert_eq!(
            suffix_after(
                "CHECK constraint failed: inventory_quantity_non_negative",
                "CHECK constraint failed:"
            ),
            "inventory_quantity_non_negative"
        );
        assert_eq!(suffix_after("garbage", "CHECK constraint failed:"), "unknown");
    }

    #[test]
    fn test_expected_errors() {
        assert!(LedgerError::Inventory(InventoryError::NoSuchRecord { product_id: 1 }).is_expected());
        assert!(LedgerError::LockTimeout(Duration::from_secs(1)).is_expected());
        assert!(LedgerError::Store(DbError::CheckViolation {
            constraint: "x".to_string()
        })
        .is_expected());

        assert!(!LedgerError::Store(DbError::Internal("disk".to_string())).is_expected());
        assert!(!LedgerError::NestedTransaction.is_expected());
        assert!(!LedgerError::Consistency {
            entity: "Sale".to_string(),
            id: 1,
            detail: "total_amount 10 != 11".to_string(),
        }
        .is_expected());
    }

    #[test]
    fn test_core_error_mapping() {
        let err: LedgerError = CoreError::EditWindowExpired {
            sale_id: 4,
            window_hours: 1240,
        }
        .into();
        assert!(matches!(
            err,
            LedgerError::EditWindowExpired { sale_id: 4, window_hours: 1240 }
        ));

        let err: LedgerError = CoreError::Inventory(InventoryError::WouldGoNegative {
            product_id: 2,
            current: Quantity::zero(),
            delta: Quantity::from_milli(-1000),
        })
        .into();
        assert!(matches!(
            err,
            LedgerError::Inventory(InventoryError::WouldGoNegative { product_id: 2, .. })
        ));
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::not_found("Sale", 42);
        assert_eq!(err.to_string(), "Sale not found: 42");
    }
}
