//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── ValidationError  - Bad caller input, rejected before any I/O      │
//! │  ├── InventoryError   - Non-negativity rule violations                 │
//! │  └── CoreError        - Any of the above, plus the edit window         │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Store failures, classified by constraint       │
//! │  └── LedgerError      - What every public ledger operation returns     │
//! │                                                                         │
//! │  Flow: ValidationError/InventoryError → CoreError → LedgerError        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure ledger rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Inventory rule violation (wraps InventoryError).
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// The sale is older than the edit window and is now immutable.
    ///
    /// ## User Workflow
    /// ```text
    /// Edit sale #42 (dated 60 days ago)
    ///      │
    ///      ▼
    /// now - date = 1440h > window 1240h
    ///      │
    ///      ▼
    /// EditWindowExpired { sale_id: 42, window_hours: 1240 }
    /// ```
    #[error("Sale {sale_id} can no longer be modified (edit window of {window_hours}h has expired)")]
    EditWindowExpired { sale_id: i64, window_hours: i64 },
}

// =============================================================================
// Inventory Error
// =============================================================================

/// Violations of the inventory non-negativity invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Applying the delta would leave negative stock on hand.
    #[error("Stock for product {product_id} would go negative: on hand {current}, change {delta}")]
    WouldGoNegative {
        product_id: i64,
        current: Quantity,
        delta: Quantity,
    },

    /// A decrement was requested for a product that has never had stock.
    #[error("Product {product_id} has no inventory record")]
    NoSuchRecord { product_id: i64 },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// They are raised before a transaction is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., a malformed quantity string).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Too many line items in one transaction.
    #[error("{field} cannot have more than {max} items")]
    TooManyItems { field: String, max: usize },

    /// A quantity carries more fractional digits than the ledger keeps.
    #[error("{field} allows at most {scale} decimal places")]
    TooPrecise { field: String, scale: u32 },

    /// NaN or infinity where a number was expected.
    #[error("{field} must be a finite number")]
    NonFinite { field: String },

    /// Arithmetic result does not fit the ledger's integer columns.
    #[error("{field} is too large")]
    Overflow { field: String },

    /// Start of a date range is after its end.
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    /// A date that must not be in the future is.
    #[error("{field} cannot be in the future ({date})")]
    FutureDate { field: String, date: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_error_message() {
        let err = InventoryError::WouldGoNegative {
            product_id: 7,
            current: Quantity::from_milli(0),
            delta: Quantity::from_milli(-1000),
        };
        assert_eq!(
            err.to_string(),
            "Stock for product 7 would go negative: on hand 0.000, change -1.000"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "lines".to_string(),
        };
        assert_eq!(err.to_string(), "lines is required");

        let err = ValidationError::TooPrecise {
            field: "quantity".to_string(),
            scale: 3,
        };
        assert_eq!(err.to_string(), "quantity allows at most 3 decimal places");
    }

    #[test]
    fn test_conversions_into_core_error() {
        let core_err: CoreError = ValidationError::Required {
            field: "reason".to_string(),
        }
        .into();
        assert!(matches!(core_err, CoreError::Validation(_)));

        let core_err: CoreError = InventoryError::NoSuchRecord { product_id: 1 }.into();
        assert!(matches!(core_err, CoreError::Inventory(_)));
    }
}
