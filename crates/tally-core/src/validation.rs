//! # Validation Module
//!
//! Input validation for ledger operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (before any transaction is opened)               │
//! │  ├── line count caps, quantity > 0, price bounds                       │
//! │  └── text fields, date ranges                                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger rules (inside the transaction)                        │
//! │  └── non-negativity, edit window                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity_milli >= 0), CHECK (price >= 0)                   │
//! │  └── Foreign keys (RESTRICT / CASCADE)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_sale_lines, LineLimits};
//! use tally_core::{Money, Quantity, SaleLine};
//!
//! let lines = [SaleLine {
//!     product_id: 1,
//!     quantity: Quantity::from_milli(2000),
//!     price: Money::from_units(1000),
//! }];
//! assert!(validate_sale_lines(&lines, &LineLimits::sales()).is_ok());
//! assert!(validate_sale_lines(&[], &LineLimits::sales()).is_err());
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{PurchaseLine, SaleLine};
use crate::{MAX_LINE_QUANTITY, MAX_PURCHASE_ITEMS, MAX_SALE_ITEMS, MAX_UNIT_PRICE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Line Limits
// =============================================================================

/// Policy bounds applied to submitted lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLimits {
    pub max_items: usize,
    pub max_unit_price: i64,
}

impl LineLimits {
    /// Default bounds for sales.
    pub const fn sales() -> Self {
        LineLimits {
            max_items: MAX_SALE_ITEMS,
            max_unit_price: MAX_UNIT_PRICE,
        }
    }

    /// Default bounds for purchases.
    pub const fn purchases() -> Self {
        LineLimits {
            max_items: MAX_PURCHASE_ITEMS,
            max_unit_price: MAX_UNIT_PRICE,
        }
    }
}

// =============================================================================
// String Validators
// =============================================================================

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 200)
}

/// Validates a category name (at most 100 characters).
pub fn validate_category_name(name: &str) -> ValidationResult<()> {
    validate_text("category", name, 100)
}

/// Validates a supplier name on a purchase (at most 200 characters).
pub fn validate_supplier(supplier: &str) -> ValidationResult<()> {
    validate_text("supplier", supplier, 200)
}

/// Validates the free-text reason of a manual stock change.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    validate_text("reason", reason, 500)
}

/// Validates a customer's 9-digit identifier.
///
/// ## Rules
/// - Exactly 9 ASCII digits
/// - First digit is `9`
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_identifier_9;
///
/// assert!(validate_identifier_9("912345678").is_ok());
/// assert!(validate_identifier_9("812345678").is_err());
/// assert!(validate_identifier_9("91234567").is_err());
/// ```
pub fn validate_identifier_9(identifier: &str) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "identifier_9".to_string(),
        reason: reason.to_string(),
    };

    if identifier.len() != 9 || !identifier.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("must be exactly 9 digits"));
    }
    if !identifier.starts_with('9') {
        return Err(invalid("must start with 9"));
    }
    Ok(())
}

/// Validates a customer name (at most 200 characters).
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    validate_text("customer_name", name, 200)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a catalog or line price: `0 ≤ price ≤ max`.
pub fn validate_unit_price(field: &str, price: Money, max: i64) -> ValidationResult<()> {
    if price.units() < 0 || price.units() > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max,
        });
    }
    Ok(())
}

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_line_quantity(quantity: Quantity) -> ValidationResult<()> {
    if !quantity.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity.milli() > MAX_LINE_QUANTITY * 1000 {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_LINE_QUANTITY,
        });
    }
    Ok(())
}

fn validate_product_ref(product_id: i64) -> ValidationResult<()> {
    if product_id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "product_id".to_string(),
        });
    }
    Ok(())
}

/// Validates the number of lines: non-empty and at most `max`.
pub fn validate_line_count(field: &str, count: usize, max: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if count > max {
        return Err(ValidationError::TooManyItems {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Batch Validators
// =============================================================================

/// Validates every line of a sale before any write happens.
pub fn validate_sale_lines(lines: &[SaleLine], limits: &LineLimits) -> ValidationResult<()> {
    validate_line_count("lines", lines.len(), limits.max_items)?;
    for line in lines {
        validate_product_ref(line.product_id)?;
        validate_line_quantity(line.quantity)?;
        validate_unit_price("price", line.price, limits.max_unit_price)?;
    }
    Ok(())
}

/// Validates every line of a purchase before any write happens.
pub fn validate_purchase_lines(lines: &[PurchaseLine], limits: &LineLimits) -> ValidationResult<()> {
    validate_line_count("lines", lines.len(), limits.max_items)?;
    for line in lines {
        validate_product_ref(line.product_id)?;
        validate_line_quantity(line.quantity)?;
        validate_unit_price("price", line.price, limits.max_unit_price)?;
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Validates an analytics date range: `start ≤ end`, neither after `today`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use tally_core::validation::validate_date_range;
///
/// let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
/// let today = d("2024-06-30");
/// assert!(validate_date_range(d("2024-06-01"), d("2024-06-30"), today).is_ok());
/// assert!(validate_date_range(d("2024-06-30"), d("2024-06-01"), today).is_err());
/// assert!(validate_date_range(d("2024-06-01"), d("2024-07-01"), today).is_err());
/// ```
pub fn validate_date_range(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> ValidationResult<()> {
    if start > end {
        return Err(ValidationError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    for (field, date) in [("start_date", start), ("end_date", end)] {
        if date > today {
            return Err(ValidationError::FutureDate {
                field: field.to_string(),
                date: date.to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
