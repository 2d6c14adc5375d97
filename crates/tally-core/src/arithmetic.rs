//! # Arithmetic Module
//!
//! The single source of truth for every rounding decision in the ledger.
//!
//! ## Rounding Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ROUND HALF AWAY FROM ZERO, ONCE PER LINE                               │
//! │                                                                         │
//! │   line_total  = round(quantity × unit_price)                            │
//! │   line_profit = round(quantity × (sell_price − cost_price))             │
//! │                                                                         │
//! │   total_amount = Σ line_total      ← sum of rounded lines               │
//! │   total_profit = Σ line_profit                                          │
//! │                                                                         │
//! │  Example: two lines of 0.5 × 1                                          │
//! │   rounded per line, then summed:  1 + 1 = 2   ✅ (what we do)           │
//! │   summed, then rounded:           round(1.0) = 1   ❌ (never)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All products are computed with exact decimals (`rust_decimal`), never
//! binary floating point. The only error is a result that does not fit
//! the ledger's integer columns.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{LineAmounts, PurchaseLine, SaleLine, Totals};
use crate::validation::ValidationResult;

// =============================================================================
// Per-Line Money
// =============================================================================

/// `round(quantity × unit_price)`, half away from zero.
///
/// ## Example
/// ```rust
/// use tally_core::arithmetic::line_total;
/// use tally_core::{Money, Quantity};
///
/// let q = |s: &str| s.parse::<Quantity>().unwrap();
/// assert_eq!(line_total(q("2.0"), Money::from_units(1000)).unwrap().units(), 2000);
/// assert_eq!(line_total(q("1.333"), Money::from_units(1000)).unwrap().units(), 1333);
/// assert_eq!(line_total(q("0.5"), Money::from_units(1)).unwrap().units(), 1);
/// ```
pub fn line_total(quantity: Quantity, unit_price: Money) -> ValidationResult<Money> {
    round_to_money(quantity, Decimal::from(unit_price.units()), "line_total")
}

/// `round(quantity × (sell_price − cost_price))`, half away from zero.
///
/// A missing cost counts as zero, so the whole line is profit.
///
/// ## Example
/// ```rust
/// use tally_core::arithmetic::line_profit;
/// use tally_core::{Money, Quantity};
///
/// let two = Quantity::from_milli(2000);
/// let profit = line_profit(two, Money::from_units(1000), Some(Money::from_units(500))).unwrap();
/// assert_eq!(profit.units(), 1000);
/// ```
pub fn line_profit(
    quantity: Quantity,
    sell_price: Money,
    cost_price: Option<Money>,
) -> ValidationResult<Money> {
    let cost = cost_price.unwrap_or_default();
    let margin = sell_price
        .checked_sub(cost)
        .ok_or_else(|| overflow("line_profit"))?;
    round_to_money(quantity, Decimal::from(margin.units()), "line_profit")
}

fn round_to_money(quantity: Quantity, unit: Decimal, field: &str) -> ValidationResult<Money> {
    quantity
        .as_decimal()
        .checked_mul(unit)
        .map(|exact| exact.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|rounded| rounded.to_i64())
        .map(Money::from_units)
        .ok_or_else(|| overflow(field))
}

fn overflow(field: &str) -> ValidationError {
    ValidationError::Overflow {
        field: field.to_string(),
    }
}

// =============================================================================
// Lines and Totals
// =============================================================================

/// Amounts of a sale line, given the product's cost at the time of sale.
pub fn sale_line_amounts(line: &SaleLine, cost_price: Option<Money>) -> ValidationResult<LineAmounts> {
    Ok(LineAmounts {
        line_total: line_total(line.quantity, line.price)?,
        profit: line_profit(line.quantity, line.price, cost_price)?,
    })
}

/// Amounts of a purchase line. Purchases carry no profit.
pub fn purchase_line_amounts(line: &PurchaseLine) -> ValidationResult<LineAmounts> {
    Ok(LineAmounts {
        line_total: line_total(line.quantity, line.price)?,
        profit: Money::zero(),
    })
}

/// Sums already-rounded line values into header totals.
///
/// Never re-derives a total from aggregate quantity × average price.
pub fn aggregate_totals<'a, I>(lines: I) -> ValidationResult<Totals>
where
    I: IntoIterator<Item = &'a LineAmounts>,
{
    lines.into_iter().try_fold(Totals::default(), |acc, line| {
        Ok(Totals {
            total_amount: acc
                .total_amount
                .checked_add(line.line_total)
                .ok_or_else(|| overflow("total_amount"))?,
            total_profit: acc
                .total_profit
                .checked_add(line.profit)
                .ok_or_else(|| overflow("total_profit"))?,
        })
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
