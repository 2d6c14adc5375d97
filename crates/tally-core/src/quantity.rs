//! # Quantity Module
//!
//! Exact decimal quantities with exactly three fractional digits.
//!
//! ## Why Not f64?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM (again)                                     │
//! │                                                                         │
//! │  1.333 kg as f64 is 1.33299999999999996270...                           │
//! │  Sell it 3 times and restock it 3 times: stock drifts by 1e-15          │
//! │  A CHECK (quantity >= 0) then rejects a perfectly valid sale.           │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal at scale 3                                  │
//! │    1.333 is stored as mantissa 1333, scale 3. Always.                   │
//! │    The database column holds the mantissa (quantity_milli).             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Caller input with more than three fractional digits is rejected,
//! never silently rounded. Values produced by arithmetic are normalised
//! with [`round_quantity`].

use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::ValidationResult;
use crate::QUANTITY_SCALE;

const MILLI_PER_UNIT: i64 = 1000;

// =============================================================================
// Rounding
// =============================================================================

/// Rounds to exactly three fractional digits, half away from zero.
///
/// ## Example
/// ```rust
/// use rust_decimal_macros::dec;
/// use tally_core::quantity::round_quantity;
///
/// assert_eq!(round_quantity(dec!(1.0005)).to_string(), "1.001");
/// assert_eq!(round_quantity(dec!(-1.0005)).to_string(), "-1.001");
/// assert_eq!(round_quantity(dec!(2)).to_string(), "2.000");
/// ```
pub fn round_quantity(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(QUANTITY_SCALE);
    rounded
}

// =============================================================================
// Quantity Type
// =============================================================================

/// A signed stock quantity, exact to the thousandth.
///
/// The inner decimal always has scale 3 and a mantissa that fits an `i64`,
/// so it maps one-to-one onto the `*_milli` INTEGER columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    /// Builds a quantity from thousandths.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::Quantity;
    ///
    /// let q = Quantity::from_milli(1333);
    /// assert_eq!(q.to_string(), "1.333");
    /// ```
    #[inline]
    pub fn from_milli(milli: i64) -> Self {
        Quantity(Decimal::new(milli, QUANTITY_SCALE))
    }

    /// Builds a quantity from whole units.
    pub fn from_units(units: i64) -> ValidationResult<Self> {
        units
            .checked_mul(MILLI_PER_UNIT)
            .map(Quantity::from_milli)
            .ok_or_else(|| overflow("quantity"))
    }

    /// Validates an exact decimal: at most three fractional digits and
    /// within the range of the storage column.
    pub fn new(value: Decimal) -> ValidationResult<Self> {
        if value.normalize().scale() > QUANTITY_SCALE {
            return Err(ValidationError::TooPrecise {
                field: "quantity".to_string(),
                scale: QUANTITY_SCALE,
            });
        }
        let milli = value
            .checked_mul(Decimal::from(MILLI_PER_UNIT))
            .and_then(|m| m.to_i64())
            .ok_or_else(|| overflow("quantity"))?;
        Ok(Quantity::from_milli(milli))
    }

    /// Rounds an arbitrary decimal with [`round_quantity`] first.
    pub fn rounded(value: Decimal) -> ValidationResult<Self> {
        Quantity::new(round_quantity(value))
    }

    /// Converts a float coming from an outer layer.
    ///
    /// NaN and infinities are rejected. The shortest decimal representation
    /// of the float is used, so `10.123_f64` becomes exactly `10.123`.
    pub fn from_f64(value: f64) -> ValidationResult<Self> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite {
                field: "quantity".to_string(),
            });
        }
        let decimal = Decimal::from_str(&value.to_string()).map_err(|_| overflow("quantity"))?;
        Quantity::new(decimal)
    }

    /// Zero quantity.
    #[inline]
    pub fn zero() -> Self {
        Quantity::from_milli(0)
    }

    /// Value in thousandths, as persisted.
    #[inline]
    pub fn milli(&self) -> i64 {
        // Scale is pinned to 3 and the mantissa was checked on construction.
        self.0.mantissa() as i64
    }

    /// The exact decimal value.
    #[inline]
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Exact addition, `None` on overflow of the storage range.
    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.milli()
            .checked_add(other.milli())
            .map(Quantity::from_milli)
    }

    /// Exact subtraction, `None` on overflow of the storage range.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.milli()
            .checked_sub(other.milli())
            .map(Quantity::from_milli)
    }
}

fn overflow(field: &str) -> ValidationError {
    ValidationError::Overflow {
        field: field.to_string(),
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Neg for Quantity {
    type Output = Self;

    fn neg(self) -> Self {
        Quantity::from_milli(self.milli().saturating_neg())
    }
}

/// Always three fractional digits: `2.000`, `-0.500`.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let milli = self.milli();
        let sign = if milli < 0 { "-" } else { "" };
        let abs = milli.unsigned_abs();
        write!(
            f,
            "{}{}.{:03}",
            sign,
            abs / MILLI_PER_UNIT as u64,
            abs % MILLI_PER_UNIT as u64
        )
    }
}

impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| ValidationError::InvalidFormat {
                field: "quantity".to_string(),
                reason: e.to_string(),
            })?;
        Quantity::new(decimal)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_and_display() {
        let q: Quantity = "10.123".parse().unwrap();
        assert_eq!(q.milli(), 10_123);
        assert_eq!(q.to_string(), "10.123");

        let q: Quantity = "2".parse().unwrap();
        assert_eq!(q.to_string(), "2.000");

        let q = Quantity::from_milli(-500);
        assert_eq!(q.to_string(), "-0.500");
    }

    #[test]
    fn test_precision_enforcement() {
        assert!("10.123".parse::<Quantity>().is_ok());
        assert!("10.1230".parse::<Quantity>().is_ok());
        assert!(matches!(
            "0.0004".parse::<Quantity>(),
            Err(ValidationError::TooPrecise { .. })
        ));
        assert!(matches!(
            "abc".parse::<Quantity>(),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(Quantity::from_f64(10.123).unwrap().milli(), 10_123);
        assert_eq!(Quantity::from_f64(0.5).unwrap().milli(), 500);
        assert!(matches!(
            Quantity::from_f64(f64::NAN),
            Err(ValidationError::NonFinite { .. })
        ));
        assert!(matches!(
            Quantity::from_f64(f64::INFINITY),
            Err(ValidationError::NonFinite { .. })
        ));
        assert!(matches!(
            Quantity::from_f64(0.0004),
            Err(ValidationError::TooPrecise { .. })
        ));
    }

    #[test]
    fn test_round_quantity_half_away_from_zero() {
        assert_eq!(round_quantity(dec!(0.0005)), dec!(0.001));
        assert_eq!(round_quantity(dec!(-0.0005)), dec!(-0.001));
        assert_eq!(round_quantity(dec!(0.0004)), dec!(0.000));
        assert_eq!(round_quantity(dec!(1.5)).scale(), 3);
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(matches!(
            Quantity::new(dec!(100000000000000000)),
            Err(ValidationError::Overflow { .. })
        ));
        assert!(Quantity::from_units(i64::MAX).is_err());
    }

    #[test]
    fn test_serde_goes_through_validation() {
        let q: Quantity = serde_json::from_str("\"1.25\"").unwrap();
        assert_eq!(q.milli(), 1250);
        assert!(serde_json::from_str::<Quantity>("\"1.2345\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_milli_round_trip(milli in -1_000_000_000_000i64..1_000_000_000_000i64) {
            let q = Quantity::from_milli(milli);
            prop_assert_eq!(q.milli(), milli);
            prop_assert_eq!(q.to_string().parse::<Quantity>().unwrap(), q);
        }

        #[test]
        fn prop_add_then_sub_is_exact(a in 0i64..1_000_000_000, b in 0i64..1_000_000_000) {
            let qa = Quantity::from_milli(a);
            let qb = Quantity::from_milli(b);
            let back = qa.checked_add(qb).unwrap().checked_sub(qb).unwrap();
            prop_assert_eq!(back, qa);
        }
    }
}
