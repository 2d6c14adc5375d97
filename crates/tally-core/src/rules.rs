//! # Ledger Rules
//!
//! The pure decisions behind every stock mutation and every edit.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  check_adjustment     current + delta ≥ 0, or reject untouched          │
//! │  check_edit_window    now − sale.date ≤ window, or EditWindowExpired    │
//! │  net_stock_deltas     undo old lines + apply new lines, per product     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store layer reads the current state inside its transaction, asks
//! these functions, then writes the answer.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreError, CoreResult, InventoryError, ValidationError};
use crate::quantity::Quantity;
use crate::types::EditState;

// =============================================================================
// Non-Negativity
// =============================================================================

/// Computes the new on-hand quantity for `current + delta`.
///
/// ## Rules
/// - No record and `delta ≥ 0`: a record is created holding `delta`
/// - No record and `delta < 0`: [`InventoryError::NoSuchRecord`]
/// - Result below zero: [`InventoryError::WouldGoNegative`]
///
/// ## Example
/// ```rust
/// use tally_core::rules::check_adjustment;
/// use tally_core::Quantity;
///
/// let ten = Quantity::from_milli(10_000);
/// let new = check_adjustment(1, Some(ten), Quantity::from_milli(-2_500)).unwrap();
/// assert_eq!(new.to_string(), "7.500");
///
/// assert!(check_adjustment(1, Some(ten), Quantity::from_milli(-10_001)).is_err());
/// assert!(check_adjustment(1, None, Quantity::from_milli(-1)).is_err());
/// ```
pub fn check_adjustment(
    product_id: i64,
    current: Option<Quantity>,
    delta: Quantity,
) -> CoreResult<Quantity> {
    let Some(current) = current else {
        if delta.is_negative() {
            return Err(InventoryError::NoSuchRecord { product_id }.into());
        }
        return Ok(delta);
    };

    let new = current
        .checked_add(delta)
        .ok_or_else(|| ValidationError::Overflow {
            field: "quantity".to_string(),
        })?;

    if new.is_negative() {
        return Err(InventoryError::WouldGoNegative {
            product_id,
            current,
            delta,
        }
        .into());
    }
    Ok(new)
}

// =============================================================================
// Edit Window
// =============================================================================

/// Whether a sale dated `date` may still change at `now`.
///
/// The boundary is inclusive: a sale exactly `window_hours` old is still
/// editable. Future-dated sales are editable.
pub fn edit_state(date: DateTime<Utc>, now: DateTime<Utc>, window_hours: i64) -> EditState {
    if now.signed_duration_since(date) <= Duration::hours(window_hours) {
        EditState::Editable
    } else {
        EditState::Expired
    }
}

/// Rejects edits and voids of sales older than the window.
pub fn check_edit_window(
    sale_id: i64,
    date: DateTime<Utc>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> CoreResult<()> {
    match edit_state(date, now, window_hours) {
        EditState::Editable => Ok(()),
        EditState::Expired => Err(CoreError::EditWindowExpired {
            sale_id,
            window_hours,
        }),
    }
}

// =============================================================================
// Net Deltas
// =============================================================================

/// Nets the stock effect of replacing one set of lines with another.
///
/// `previous` holds the signed deltas the old lines applied (e.g. `-qty`
/// for a sale line); `next` the deltas the new lines will apply. The result
/// is `next − previous` per product, with zero entries dropped. Applying
/// it once equals reversing the old lines and then applying the new ones,
/// without the transient state in between.
///
/// ## Example
/// ```rust
/// use tally_core::rules::net_stock_deltas;
/// use tally_core::Quantity;
///
/// let q = Quantity::from_milli;
/// // Sale line for product 1 changes from 2 to 3 units; product 2 is dropped.
/// let previous = [(1, q(-2000)), (2, q(-1000))];
/// let next = [(1, q(-3000))];
/// let net = net_stock_deltas(previous, next).unwrap();
/// assert_eq!(net[&1_i64], q(-1000));
/// assert_eq!(net[&2_i64], q(1000));
/// ```
pub fn net_stock_deltas<P, N>(previous: P, next: N) -> CoreResult<BTreeMap<i64, Quantity>>
where
    P: IntoIterator<Item = (i64, Quantity)>,
    N: IntoIterator<Item = (i64, Quantity)>,
{
    let mut net: BTreeMap<i64, Quantity> = BTreeMap::new();
    let undo = previous.into_iter().map(|(id, delta)| (id, -delta));

    for (product_id, delta) in undo.chain(next) {
        let entry = net.entry(product_id).or_default();
        *entry = entry
            .checked_add(delta)
            .ok_or_else(|| ValidationError::Overflow {
                field: "quantity".to_string(),
            })?;
    }

    net.retain(|_, delta| !delta.is_zero());
    Ok(net)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn q(milli: i64) -> Quantity {
        Quantity::from_milli(milli)
    }

    #[test]
    fn test_adjustment_creates_record_for_non_negative_delta() {
        assert_eq!(check_adjustment(1, None, q(5000)).unwrap(), q(5000));
        assert_eq!(check_adjustment(1, None, q(0)).unwrap(), q(0));
    }

    #[test]
    fn test_adjustment_without_record_cannot_decrement() {
        let err = check_adjustment(9, None, q(-1000)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Inventory(InventoryError::NoSuchRecord { product_id: 9 })
        ));
    }

    #[test]
    fn test_adjustment_would_go_negative() {
        let err = check_adjustment(3, Some(q(0)), q(-1000)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Inventory(InventoryError::WouldGoNegative { product_id: 3, .. })
        ));

        // Exactly zero is allowed.
        assert_eq!(check_adjustment(3, Some(q(1500)), q(-1500)).unwrap(), q(0));
    }

    #[test]
    fn test_edit_window_boundaries() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let inside = date + Duration::hours(1240);
        let outside = date + Duration::hours(1300);

        assert_eq!(edit_state(date, inside, 1240), EditState::Editable);
        assert_eq!(edit_state(date, outside, 1240), EditState::Expired);
        assert_eq!(edit_state(outside, date, 1240), EditState::Editable);

        assert!(check_edit_window(1, date, inside, 1240).is_ok());
        assert!(matches!(
            check_edit_window(1, date, outside, 1240),
            Err(CoreError::EditWindowExpired { sale_id: 1, window_hours: 1240 })
        ));
    }

    #[test]
    fn test_net_deltas_merge_duplicate_products() {
        let net = net_stock_deltas([(1, q(-1000)), (1, q(-1000))], [(1, q(-2000))]).unwrap();
        assert!(net.is_empty());

        let net = net_stock_deltas(Vec::new(), [(4, q(2500)), (4, q(500))]).unwrap();
        assert_eq!(net[&4_i64], q(3000));
    }

    proptest! {
        /// Whatever sequence of deltas is attempted, stock never goes below zero
        /// and rejected deltas leave it unchanged.
        #[test]
        fn prop_stock_never_negative(deltas in proptest::collection::vec(-5_000i64..5_000, 1..100)) {
            let mut current: Option<Quantity> = None;
            for delta in deltas {
                match check_adjustment(1, current, q(delta)) {
                    Ok(new) => {
                        prop_assert!(!new.is_negative());
                        current = Some(new);
                    }
                    Err(_) => {
                        prop_assert!(current.map_or(delta < 0, |c| c.milli() + delta < 0));
                    }
                }
            }
        }

        /// Applying the net delta equals reversing then reapplying line by line.
        #[test]
        fn prop_net_equals_reverse_then_apply(
            old in proptest::collection::vec((1i64..5, 1i64..10_000), 0..10),
            new in proptest::collection::vec((1i64..5, 1i64..10_000), 0..10),
        ) {
            let previous: Vec<(i64, Quantity)> = old.iter().map(|&(p, m)| (p, q(-m))).collect();
            let next: Vec<(i64, Quantity)> = new.iter().map(|&(p, m)| (p, q(-m))).collect();
            let net = net_stock_deltas(previous.clone(), next.clone()).unwrap();

            for product in 1i64..5 {
                let stepwise: i64 = previous.iter().filter(|(p, _)| *p == product).map(|(_, d)| -d.milli()).sum::<i64>()
                    + next.iter().filter(|(p, _)| *p == product).map(|(_, d)| d.milli()).sum::<i64>();
                let netted = net.get(&product).map_or(0, |d| d.milli());
                prop_assert_eq!(netted, stepwise);
            }
        }
    }
}
