#![deny(warnings)]

//! Demand generation and cost accounting helpers.
//!
//! This module provides:
//! - Weekly customer demand for each supported pattern, seeded for
//!   reproducibility
//! - Holding and stockout cost accrual
//! - A base-stock ("order-up-to") replenishment rule for scripted players

use chain_core::DemandPattern;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Default swing of the generated demand curves.
pub const DEFAULT_DEMAND_AMPLITUDE: u32 = 10;
/// Default base level of the generated demand curves.
pub const DEFAULT_DEMAND_OFFSET: u32 = 5;

/// Customer demand for one week under the given pattern.
///
/// `seed` only affects [`DemandPattern::Random`]; the other patterns are
/// closed-form. Results are never negative.
///
/// Example:
/// let d = demand_for_week(DemandPattern::Constant, 12, 10, 5, 42);
/// assert_eq!(d, 5);
pub fn demand_for_week(
    pattern: DemandPattern,
    week: u32,
    amplitude: u32,
    offset: u32,
    seed: u64,
) -> u32 {
    match pattern {
        DemandPattern::SineWave => {
            let raw = f64::from(amplitude) * (f64::from(week) * 0.1).sin() + f64::from(offset);
            if raw <= 0.0 {
                0
            } else {
                raw as u32
            }
        }
        DemandPattern::Step => {
            if (week / 10) % 2 == 0 {
                amplitude
            } else {
                offset
            }
        }
        DemandPattern::Random => {
            let low = offset.saturating_sub(amplitude / 2);
            let high = offset + amplitude / 2;
            let mut rng = ChaCha8Rng::seed_from_u64(
                seed ^ u64::from(week).wrapping_mul(0x9E37_79B9_7F4A_7C15),
            );
            rng.gen_range(low..=high)
        }
        DemandPattern::Constant => offset,
    }
}

/// Demand for weeks `1..=weeks`, in order.
///
/// Example:
/// let schedule = demand_schedule(DemandPattern::Constant, 3, 10, 5, 0);
/// assert_eq!(schedule, vec![5, 5, 5]);
pub fn demand_schedule(
    pattern: DemandPattern,
    weeks: u32,
    amplitude: u32,
    offset: u32,
    seed: u64,
) -> Vec<u32> {
    (1..=weeks)
        .map(|week| demand_for_week(pattern, week, amplitude, offset, seed))
        .collect()
}

/// Weekly holding cost for on-hand inventory.
pub fn holding_cost(on_hand: u32, rate_per_unit: f64) -> f64 {
    f64::from(on_hand) * rate_per_unit
}

/// Weekly stockout cost for backordered demand.
pub fn stockout_cost(backordered: u32, rate_per_unit: f64) -> f64 {
    f64::from(backordered) * rate_per_unit
}

/// Base-stock replenishment: order enough to cover this week's demand plus
/// the gap between the target level and the current inventory position
/// (on-hand minus backorder). Never negative; an overstocked node orders 0.
///
/// Example:
/// assert_eq!(base_stock_order(10, 0, 8, 15), 13);
/// assert_eq!(base_stock_order(40, 0, 2, 15), 0);
pub fn base_stock_order(
    inventory: u32,
    backorder: u32,
    incoming_demand: u32,
    target_stock: u32,
) -> u32 {
    let position = i64::from(inventory) - i64::from(backorder);
    let order = i64::from(incoming_demand) + (i64::from(target_stock) - position);
    u32::try_from(order.max(0)).unwrap_or(u32::MAX)
}
