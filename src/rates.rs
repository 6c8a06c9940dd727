//! Numeric conversions between reference prices, fixed-point asset rates,
//! and lightning routing fees.

use std::fmt;

use num_bigint::BigUint;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

use crate::errors::{AppError, Result};
use crate::models::{DEFAULT_ROUTING_POLICY, RoutingFeeEstimate, RoutingPolicy};

pub const SATS_PER_BTC: u64 = 100_000_000;
pub const MSAT_PER_SAT: u64 = 1_000;
const PPM: u128 = 1_000_000;

/// Integer coefficient scaled down by `10^scale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPoint {
    pub coefficient: BigUint,
    pub scale: u8,
}

impl FixedPoint {
    pub fn from_u64(value: u64, scale: u8) -> Self {
        Self {
            coefficient: BigUint::from(value),
            scale,
        }
    }

    /// Floors `value * 10^scale` into the coefficient. `None` for negative or non-finite input.
    pub fn from_f64(value: f64, scale: u8) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let scaled = (value * 10f64.powi(scale as i32)).floor();
        Some(Self {
            coefficient: BigUint::from_f64(scaled)?,
            scale,
        })
    }

    pub fn to_f64(&self) -> f64 {
        let c = self.coefficient.to_f64().unwrap_or(f64::INFINITY);
        c / 10f64.powi(self.scale as i32)
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}e-{}", self.coefficient, self.scale)
    }
}

/// Asset units per BTC for a BTC-denominated reference price.
///
/// The asset's smallest unit is `10^-decimal_display` of the display unit, so a
/// USDT price of 65_000.25 with two decimals becomes 6_500_025 units per BTC.
/// The result always carries scale 0.
pub fn asset_rate_from_price(price_per_btc: f64, decimal_display: u8) -> Result<FixedPoint> {
    let units = price_per_btc * 10f64.powi(decimal_display as i32);
    let rate = FixedPoint::from_f64(units, 0).ok_or_else(|| {
        AppError::InvalidRequest(format!("cannot express price {price_per_btc} as a rate"))
    })?;
    Ok(rate)
}

/// How many whole asset units `sats_offered` buys at `rate` (asset units per BTC).
///
/// `fee_rate` is a fraction (0.002 for 0.2%) taken off before flooring, so rounding
/// never favors the requester.
pub fn asset_units_to_receive(rate: &FixedPoint, sats_offered: u64, fee_rate: f64) -> u64 {
    let units_per_btc = rate.to_f64();
    let units_per_sat = units_per_btc / SATS_PER_BTC as f64;
    let fee_rate = if fee_rate.is_finite() {
        fee_rate.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let units = sats_offered as f64 * units_per_sat * (1.0 - fee_rate);
    if !units.is_finite() || units <= 0.0 {
        return 0;
    }
    units.floor() as u64
}

/// Routing fee for forwarding `amount_sat` under `policy`, falling back to
/// [`DEFAULT_ROUTING_POLICY`] when the counter-party publishes none.
pub fn routing_fee(amount_sat: u64, policy: Option<RoutingPolicy>) -> RoutingFeeEstimate {
    let policy = policy.unwrap_or(DEFAULT_ROUTING_POLICY);
    let base_fee_sat = u64::from(policy.fee_base_msat) / MSAT_PER_SAT;
    // The proportional part is taken over the sat amount and then treated as msat,
    // matching how the counter-party sizes its own budget.
    let var_fee_msat = (u128::from(amount_sat) * u128::from(policy.fee_rate_ppm)) / PPM;
    let proportional_fee_sat = (var_fee_msat / u128::from(MSAT_PER_SAT)) as u64;
    RoutingFeeEstimate {
        policy,
        base_fee_sat,
        proportional_fee_sat,
        total_fee_sat: base_fee_sat.saturating_add(proportional_fee_sat),
    }
}

/// Maximum payment the counter-party may ask for, in msat.
pub fn payment_budget_msat(amount_sat: u64, fee: &RoutingFeeEstimate, buffer_sat: u64) -> u64 {
    amount_sat
        .saturating_add(fee.total_fee_sat)
        .saturating_add(buffer_sat)
        .saturating_mul(MSAT_PER_SAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceSnapshot;
    use proptest::prelude::*;

    #[test]
    fn fee_with_fallback_policy_on_small_amount() {
        let fee = routing_fee(5_000, None);
        assert_eq!(fee.policy, DEFAULT_ROUTING_POLICY);
        assert_eq!(fee.base_fee_sat, 1);
        assert_eq!(fee.proportional_fee_sat, 0);
        assert_eq!(fee.total_fee_sat, 1);
    }

    #[test]
    fn fee_with_published_policy() {
        let policy = RoutingPolicy {
            time_lock_delta: 40,
            fee_base_msat: 2_500,
            fee_rate_ppm: 500_000,
        };
        // 10_000 * 500_000 / 1e6 = 5_000 msat -> 5 sat
        let fee = routing_fee(10_000, Some(policy));
        assert_eq!(fee.base_fee_sat, 2);
        assert_eq!(fee.proportional_fee_sat, 5);
        assert_eq!(fee.total_fee_sat, 7);
        assert_eq!(payment_budget_msat(10_000, &fee, 0), 10_007_000);
        assert_eq!(payment_budget_msat(10_000, &fee, 3), 10_010_000);
    }

    #[test]
    fn rate_from_price_uses_decimal_display() {
        let rate = asset_rate_from_price(65_000.25, 2).unwrap();
        assert_eq!(rate.coefficient, BigUint::from(6_500_025u64));
        assert_eq!(rate.scale, 0);
        assert!(asset_rate_from_price(-1.0, 2).is_err());
        assert!(asset_rate_from_price(f64::NAN, 2).is_err());
    }

    #[test]
    fn units_to_receive_floors() {
        // 10_000_000 units per BTC -> 0.1 unit per sat
        let rate = FixedPoint::from_u64(10_000_000, 0);
        assert_eq!(asset_units_to_receive(&rate, 5_005, 0.0), 500);
        assert_eq!(asset_units_to_receive(&rate, 9, 0.0), 0);
        // 0.2% fee: 500.5 * 0.998 = 499.499
        assert_eq!(asset_units_to_receive(&rate, 5_005, 0.002), 499);
    }

    #[test]
    fn fixed_point_scale_round_trips_value() {
        let fp = FixedPoint::from_f64(1.25, 2).unwrap();
        assert_eq!(fp.coefficient, BigUint::from(125u32));
        assert!((fp.to_f64() - 1.25).abs() < 1e-12);
        assert_eq!(fp.to_string(), "125e-2");
    }

    proptest! {
        #[test]
        fn fee_is_deterministic(amount in any::<u64>(), base in any::<u32>(), ppm in any::<u32>()) {
            let policy = RoutingPolicy { time_lock_delta: 80, fee_base_msat: base, fee_rate_ppm: ppm };
            let a = routing_fee(amount, Some(policy));
            let b = routing_fee(amount, Some(policy));
            prop_assert_eq!(a, b);
            prop_assert_eq!(a.total_fee_sat, a.base_fee_sat.saturating_add(a.proportional_fee_sat));
        }

        #[test]
        fn spread_brackets_index(index in 0.0f64..1e7, spread in 0.0f64..10_000.0) {
            let s = PriceSnapshot::from_index(index, spread);
            prop_assert!(s.bid <= s.index);
            prop_assert!(s.index <= s.ask);
        }

        #[test]
        fn spread_width_is_monotonic(index in 1.0f64..1e7, lo in 0.0f64..5_000.0, extra in 0.0f64..5_000.0) {
            let narrow = PriceSnapshot::from_index(index, lo);
            let wide = PriceSnapshot::from_index(index, lo + extra);
            prop_assert!(wide.ask - wide.bid >= narrow.ask - narrow.bid - 1e-9);
        }
    }
}
