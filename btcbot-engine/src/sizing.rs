//! Position sizer.
//!
//! Two independent caps:
//!
//! ```text
//! risk_qty   = (available_balance × position_risk_fraction) / atr
//! capped_qty = (available_balance × max_position_size) / close
//! qty        = floor(min(risk_qty, capped_qty), qty_step), or 0 if < min_order_qty
//! ```
//!
//! The first bounds the loss per trade relative to volatility, the second
//! bounds total notional exposure. Either can bind.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configured sizing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingParams {
    /// Notional cap as a fraction of balance
    pub max_position_size: Decimal,
    /// Fraction of balance risked per ATR of adverse move
    pub position_risk_fraction: Decimal,
    /// Smallest order the exchange accepts
    pub min_order_qty: Decimal,
    /// Lot step; zero disables flooring
    pub qty_step: Decimal,
}

impl Default for SizingParams {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::new(1, 1),      // 10%
            position_risk_fraction: Decimal::new(1, 2), // 1%
            min_order_qty: Decimal::new(1, 3),          // 0.001
            qty_step: Decimal::new(1, 3),               // 0.001
        }
    }
}

/// Which cap produced the quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingBinding {
    /// Volatility-scaled risk budget
    RiskBudget,
    /// Notional exposure cap
    NotionalCap,
    /// Inputs left nothing to size
    Unsized,
}

/// Sizing result with its inputs, for audit payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSizing {
    pub available_balance: Decimal,
    pub close: Decimal,
    pub atr: Decimal,
    /// `None` when atr is not positive or the quotient does not fit
    pub risk_qty: Option<Decimal>,
    pub capped_qty: Decimal,
    pub final_qty: Decimal,
    pub binding: SizingBinding,
}

/// Size an order; returns only the final quantity.
pub fn size_order(available_balance: Decimal, close: Decimal, atr: Decimal, params: &SizingParams) -> Decimal {
    size_order_detailed(available_balance, close, atr, params).final_qty
}

/// Size an order and keep the intermediate quantities.
pub fn size_order_detailed(
    available_balance: Decimal,
    close: Decimal,
    atr: Decimal,
    params: &SizingParams,
) -> OrderSizing {
    let mut sizing = OrderSizing {
        available_balance,
        close,
        atr,
        risk_qty: None,
        capped_qty: Decimal::ZERO,
        final_qty: Decimal::ZERO,
        binding: SizingBinding::Unsized,
    };

    if available_balance <= Decimal::ZERO || close <= Decimal::ZERO {
        return sizing;
    }

    // A non-positive atr leaves only the notional cap.
    sizing.risk_qty = if atr > Decimal::ZERO {
        available_balance
            .checked_mul(params.position_risk_fraction)
            .and_then(|budget| budget.checked_div(atr))
    } else {
        None
    };
    sizing.capped_qty = available_balance
        .checked_mul(params.max_position_size)
        .and_then(|notional| notional.checked_div(close))
        .unwrap_or(Decimal::MAX);

    let (raw_qty, binding) = match sizing.risk_qty {
        Some(risk_qty) if risk_qty < sizing.capped_qty => (risk_qty, SizingBinding::RiskBudget),
        _ => (sizing.capped_qty, SizingBinding::NotionalCap),
    };

    let stepped = floor_to_step(raw_qty, params.qty_step);
    if stepped <= Decimal::ZERO || stepped < params.min_order_qty {
        return sizing;
    }

    sizing.final_qty = stepped.normalize();
    sizing.binding = binding;
    sizing
}

fn floor_to_step(qty: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return qty;
    }
    match qty.checked_div(step) {
        Some(lots) => lots.floor() * step,
        None => qty,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> SizingParams {
        SizingParams::default()
    }

    #[test]
    fn test_risk_budget_binds_in_high_volatility() {
        // risk: 1_000_000 * 0.01 / 1_000_000 = 0.01; cap: 1_000_000 * 0.1 / 5_000_000 = 0.02
        let sizing = size_order_detailed(dec!(1000000), dec!(5000000), dec!(1000000), &params());
        assert_eq!(sizing.risk_qty, Some(dec!(0.01)));
        assert_eq!(sizing.final_qty, dec!(0.01));
        assert_eq!(sizing.binding, SizingBinding::RiskBudget);
    }

    #[test]
    fn test_notional_cap_binds_in_low_volatility() {
        let sizing = size_order_detailed(dec!(1000000), dec!(5000000), dec!(1000), &params());
        assert_eq!(sizing.capped_qty, dec!(0.02));
        assert_eq!(sizing.final_qty, dec!(0.02));
        assert_eq!(sizing.binding, SizingBinding::NotionalCap);
    }

    #[test]
    fn test_floors_to_step() {
        // cap = 1_000_000 * 0.1 / 3_000_000 = 0.0333..
        let qty = size_order(dec!(1000000), dec!(3000000), dec!(1), &params());
        assert_eq!(qty, dec!(0.033));
    }

    #[test]
    fn test_below_min_is_zero() {
        // cap = 10_000 * 0.1 / 5_000_000 = 0.0002
        let qty = size_order(dec!(10000), dec!(5000000), dec!(1), &params());
        assert_eq!(qty, Decimal::ZERO);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(size_order(dec!(0), dec!(100), dec!(1), &params()), Decimal::ZERO);
        assert_eq!(size_order(dec!(1000), dec!(0), dec!(1), &params()), Decimal::ZERO);

        // atr <= 0 falls back to the notional cap
        let sizing = size_order_detailed(dec!(1000), dec!(100), dec!(0), &params());
        assert_eq!(sizing.risk_qty, None);
        assert_eq!(sizing.final_qty, dec!(1));
    }

    #[test]
    fn test_zero_step_skips_flooring() {
        let p = SizingParams {
            qty_step: Decimal::ZERO,
            ..params()
        };
        let qty = size_order(dec!(1000000), dec!(3000000), dec!(1), &p);
        assert!(qty > dec!(0.0333) && qty < dec!(0.0334));
    }

    #[test]
    fn test_monotone_in_atr() {
        let atrs = [dec!(-1), dec!(0), dec!(1), dec!(100), dec!(1000), dec!(100000), dec!(10000000)];
        let sizes: Vec<Decimal> = atrs
            .iter()
            .map(|atr| size_order(dec!(1000000), dec!(5000000), *atr, &params()))
            .collect();
        for pair in sizes.windows(2) {
            assert!(pair[1] <= pair[0], "{:?}", sizes);
        }
    }

    #[test]
    fn test_monotone_in_balance() {
        let balances = [dec!(0), dec!(1000), dec!(50000), dec!(250000), dec!(1000000), dec!(50000000)];
        let sizes: Vec<Decimal> = balances
            .iter()
            .map(|b| size_order(*b, dec!(5000000), dec!(200000), &params()))
            .collect();
        for pair in sizes.windows(2) {
            assert!(pair[1] >= pair[0], "{:?}", sizes);
        }
    }
}
