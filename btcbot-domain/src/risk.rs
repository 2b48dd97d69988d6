//! Risk limits, risk snapshot and guard verdicts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

// =============================================================================
// Risk Limits
// =============================================================================

/// Configured ceilings, one per guarded metric. All are fractions except
/// `max_leverage`, which is a multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Peak-to-trough equity decline
    pub max_drawdown: Decimal,
    /// Loss over the current day
    pub daily_loss_limit: Decimal,
    /// Position size as a fraction of equity
    pub max_position_size: Decimal,
    /// Loss on a single trade
    pub max_trade_loss: Decimal,
    /// Leverage multiplier
    pub max_leverage: Decimal,
    /// Difference between expected and observed wallet balance
    pub max_wallet_drift: Decimal,
}

impl RiskLimits {
    /// Check every limit is non-negative.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRiskLimits` naming the first bad field
    pub fn validate(&self) -> Result<(), DomainError> {
        let fields = [
            ("max_drawdown", self.max_drawdown),
            ("daily_loss_limit", self.daily_loss_limit),
            ("max_position_size", self.max_position_size),
            ("max_trade_loss", self.max_trade_loss),
            ("max_leverage", self.max_leverage),
            ("max_wallet_drift", self.max_wallet_drift),
        ];
        for (name, value) in fields {
            if value < Decimal::ZERO {
                return Err(DomainError::InvalidRiskLimits(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        Ok(())
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_drawdown: Decimal::new(2, 1),      // 20%
            daily_loss_limit: Decimal::new(5, 2),  // 5%
            max_position_size: Decimal::new(1, 1), // 10%
            max_trade_loss: Decimal::new(2, 2),    // 2%
            max_leverage: Decimal::new(2, 0),      // 2x
            max_wallet_drift: Decimal::new(2, 2),  // 2%
        }
    }
}

// =============================================================================
// Risk Snapshot
// =============================================================================

/// Current value of each guarded metric. Missing metrics are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Current drawdown
    #[serde(default)]
    pub drawdown: Decimal,
    /// Loss so far today
    #[serde(default)]
    pub daily_loss: Decimal,
    /// Current position size
    #[serde(default)]
    pub position_size: Decimal,
    /// Loss on the open trade
    #[serde(default)]
    pub trade_loss: Decimal,
    /// Current leverage
    #[serde(default)]
    pub leverage: Decimal,
    /// Current wallet drift
    #[serde(default)]
    pub wallet_drift: Decimal,
}

// =============================================================================
// Guard Status
// =============================================================================

/// Verdict severity, ordered `Success < Degraded < Abort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardStatus {
    /// No limit breached
    Success,
    /// Trading paused, process keeps running
    Degraded,
    /// Capital at risk, stop trading
    Abort,
}

impl GuardStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardStatus::Success => "success",
            GuardStatus::Degraded => "degraded",
            GuardStatus::Abort => "abort",
        }
    }
}

impl fmt::Display for GuardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Guard Result
// =============================================================================

/// Outcome of evaluating a snapshot against the limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardResult {
    /// Highest severity among breached conditions
    pub status: GuardStatus,
    /// Reason code of every breached condition
    pub reason_codes: Vec<String>,
    /// Evaluated snapshot
    pub snapshot: RiskSnapshot,
    /// Limits it was evaluated against
    pub limits: RiskLimits,
}

impl GuardResult {
    /// Whether trading may proceed.
    pub fn is_success(&self) -> bool {
        self.status == GuardStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_guard_status_ordering() {
        assert!(GuardStatus::Success < GuardStatus::Degraded);
        assert!(GuardStatus::Degraded < GuardStatus::Abort);
        assert_eq!(
            [GuardStatus::Degraded, GuardStatus::Abort, GuardStatus::Success].iter().max(),
            Some(&GuardStatus::Abort)
        );
    }

    #[test]
    fn test_default_limits() {
        let limits = RiskLimits::default();
        assert_eq!(limits.max_drawdown, dec!(0.2));
        assert_eq!(limits.daily_loss_limit, dec!(0.05));
        assert_eq!(limits.max_position_size, dec!(0.1));
        assert_eq!(limits.max_leverage, dec!(2));
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_negative_limit_rejected() {
        let limits = RiskLimits {
            max_leverage: dec!(-1),
            ..RiskLimits::default()
        };
        let err = limits.validate().unwrap_err();
        assert!(err.to_string().contains("max_leverage"));
    }

    #[test]
    fn test_snapshot_missing_fields_default_to_zero() {
        let snapshot: RiskSnapshot = serde_json::from_str(r#"{"drawdown":"0.25"}"#).unwrap();
        assert_eq!(snapshot.drawdown, dec!(0.25));
        assert_eq!(snapshot.leverage, Decimal::ZERO);
    }
}
