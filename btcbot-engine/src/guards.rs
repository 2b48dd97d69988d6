//! Risk guard evaluator.
//!
//! Six independent `current > limit` checks. Each condition has a fixed
//! severity and reason code; the verdict is the highest severity among the
//! conditions that fired, and every fired condition keeps its reason code.
//!
//! | condition      | severity   | reason code                  |
//! |----------------|------------|------------------------------|
//! | drawdown       | abort      | `max_drawdown_exceeded`      |
//! | daily loss     | degraded   | `daily_loss_limit_exceeded`  |
//! | position size  | degraded   | `max_position_size_exceeded` |
//! | trade loss     | abort      | `max_trade_loss_exceeded`    |
//! | leverage       | degraded   | `max_leverage_exceeded`      |
//! | wallet drift   | degraded   | `wallet_drift_exceeded`      |

use rust_decimal::Decimal;
use tracing::warn;

use btcbot_domain::reason_codes;
use btcbot_domain::{GuardResult, GuardStatus, RiskLimits, RiskSnapshot};

// =============================================================================
// Conditions
// =============================================================================

/// One guarded metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCondition {
    Drawdown,
    DailyLoss,
    PositionSize,
    TradeLoss,
    Leverage,
    WalletDrift,
}

impl RiskCondition {
    /// Evaluation order; also the order reason codes are reported in.
    pub const ALL: [RiskCondition; 6] = [
        RiskCondition::Drawdown,
        RiskCondition::DailyLoss,
        RiskCondition::PositionSize,
        RiskCondition::TradeLoss,
        RiskCondition::Leverage,
        RiskCondition::WalletDrift,
    ];

    pub fn severity(&self) -> GuardStatus {
        match self {
            RiskCondition::Drawdown | RiskCondition::TradeLoss => GuardStatus::Abort,
            _ => GuardStatus::Degraded,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            RiskCondition::Drawdown => reason_codes::MAX_DRAWDOWN_EXCEEDED,
            RiskCondition::DailyLoss => reason_codes::DAILY_LOSS_LIMIT_EXCEEDED,
            RiskCondition::PositionSize => reason_codes::MAX_POSITION_SIZE_EXCEEDED,
            RiskCondition::TradeLoss => reason_codes::MAX_TRADE_LOSS_EXCEEDED,
            RiskCondition::Leverage => reason_codes::MAX_LEVERAGE_EXCEEDED,
            RiskCondition::WalletDrift => reason_codes::WALLET_DRIFT_EXCEEDED,
        }
    }

    pub fn current(&self, snapshot: &RiskSnapshot) -> Decimal {
        match self {
            RiskCondition::Drawdown => snapshot.drawdown,
            RiskCondition::DailyLoss => snapshot.daily_loss,
            RiskCondition::PositionSize => snapshot.position_size,
            RiskCondition::TradeLoss => snapshot.trade_loss,
            RiskCondition::Leverage => snapshot.leverage,
            RiskCondition::WalletDrift => snapshot.wallet_drift,
        }
    }

    pub fn limit(&self, limits: &RiskLimits) -> Decimal {
        match self {
            RiskCondition::Drawdown => limits.max_drawdown,
            RiskCondition::DailyLoss => limits.daily_loss_limit,
            RiskCondition::PositionSize => limits.max_position_size,
            RiskCondition::TradeLoss => limits.max_trade_loss,
            RiskCondition::Leverage => limits.max_leverage,
            RiskCondition::WalletDrift => limits.max_wallet_drift,
        }
    }

    fn is_breached(&self, limits: &RiskLimits, snapshot: &RiskSnapshot) -> bool {
        self.current(snapshot) > self.limit(limits)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluate `snapshot` against `limits`.
pub fn evaluate(limits: &RiskLimits, snapshot: &RiskSnapshot) -> GuardResult {
    let mut status = GuardStatus::Success;
    let mut reason_codes = Vec::new();

    for condition in RiskCondition::ALL {
        if !condition.is_breached(limits, snapshot) {
            continue;
        }
        warn!(
            reason_code = condition.reason_code(),
            current = %condition.current(snapshot),
            limit = %condition.limit(limits),
            severity = %condition.severity(),
            "Risk guard triggered"
        );
        status = status.max(condition.severity());
        reason_codes.push(condition.reason_code().to_string());
    }

    GuardResult {
        status,
        reason_codes,
        snapshot: *snapshot,
        limits: *limits,
    }
}

// =============================================================================
// Tests
// =============================================================================
