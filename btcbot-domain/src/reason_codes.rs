//! Reason codes emitted by the runtime.
//!
//! Every code that appears in a cycle report, progress record or audit event
//! is one of these, or a strategy code passed through unchanged.

/// Drawdown above `max_drawdown` (abort)
pub const MAX_DRAWDOWN_EXCEEDED: &str = "max_drawdown_exceeded";
/// Daily loss above `daily_loss_limit` (degraded)
pub const DAILY_LOSS_LIMIT_EXCEEDED: &str = "daily_loss_limit_exceeded";
/// Position size above `max_position_size` (degraded)
pub const MAX_POSITION_SIZE_EXCEEDED: &str = "max_position_size_exceeded";
/// Trade loss above `max_trade_loss` (abort)
pub const MAX_TRADE_LOSS_EXCEEDED: &str = "max_trade_loss_exceeded";
/// Leverage above `max_leverage` (degraded)
pub const MAX_LEVERAGE_EXCEEDED: &str = "max_leverage_exceeded";
/// Wallet drift above `max_wallet_drift` (degraded)
pub const WALLET_DRIFT_EXCEEDED: &str = "wallet_drift_exceeded";

/// Order placement skipped because a guard fired
pub const SKIPPED_DUE_TO_RISK: &str = "skipped_due_to_risk";
/// Orders disabled by configuration
pub const EXECUTE_ORDERS_DISABLED: &str = "execute_orders_disabled";
/// Real HTTP disabled by configuration
pub const LIVE_HTTP_DISABLED: &str = "live_http_disabled";
/// Strategy produced no setup
pub const NO_TRADE_SETUP: &str = "no_trade_setup";
/// Decision confidence under the configured minimum
pub const CONFIDENCE_BELOW_THRESHOLD: &str = "confidence_below_threshold";
/// Sized quantity rounded below the exchange minimum
pub const ORDER_SIZE_TOO_SMALL: &str = "order_size_too_small";
/// Client order id already submitted
pub const DUPLICATE_ORDER_ATTEMPT: &str = "duplicate_order_attempt";
/// Placement call failed
pub const ORDER_PLACE_FAILED: &str = "order_place_failed";
/// Exchange rejected the order
pub const ORDER_REJECTED: &str = "order_rejected";
/// Confirmation fetch failed
pub const ORDER_FETCH_FAILED: &str = "order_fetch_failed";
/// Cancel call failed
pub const ORDER_CANCEL_FAILED: &str = "order_cancel_failed";
/// A stream reported a retryable failure
pub const STREAM_RECONNECTING: &str = "stream_reconnecting";
/// A stream reported a non-retryable failure
pub const STREAM_DEGRADED: &str = "stream_degraded";

/// Every runtime reason code.
pub const ALL: &[&str] = &[
    MAX_DRAWDOWN_EXCEEDED,
    DAILY_LOSS_LIMIT_EXCEEDED,
    MAX_POSITION_SIZE_EXCEEDED,
    MAX_TRADE_LOSS_EXCEEDED,
    MAX_LEVERAGE_EXCEEDED,
    WALLET_DRIFT_EXCEEDED,
    SKIPPED_DUE_TO_RISK,
    EXECUTE_ORDERS_DISABLED,
    LIVE_HTTP_DISABLED,
    NO_TRADE_SETUP,
    CONFIDENCE_BELOW_THRESHOLD,
    ORDER_SIZE_TOO_SMALL,
    DUPLICATE_ORDER_ATTEMPT,
    ORDER_PLACE_FAILED,
    ORDER_REJECTED,
    ORDER_FETCH_FAILED,
    ORDER_CANCEL_FAILED,
    STREAM_RECONNECTING,
    STREAM_DEGRADED,
];

/// Whether `code` is a runtime reason code.
pub fn is_known(code: &str) -> bool {
    ALL.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique_snake_case() {
        let set: HashSet<_> = ALL.iter().collect();
        assert_eq!(set.len(), ALL.len());
        for code in ALL {
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{code}");
        }
        assert!(is_known("order_rejected"));
        assert!(!is_known("ema_cross_up"));
    }
}
