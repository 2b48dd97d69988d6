//! Order lifecycle tracker.
//!
//! Drives one placed order through a bounded sequence:
//!
//! ```text
//! accepted|active ─fetch─► active|rejected|error ─cancel (if active)─► cancelled|error
//! ```
//!
//! An exchange may report an order as merely accepted before it is live, so
//! the tracker always re-reads the order before deciding to cancel it. At most
//! one fetch and one cancel are issued per order.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use btcbot_domain::{order_status, reason_codes, NormalizedOrderState};

use crate::ports::ExchangePort;

// =============================================================================
// Lifecycle result
// =============================================================================

/// Exchange call made by the tracker after placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LifecycleStep {
    /// `fetch_order` and what it returned
    Fetch { state: NormalizedOrderState },
    /// `cancel_order` and what it returned
    Cancel { state: NormalizedOrderState },
    /// Order still active but auto-cancel is off; no call made
    CancelSkipped { order_id: String },
}

/// Everything observed while tracking one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLifecycle {
    /// Every status observed, starting with the placement result
    pub transitions: Vec<String>,
    /// Last state observed
    pub final_state: NormalizedOrderState,
    /// Lifecycle reason codes (`order_place_failed`, `order_fetch_failed`, ...)
    pub reason_codes: Vec<String>,
    /// Retryability of the error that stopped the sequence, if one did
    pub retryable: Option<bool>,
    /// Calls made after placement, in order
    pub steps: Vec<LifecycleStep>,
}

impl OrderLifecycle {
    fn start(placed: NormalizedOrderState) -> Self {
        Self {
            transitions: vec![placed.status.clone()],
            final_state: placed,
            reason_codes: Vec::new(),
            retryable: None,
            steps: Vec::new(),
        }
    }

    fn observe(&mut self, state: NormalizedOrderState) {
        self.transitions.push(state.status.clone());
        self.final_state = state;
    }

    fn fail(&mut self, reason_code: &str) {
        self.retryable = self.final_state.error().map(|e| e.retryable);
        self.reason_codes.push(reason_code.to_string());
    }

    /// Final status word.
    pub fn final_status(&self) -> &str {
        &self.final_state.status
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Runs the post-placement fetch/cancel sequence.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTracker {
    auto_cancel: bool,
}

impl LifecycleTracker {
    /// Create a tracker. With `auto_cancel` off an order left active is only
    /// logged.
    pub fn new(auto_cancel: bool) -> Self {
        Self { auto_cancel }
    }

    /// Track an order from its placement result.
    pub async fn track<E>(&self, exchange: &E, placed: NormalizedOrderState) -> OrderLifecycle
    where
        E: ExchangePort + ?Sized,
    {
        let mut lifecycle = OrderLifecycle::start(placed);

        if lifecycle.final_state.is_error() {
            lifecycle.fail(reason_codes::ORDER_PLACE_FAILED);
            return lifecycle;
        }

        let order_id = lifecycle.final_state.order_id.clone();

        if matches!(lifecycle.final_status(), order_status::ACCEPTED | order_status::ACTIVE) {
            let fetched = exchange.fetch_order(&order_id).await;
            lifecycle.steps.push(LifecycleStep::Fetch { state: fetched.clone() });
            lifecycle.observe(fetched);

            if lifecycle.final_state.is_error() {
                warn!(%order_id, "Order fetch failed");
                lifecycle.fail(reason_codes::ORDER_FETCH_FAILED);
                return lifecycle;
            }
        }

        if lifecycle.final_status() == order_status::ACTIVE {
            if !self.auto_cancel {
                info!(%order_id, "Order still active, auto-cancel disabled; skipping cancel");
                lifecycle.steps.push(LifecycleStep::CancelSkipped { order_id });
                return lifecycle;
            }

            let cancelled = exchange.cancel_order(&order_id).await;
            lifecycle.steps.push(LifecycleStep::Cancel { state: cancelled.clone() });
            lifecycle.observe(cancelled);

            if lifecycle.final_state.is_error() {
                warn!(%order_id, "Order cancel failed");
                lifecycle.fail(reason_codes::ORDER_CANCEL_FAILED);
                return lifecycle;
            }
        }

        if lifecycle.final_status() == order_status::REJECTED {
            lifecycle.reason_codes.push(reason_codes::ORDER_REJECTED.to_string());
        }

        info!(
            %order_id,
            transitions = ?lifecycle.transitions,
            "Order lifecycle complete"
        );
        lifecycle
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubExchange, StubOutcome};
    use btcbot_domain::{normalize_error, ProductType};
    use rust_decimal_macros::dec;

    fn stub() -> StubExchange {
        StubExchange::new(ProductType::Spot, dec!(100000))
    }

    fn placed(status: &str) -> NormalizedOrderState {
        NormalizedOrderState::bare("42", status, ProductType::Spot)
    }

    #[tokio::test]
    async fn test_accepted_then_active_is_cancelled() {
        let exchange = stub();
        let lifecycle = LifecycleTracker::new(true).track(&exchange, placed("accepted")).await;

        assert_eq!(lifecycle.transitions, vec!["accepted", "active", "cancelled"]);
        assert!(lifecycle.reason_codes.is_empty());
        assert_eq!(lifecycle.retryable, None);
        assert_eq!(exchange.fetch_calls(), 1);
        assert_eq!(exchange.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_cancel_disabled_skips_cancel() {
        let exchange = stub();
        let lifecycle = LifecycleTracker::new(false).track(&exchange, placed("accepted")).await;

        assert_eq!(lifecycle.transitions, vec!["accepted", "active"]);
        assert_eq!(exchange.cancel_calls(), 0);
        assert!(matches!(lifecycle.steps.last(), Some(LifecycleStep::CancelSkipped { .. })));
    }

    #[tokio::test]
    async fn test_rejected_after_fetch() {
        let exchange = stub();
        exchange.set_fetch(StubOutcome::status("rejected"));
        let lifecycle = LifecycleTracker::new(true).track(&exchange, placed("accepted")).await;

        assert_eq!(lifecycle.transitions, vec!["accepted", "rejected"]);
        assert_eq!(lifecycle.reason_codes, vec!["order_rejected"]);
        assert_eq!(exchange.cancel_calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_stops_and_keeps_retryable() {
        let exchange = stub();
        exchange.set_fetch(StubOutcome::Error(normalize_error(Some("NETWORK_TIMEOUT"), "timeout")));
        let lifecycle = LifecycleTracker::new(true).track(&exchange, placed("accepted")).await;

        assert_eq!(lifecycle.transitions, vec!["accepted", "error"]);
        assert_eq!(lifecycle.reason_codes, vec!["order_fetch_failed"]);
        assert_eq!(lifecycle.retryable, Some(true));
        assert_eq!(exchange.cancel_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_error() {
        let exchange = stub();
        exchange.set_cancel(StubOutcome::Error(normalize_error(Some("INVALID_PARAM"), "bad id")));
        let lifecycle = LifecycleTracker::new(true).track(&exchange, placed("active")).await;

        assert_eq!(lifecycle.transitions, vec!["active", "active", "error"]);
        assert_eq!(lifecycle.reason_codes, vec!["order_cancel_failed"]);
        assert_eq!(lifecycle.retryable, Some(false));
    }

    #[tokio::test]
    async fn test_place_error_makes_no_calls() {
        let exchange = stub();
        let err = normalize_error(Some("AUTH_FAILED"), "missing credentials");
        let state = NormalizedOrderState::from_error("", ProductType::Spot, &err);
        let lifecycle = LifecycleTracker::new(true).track(&exchange, state).await;

        assert_eq!(lifecycle.transitions, vec!["error"]);
        assert_eq!(lifecycle.reason_codes, vec!["order_place_failed"]);
        assert_eq!(lifecycle.retryable, Some(false));
        assert_eq!(exchange.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_filled_needs_no_calls() {
        let exchange = stub();
        let lifecycle = LifecycleTracker::new(true).track(&exchange, placed("filled")).await;

        assert_eq!(lifecycle.transitions, vec!["filled"]);
        assert_eq!(exchange.fetch_calls(), 0);
        assert_eq!(exchange.cancel_calls(), 0);
    }
}
