//! Trade decision consumed from the strategy.
//!
//! The strategy itself lives outside the runtime; only its output shape is
//! modelled here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::OrderSide;

/// What the strategy wants to do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    /// Open or add long exposure
    Buy,
    /// Open or add short exposure
    Sell,
    /// Do nothing
    Hold,
}

impl DecisionAction {
    /// Order side implied by the action, `None` for hold.
    pub fn order_side(&self) -> Option<OrderSide> {
        match self {
            DecisionAction::Buy => Some(OrderSide::Buy),
            DecisionAction::Sell => Some(OrderSide::Sell),
            DecisionAction::Hold => None,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Buy => "buy",
            DecisionAction::Sell => "sell",
            DecisionAction::Hold => "hold",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy output: action, confidence in `[0, 1]`, and the strategy's own
/// reason codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Requested action
    pub action: DecisionAction,
    /// Confidence, clamped to `[0, 1]`
    pub confidence: f64,
    /// Strategy reason codes, passed through to the cycle report
    #[serde(default)]
    pub reason_codes: Vec<String>,
}

impl Decision {
    /// Build a decision, clamping confidence into range.
    pub fn new(action: DecisionAction, confidence: f64, reason_codes: Vec<String>) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            action,
            confidence,
            reason_codes,
        }
    }

    /// A hold with no setup.
    pub fn hold(reason_code: &str) -> Self {
        Self::new(DecisionAction::Hold, 0.0, vec![reason_code.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Decision::new(DecisionAction::Buy, 1.7, vec![]).confidence, 1.0);
        assert_eq!(Decision::new(DecisionAction::Buy, -0.2, vec![]).confidence, 0.0);
        assert_eq!(Decision::new(DecisionAction::Buy, f64::NAN, vec![]).confidence, 0.0);
    }

    #[test]
    fn test_order_side() {
        assert_eq!(DecisionAction::Buy.order_side(), Some(OrderSide::Buy));
        assert_eq!(DecisionAction::Sell.order_side(), Some(OrderSide::Sell));
        assert_eq!(DecisionAction::Hold.order_side(), None);
    }

    #[test]
    fn test_deserialize() {
        let d: Decision = serde_json::from_str(r#"{"action":"sell","confidence":0.8}"#).unwrap();
        assert_eq!(d.action, DecisionAction::Sell);
        assert!(d.reason_codes.is_empty());
    }
}
