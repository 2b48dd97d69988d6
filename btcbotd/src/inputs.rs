//! Per-cycle inputs from external collaborators.
//!
//! The strategy and the indicator pipeline live outside the daemon. Each cycle
//! the orchestrator pulls one [`CycleInputs`]: the risk snapshot, the trade
//! decision, and the close/ATR pair the sizer needs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use btcbot_domain::{reason_codes, Decision, RiskSnapshot};

use crate::error::{DaemonError, DaemonResult};

/// Everything one cycle consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleInputs {
    #[serde(default)]
    pub snapshot: RiskSnapshot,
    pub decision: Decision,
    /// Last close price
    pub close: Decimal,
    /// Average true range at the close
    pub atr: Decimal,
    /// Use this instead of querying the exchange balance
    #[serde(default)]
    pub balance_override: Option<Decimal>,
}

impl CycleInputs {
    /// Flat snapshot, hold decision, nothing to size.
    pub fn no_setup() -> Self {
        Self {
            snapshot: RiskSnapshot::default(),
            decision: Decision::hold(reason_codes::NO_TRADE_SETUP),
            close: Decimal::ZERO,
            atr: Decimal::ZERO,
            balance_override: None,
        }
    }
}

/// Source of cycle inputs.
#[async_trait]
pub trait CycleInputSource: Send + Sync {
    async fn next_inputs(&self) -> DaemonResult<CycleInputs>;
}

/// Same inputs every cycle.
pub struct StaticInputs {
    inputs: CycleInputs,
}

impl StaticInputs {
    pub fn new(inputs: CycleInputs) -> Self {
        Self { inputs }
    }
}

#[async_trait]
impl CycleInputSource for StaticInputs {
    async fn next_inputs(&self) -> DaemonResult<CycleInputs> {
        Ok(self.inputs.clone())
    }
}

/// Reads a JSON document written by the strategy process.
///
/// A missing file means the strategy has not produced anything yet and yields
/// [`CycleInputs::no_setup`]. A malformed file fails the cycle.
pub struct JsonFileInputs {
    path: PathBuf,
}

impl JsonFileInputs {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CycleInputSource for JsonFileInputs {
    async fn next_inputs(&self) -> DaemonResult<CycleInputs> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cycle inputs yet");
                return Ok(CycleInputs::no_setup());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            DaemonError::Inputs(format!("{}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btcbot_domain::DecisionAction;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_missing_file_is_no_setup() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileInputs::new(dir.path().join("cycle_inputs.json"));

        let inputs = source.next_inputs().await.unwrap();
        assert_eq!(inputs.decision.action, DecisionAction::Hold);
        assert_eq!(inputs.decision.reason_codes, vec!["no_trade_setup"]);
    }

    #[tokio::test]
    async fn test_reads_strategy_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycle_inputs.json");
        std::fs::write(
            &path,
            r#"{
                "snapshot": {"drawdown": "0.05"},
                "decision": {"action": "buy", "confidence": 0.8, "reason_codes": ["ema_cross_up"]},
                "close": "5000000",
                "atr": "100000"
            }"#,
        )
        .unwrap();

        let inputs = JsonFileInputs::new(&path).next_inputs().await.unwrap();
        assert_eq!(inputs.snapshot.drawdown, dec!(0.05));
        assert_eq!(inputs.snapshot.leverage, Decimal::ZERO);
        assert_eq!(inputs.decision.action, DecisionAction::Buy);
        assert_eq!(inputs.close, dec!(5000000));
        assert_eq!(inputs.balance_override, None);
    }

    #[tokio::test]
    async fn test_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycle_inputs.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileInputs::new(&path).next_inputs().await.unwrap_err();
        assert!(matches!(err, DaemonError::Inputs(_)));
    }
}
