//! Stream health monitor.
//!
//! Each cycle reads at most one item from the order stream and one from the
//! account stream, each bounded by the probe timeout, and folds what it saw
//! into a [`MonitorStatus`]:
//!
//! - any non-retryable stream error → `degraded`
//! - otherwise any retryable stream error → `reconnecting`
//! - otherwise (event, quiet, or ended) → `active`
//!
//! A guard verdict other than success forces `degraded` whatever the streams
//! say. The aggregation is deliberately coarse: one unhealthy stream colours
//! the whole status.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use btcbot_domain::{reason_codes, GuardResult, MonitorStatus, NormalizedError};
use btcbot_exec::{EventStream, ExchangePort};

/// What a single probe observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// An event arrived
    Event,
    /// The stream yielded an error item
    Error(NormalizedError),
    /// The stream ended without yielding
    Ended,
    /// Nothing arrived within the probe timeout
    Quiet,
}

/// Monitor section of the cycle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub status: MonitorStatus,
    pub reconnect_count: u32,
}

/// Read one item from `stream`, waiting at most `timeout`.
pub async fn probe<T>(mut stream: EventStream<T>, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, stream.next()).await {
        Ok(Some(Ok(_))) => ProbeOutcome::Event,
        Ok(Some(Err(error))) => ProbeOutcome::Error(error),
        Ok(None) => ProbeOutcome::Ended,
        Err(_) => ProbeOutcome::Quiet,
    }
}

/// Probe the order and account streams concurrently.
pub async fn probe_streams<E>(exchange: &E, timeout: Duration) -> [ProbeOutcome; 2]
where
    E: ExchangePort + ?Sized,
{
    let (orders, account) = tokio::join!(
        probe(exchange.stream_order_events(), timeout),
        probe(exchange.stream_account_events(), timeout),
    );
    debug!(?orders, ?account, "Stream probes");
    [orders, account]
}

/// Fold probe outcomes and the guard verdict into a status plus the stream
/// reason codes that explain it.
pub fn derive_status(probes: &[ProbeOutcome], guard: &GuardResult) -> (MonitorStatus, Vec<String>) {
    let errors: Vec<&NormalizedError> = probes
        .iter()
        .filter_map(|p| match p {
            ProbeOutcome::Error(error) => Some(error),
            _ => None,
        })
        .collect();

    let (mut status, codes) = if errors.iter().any(|e| !e.retryable) {
        (MonitorStatus::Degraded, vec![reason_codes::STREAM_DEGRADED.to_string()])
    } else if !errors.is_empty() {
        (MonitorStatus::Reconnecting, vec![reason_codes::STREAM_RECONNECTING.to_string()])
    } else {
        (MonitorStatus::Active, Vec::new())
    };

    for error in &errors {
        warn!(category = %error.category, retryable = error.retryable, message = %error.message, "Stream unhealthy");
    }

    if !guard.is_success() {
        status = MonitorStatus::Degraded;
    }
    (status, codes)
}
