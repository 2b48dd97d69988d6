//! Supervising daemon loop.
//!
//! Wraps the orchestrator in a retry loop:
//!
//! 1. Run a cycle
//! 2. On success: publish the cycle's monitor status, sleep `interval`
//! 3. On failure: count a reconnect, report `reconnecting`, wait
//!    `reconnect_wait` (linear) and go again
//! 4. Once the reconnect count exceeds `max_reconnect_retries`: report
//!    `failed` and stop with exit code 1
//!
//! The stop token is checked at every loop boundary and during every wait, so
//! a signal stops the loop without interrupting an in-flight cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use btcbot_domain::MonitorStatus;

use crate::config::SupervisorConfig;
use crate::error::DaemonResult;
use crate::metrics::RuntimeMetrics;
use crate::orchestrator::CycleReport;
use crate::progress::{progress_status, ProgressRecord, ProgressSink};

/// `last_error` while waiting to retry a failed cycle.
pub const RECONNECTING_AFTER_ERROR: &str = "reconnecting_after_error";
/// `last_error` of the final record after too many failures.
pub const RUNTIME_EXCEPTION: &str = "runtime_exception";
/// `last_error` of the final record after a stop signal.
pub const SHUTDOWN_SIGNAL: &str = "shutdown_signal";

/// Something that runs one trading cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, reconnect_count: u32) -> DaemonResult<CycleReport>;
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonOutcome {
    /// 0 after a stop signal, 1 after exhausting reconnects
    pub exit_code: i32,
    /// Failed cycles over the daemon's lifetime
    pub reconnect_count: u32,
}

/// The supervising loop.
pub struct SupervisingDaemon<R: CycleRunner + ?Sized> {
    runner: Arc<R>,
    settings: SupervisorConfig,
    metrics: RuntimeMetrics,
    progress: Arc<dyn ProgressSink>,
    shutdown: CancellationToken,
    validation: Option<Value>,
}

impl<R: CycleRunner + ?Sized> SupervisingDaemon<R> {
    pub fn new(
        runner: Arc<R>,
        settings: SupervisorConfig,
        metrics: RuntimeMetrics,
        progress: Arc<dyn ProgressSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            runner,
            settings,
            metrics,
            progress,
            shutdown,
            validation: None,
        }
    }

    /// Attach the startup validation report to the final progress record.
    pub fn with_validation(mut self, validation: Value) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Run until stopped or out of reconnects.
    pub async fn run(&self) -> DaemonOutcome {
        let mut reconnect_count: u32 = 0;
        let mut exit_code = 0;

        info!(
            interval_secs = self.settings.interval.as_secs_f64(),
            max_reconnect_retries = self.settings.max_reconnect_retries,
            "Supervising loop started"
        );

        while !self.shutdown.is_cancelled() {
            self.metrics.inc_run_loop();

            match self.runner.run_cycle(reconnect_count).await {
                Ok(report) => {
                    let status = report.monitor_summary.status;
                    self.metrics.set_monitor_status(status);
                    self.emit(ProgressRecord::live(progress_status::RUNNING, None, status, reconnect_count))
                        .await;

                    if !self.wait(self.settings.interval).await {
                        break;
                    }
                }
                Err(e) => {
                    reconnect_count += 1;
                    self.metrics.inc_run_loop_failure();
                    self.metrics.set_monitor_status(MonitorStatus::Reconnecting);
                    warn!(error = %e, reconnect_count, "Cycle failed");
                    self.emit(ProgressRecord::live(
                        progress_status::DEGRADED,
                        Some(RECONNECTING_AFTER_ERROR.to_string()),
                        MonitorStatus::Reconnecting,
                        reconnect_count,
                    ))
                    .await;

                    if reconnect_count > self.settings.max_reconnect_retries {
                        error!(error = %e, reconnect_count, "Reconnect budget exhausted");
                        self.metrics.set_monitor_status(MonitorStatus::Degraded);
                        self.emit(ProgressRecord::live(
                            progress_status::FAILED,
                            Some(e.to_string()),
                            MonitorStatus::Degraded,
                            reconnect_count,
                        ))
                        .await;
                        exit_code = 1;
                        break;
                    }

                    if !self.wait(self.settings.reconnect_wait).await {
                        break;
                    }
                }
            }
        }

        let (status, last_error) = if exit_code == 1 {
            (progress_status::FAILED, RUNTIME_EXCEPTION)
        } else {
            (progress_status::DEGRADED, SHUTDOWN_SIGNAL)
        };
        self.metrics.set_monitor_status(MonitorStatus::Degraded);
        let mut record = ProgressRecord::live(
            status,
            Some(last_error.to_string()),
            MonitorStatus::Degraded,
            reconnect_count,
        );
        record.validation = self.validation.clone();
        self.emit(record).await;
        self.shutdown.cancel();

        info!(exit_code, reconnect_count, "Supervising loop stopped");
        DaemonOutcome {
            exit_code,
            reconnect_count,
        }
    }

    /// Sleep unless stopped first. Returns false when stopped.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn emit(&self, record: ProgressRecord) {
        if let Err(e) = self.progress.emit_progress(record).await {
            error!(error = %e, "Failed to write progress");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
