//! Prometheus metrics for the supervising loop.
//!
//! ```text
//! run_loop_total                    counter
//! run_loop_failures_total           counter
//! monitor_status{status="..."}      gauge (degraded=0, active=1, reconnecting=2)
//! ```
//!
//! Only the current monitor status has a series; switching status drops the
//! previous label.

use std::sync::{Arc, Mutex, PoisonError};

use prometheus::{Encoder, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};

use btcbot_domain::MonitorStatus;

use crate::error::DaemonResult;

/// Loop counters and the monitor gauge, shared with the HTTP listener.
#[derive(Clone)]
pub struct RuntimeMetrics {
    registry: Registry,
    run_loop_total: IntCounter,
    run_loop_failures_total: IntCounter,
    monitor_status: IntGaugeVec,
    current: Arc<Mutex<MonitorStatus>>,
}

impl RuntimeMetrics {
    /// Register the runtime metrics in a fresh registry, starting `active`.
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let run_loop_total = IntCounter::with_opts(Opts::new(
            "run_loop_total",
            "Total number of loop iterations.",
        ))?;
        let run_loop_failures_total = IntCounter::with_opts(Opts::new(
            "run_loop_failures_total",
            "Total number of loop failures.",
        ))?;
        let monitor_status = IntGaugeVec::new(
            Opts::new(
                "monitor_status",
                "Current monitor status as numeric gauge (degraded=0, active=1, reconnecting=2).",
            ),
            &["status"],
        )?;

        registry.register(Box::new(run_loop_total.clone()))?;
        registry.register(Box::new(run_loop_failures_total.clone()))?;
        registry.register(Box::new(monitor_status.clone()))?;

        let metrics = Self {
            registry,
            run_loop_total,
            run_loop_failures_total,
            monitor_status,
            current: Arc::new(Mutex::new(MonitorStatus::Active)),
        };
        metrics.set_monitor_status(MonitorStatus::Active);
        Ok(metrics)
    }

    pub fn inc_run_loop(&self) {
        self.run_loop_total.inc();
    }

    pub fn inc_run_loop_failure(&self) {
        self.run_loop_failures_total.inc();
    }

    pub fn run_loop_total(&self) -> u64 {
        self.run_loop_total.get()
    }

    pub fn run_loop_failures_total(&self) -> u64 {
        self.run_loop_failures_total.get()
    }

    /// Replace the exported monitor status.
    pub fn set_monitor_status(&self, status: MonitorStatus) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.monitor_status.reset();
        self.monitor_status
            .with_label_values(&[status.as_str()])
            .set(status.gauge_value());
        *current = status;
    }

    pub fn monitor_status(&self) -> MonitorStatus {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> DaemonResult<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_has_all_series() {
        let metrics = RuntimeMetrics::new().unwrap();
        metrics.inc_run_loop();
        metrics.inc_run_loop();
        metrics.inc_run_loop_failure();

        let text = metrics.render().unwrap();
        assert!(text.contains("# TYPE run_loop_total counter"));
        assert!(text.contains("run_loop_total 2"));
        assert!(text.contains("run_loop_failures_total 1"));
        assert!(text.contains("# TYPE monitor_status gauge"));
        assert!(text.contains("monitor_status{status=\"active\"} 1"));
    }

    #[test]
    fn test_only_current_status_is_exported() {
        let metrics = RuntimeMetrics::new().unwrap();
        metrics.set_monitor_status(MonitorStatus::Reconnecting);
        metrics.set_monitor_status(MonitorStatus::Degraded);

        let text = metrics.render().unwrap();
        assert!(text.contains("monitor_status{status=\"degraded\"} 0"));
        assert!(!text.contains("status=\"active\""));
        assert!(!text.contains("status=\"reconnecting\""));
        assert_eq!(metrics.monitor_status(), MonitorStatus::Degraded);
    }

    #[test]
    fn test_clones_share_state() {
        let metrics = RuntimeMetrics::new().unwrap();
        let listener_view = metrics.clone();
        metrics.inc_run_loop_failure();
        assert_eq!(listener_view.run_loop_failures_total(), 1);
    }
}
