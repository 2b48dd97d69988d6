//! btcbot Daemon Library
//!
//! Live trading runtime: one exchange, one order at a time, hard risk limits.
//!
//! # Architecture
//!
//! ```text
//! signals → SupervisingDaemon ──► LiveOrchestrator ──► risk guards / sizer
//!               │                        │
//!               │                        ├─► OrderJournal → ExchangePort → LifecycleTracker
//!               │                        ├─► stream probes → monitor status
//!               │                        └─► audit sink, progress sink
//!               ▼
//!         metrics snapshot ◄── /healthz, /metrics listener
//! ```
//!
//! # Components
//!
//! - **Config**: environment-based configuration and startup validation
//! - **Orchestrator**: one trading cycle
//! - **Monitor**: stream health folded into a monitor status
//! - **Daemon**: supervising retry loop
//! - **API**: health and metrics endpoints
//! - **Audit / Progress**: JSONL audit trail and `run_progress.json`
//!
//! # Example
//!
//! ```rust,ignore
//! use btcbotd::{Config, LiveOrchestrator, SupervisingDaemon};
//!
//! let orchestrator = Arc::new(LiveOrchestrator::new(config.clone(), exchange, inputs, audit, progress.clone()));
//! let daemon = SupervisingDaemon::new(orchestrator, config.supervisor.clone(), metrics, progress, shutdown);
//! let outcome = daemon.run().await;
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod audit;
pub mod config;
pub mod daemon;
pub mod error;
pub mod inputs;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod progress;

// Re-exports for convenience
pub use api::{create_router, start_api_server, ApiState};
pub use audit::{AuditLogPolicy, AuditRecord, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use config::{
    validate_runtime_environment, ApiConfig, Config, Environment, ExchangeConfig, ExecutionConfig,
    PathsConfig, RuntimeValidation, SupervisorConfig,
};
pub use daemon::{CycleRunner, DaemonOutcome, SupervisingDaemon};
pub use error::{DaemonError, DaemonResult};
pub use inputs::{CycleInputSource, CycleInputs, JsonFileInputs, StaticInputs};
pub use metrics::RuntimeMetrics;
pub use monitor::{MonitorSummary, ProbeOutcome};
pub use orchestrator::{CycleReport, LifecycleSummary, LiveOrchestrator};
pub use progress::{FileProgressSink, MemoryProgressSink, ProgressRecord, ProgressSink};
