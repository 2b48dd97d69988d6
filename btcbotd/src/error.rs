//! Daemon error types.

use btcbot_domain::DomainError;
use btcbot_exec::ExecError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup validation found fatal problems
    #[error("Runtime environment invalid: {}", .0.join(", "))]
    Environment(Vec<String>),

    /// Audit or progress file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Cycle inputs could not be produced
    #[error("Cycle input error: {0}")]
    Inputs(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
