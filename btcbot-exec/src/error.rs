//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur during execution bookkeeping.
///
/// Exchange failures are not here: they travel as `NormalizedError` values
/// inside order states and stream items.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Order journal error
    #[error("Order journal error: {0}")]
    Journal(String),

    /// Client order id already submitted (idempotency check)
    #[error("Order already submitted: {0}")]
    AlreadySubmitted(String),

    /// Order id not present in the journal
    #[error("Unknown order attempt: {0}")]
    UnknownAttempt(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
