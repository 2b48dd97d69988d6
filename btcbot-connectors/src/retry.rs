//! Private call retry policy.
//!
//! Only throttling (`rate_limit`) and transport (`network`) failures are
//! retried. Anything else, or a success, ends the loop at once. Between
//! attempts the loop sleeps `base_delay × 2^attempt_index`, where
//! `attempt_index` is the zero-based index of the attempt that just failed;
//! the first attempt starts immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use btcbot_domain::NormalizedError;

/// Retry budget for private REST calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateRetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl PrivateRetryPolicy {
    /// Create a policy. `max_attempts` below 1 is raised to 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Policy from a fractional number of seconds; negative or non-finite
    /// delays become zero.
    pub fn from_secs_f64(max_attempts: u32, base_delay_secs: f64) -> Self {
        let secs = if base_delay_secs.is_finite() && base_delay_secs > 0.0 {
            base_delay_secs
        } else {
            0.0
        };
        Self::new(max_attempts, Duration::from_secs_f64(secs))
    }

    /// One attempt, no retries.
    pub fn single_shot() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep after the attempt at `attempt_index` failed.
    pub fn delay_after(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt_index);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `call` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `call` receives the zero-based attempt index. Exhausting the budget
    /// returns `EXCHANGE_ERROR` / `private_retry_exhausted`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, NormalizedError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NormalizedError>>,
    {
        for attempt in 0..self.max_attempts {
            let error = match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.category.is_transient() {
                debug!(operation, attempt, category = %error.category, "Private call failed permanently");
                return Err(error);
            }

            let is_last = attempt + 1 >= self.max_attempts;
            warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                category = %error.category,
                source_code = error.source_code.as_deref().unwrap_or(""),
                error = %error.message,
                "Private call failed, {}",
                if is_last { "giving up" } else { "retrying" }
            );

            if !is_last {
                let delay = self.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(NormalizedError::retry_exhausted())
    }
}

impl Default for PrivateRetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::ZERO)
    }
}

// =============================================================================
// Tests
// =============================================================================
