//! Error taxonomy for exchange failures.
//!
//! Every raw failure observed at the exchange boundary (HTTP status, API
//! error code, socket error) is classified once into a [`NormalizedError`].
//! Retry decisions anywhere in the system read only `category` and
//! `retryable`; they never look at exchange-specific codes.
//!
//! | source code examples                             | category     | retryable |
//! |--------------------------------------------------|--------------|-----------|
//! | AUTH_FAILED, INVALID_API_KEY, UNAUTHORIZED       | `auth`       | no        |
//! | RATE_LIMIT, TOO_MANY_REQUESTS, THROTTLED         | `rate_limit` | yes       |
//! | INVALID_PARAM, BAD_REQUEST, INSUFFICIENT_MARGIN  | `validation` | no        |
//! | NETWORK_TIMEOUT, CONNECTION_ERROR, DNS_ERROR     | `network`    | yes       |
//! | anything else                                    | `exchange`   | yes       |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

// =============================================================================
// Source codes
// =============================================================================

/// Source codes produced locally (not by the exchange).
pub mod source_codes {
    /// Missing or rejected credentials.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Throttled by the exchange.
    pub const RATE_LIMIT: &str = "RATE_LIMIT";
    /// Request rejected as malformed.
    pub const INVALID_PARAM: &str = "INVALID_PARAM";
    /// Request or socket timed out.
    pub const NETWORK_TIMEOUT: &str = "NETWORK_TIMEOUT";
    /// Connection refused, reset or closed.
    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    /// Generic exchange-side failure.
    pub const EXCHANGE_ERROR: &str = "EXCHANGE_ERROR";
    /// Response could not be interpreted.
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
}

const AUTH_CODES: &[&str] = &["AUTH_FAILED", "INVALID_API_KEY", "UNAUTHORIZED"];
const RATE_LIMIT_CODES: &[&str] = &["RATE_LIMIT", "TOO_MANY_REQUESTS", "THROTTLED"];
const VALIDATION_CODES: &[&str] = &["INVALID_PARAM", "BAD_REQUEST", "INSUFFICIENT_MARGIN"];
const NETWORK_CODES: &[&str] = &["NETWORK_TIMEOUT", "CONNECTION_ERROR", "DNS_ERROR"];

// =============================================================================
// Error Category
// =============================================================================

/// Coarse failure class used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credential problem, never retried
    Auth,
    /// Throttling, retried with backoff
    RateLimit,
    /// Caller error, never retried
    Validation,
    /// Transport failure, retried with backoff
    Network,
    /// Unmapped exchange failure
    Exchange,
}

impl ErrorCategory {
    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network",
            ErrorCategory::Exchange => "exchange",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auth" => Some(ErrorCategory::Auth),
            "rate_limit" => Some(ErrorCategory::RateLimit),
            "validation" => Some(ErrorCategory::Validation),
            "network" => Some(ErrorCategory::Network),
            "exchange" => Some(ErrorCategory::Exchange),
            _ => None,
        }
    }

    /// Whether failures of this class are worth another private attempt.
    ///
    /// Narrower than [`NormalizedError::retryable`]: `exchange` errors are
    /// flagged retryable for callers but the private retry loop only repeats
    /// throttling and transport failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorCategory::RateLimit | ErrorCategory::Network)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Normalized Error
// =============================================================================

/// A classified exchange failure.
///
/// Created once where the raw failure is observed and passed around by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{category} error: {message}")]
pub struct NormalizedError {
    /// Failure class
    pub category: ErrorCategory,
    /// Whether the caller may try again later
    pub retryable: bool,
    /// Exchange or local code the classification was derived from
    pub source_code: Option<String>,
    /// Human readable detail
    pub message: String,
}

/// Classify a raw failure by its source code (case-insensitive).
pub fn normalize_error(source_code: Option<&str>, message: impl Into<String>) -> NormalizedError {
    let upper = source_code.map(|code| code.trim().to_ascii_uppercase());
    let (category, retryable) = match upper.as_deref() {
        Some(code) if AUTH_CODES.contains(&code) => (ErrorCategory::Auth, false),
        Some(code) if RATE_LIMIT_CODES.contains(&code) => (ErrorCategory::RateLimit, true),
        Some(code) if VALIDATION_CODES.contains(&code) => (ErrorCategory::Validation, false),
        Some(code) if NETWORK_CODES.contains(&code) => (ErrorCategory::Network, true),
        _ => (ErrorCategory::Exchange, true),
    };

    NormalizedError {
        category,
        retryable,
        source_code: source_code.map(str::to_string),
        message: message.into(),
    }
}

/// Map an HTTP status to the source code fed into [`normalize_error`].
pub fn source_code_for_http_status(status: u16) -> &'static str {
    match status {
        401 | 403 => source_codes::AUTH_FAILED,
        429 => source_codes::RATE_LIMIT,
        400..=499 => source_codes::INVALID_PARAM,
        _ => source_codes::EXCHANGE_ERROR,
    }
}

impl NormalizedError {
    /// Missing or rejected credentials.
    pub fn auth_failed(message: impl Into<String>) -> Self {
        normalize_error(Some(source_codes::AUTH_FAILED), message)
    }

    /// A response that could not be interpreted. Never retried: asking
    /// again returns the same unreadable payload.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Exchange,
            retryable: false,
            source_code: Some(source_codes::INVALID_RESPONSE.to_string()),
            message: message.into(),
        }
    }

    /// Error surfaced after the private retry budget is spent.
    pub fn retry_exhausted() -> Self {
        normalize_error(Some(source_codes::EXCHANGE_ERROR), "private_retry_exhausted")
    }

    /// Classify an HTTP status code.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        normalize_error(Some(source_code_for_http_status(status)), message)
    }

    /// JSON shape embedded in `raw.error` of failed order states.
    pub fn to_json(&self) -> Value {
        json!({
            "category": self.category.as_str(),
            "retryable": self.retryable,
            "source_code": self.source_code,
            "message": self.message,
        })
    }

    /// Read back the shape produced by [`NormalizedError::to_json`].
    pub fn from_json(value: &Value) -> Option<Self> {
        let category = ErrorCategory::parse(value.get("category")?.as_str()?)?;
        Some(Self {
            category,
            retryable: value.get("retryable")?.as_bool()?,
            source_code: value
                .get("source_code")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

// =============================================================================
// Domain Error
// =============================================================================

/// Validation errors for domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Symbol must be non-empty
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Unknown product type, side or order type
    #[error("Invalid order field: {0}")]
    InvalidOrderField(String),

    /// Risk limits must be non-negative
    #[error("Invalid risk limits: {0}")]
    InvalidRiskLimits(String),
}

// =============================================================================
// Tests
// =============================================================================
