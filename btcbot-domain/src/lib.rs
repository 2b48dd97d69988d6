//! btcbot Domain Layer
//!
//! Pure domain types with zero I/O dependencies: the exchange error taxonomy,
//! order and read models, risk limits and verdicts, strategy decisions and
//! the runtime's reason codes.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod credentials;
pub mod decision;
pub mod error;
pub mod market_data;
pub mod orders;
pub mod reason_codes;
pub mod risk;
pub mod value_objects;

// Re-export commonly used types
pub use credentials::{api_key_env, api_secret_env, ApiCredentials};
pub use decision::{Decision, DecisionAction};
pub use error::{
    normalize_error, source_code_for_http_status, source_codes, DomainError, ErrorCategory,
    NormalizedError,
};
pub use market_data::{AccountEvent, Balance, ErrorAwareList, Kline, OrderEvent, Position, Ticker};
pub use orders::{order_status, NormalizedOrder, NormalizedOrderState, OrderProduct};
pub use risk::{GuardResult, GuardStatus, RiskLimits, RiskSnapshot};
pub use value_objects::{
    ClientOrderId, MonitorStatus, OrderSide, OrderType, Price, ProductType, Quantity, Symbol,
};
