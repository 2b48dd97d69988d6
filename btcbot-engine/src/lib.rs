//! btcbot Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes a risk snapshot and account state → returns a verdict and a size.
//!
//! - [`guards`]: six-condition risk guard evaluator
//! - [`sizing`]: two-cap position sizer

#![warn(clippy::all)]

pub mod guards;
pub mod sizing;

pub use guards::{evaluate, RiskCondition};
pub use sizing::{size_order, size_order_detailed, OrderSizing, SizingBinding, SizingParams};
