//! btcbot Execution Layer
//!
//! Idempotent order execution against a single exchange.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator → Order Journal → ExchangePort::place_order → Lifecycle Tracker
//!                                                             ├─ fetch_order
//!                                                             └─ cancel_order
//! ```
//!
//! # Components
//!
//! - **Ports**: the minimal exchange interface the runtime depends on
//! - **Lifecycle**: post-placement fetch/cancel sequencing
//! - **Journal**: at-most-once submission per client order id
//! - **Stub**: scripted exchange for tests and dry runs
//!
//! # Example
//!
//! ```rust,ignore
//! use btcbot_exec::{LifecycleTracker, StubExchange};
//!
//! let exchange = StubExchange::new(ProductType::Spot, dec!(100000));
//! let placed = exchange.place_order(&order).await;
//! let lifecycle = LifecycleTracker::new(true).track(&exchange, placed).await;
//! assert_eq!(lifecycle.transitions, vec!["accepted", "active", "cancelled"]);
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod journal;
pub mod lifecycle;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use journal::{OrderAttempt, OrderJournal};
pub use lifecycle::{LifecycleStep, LifecycleTracker, OrderLifecycle};
pub use ports::{EventStream, ExchangePort};
pub use stub::{StubExchange, StubOutcome, StubStream};
