//! Execution layer port definitions.
//!
//! The runtime talks to an exchange only through [`ExchangePort`]. The GMO
//! adapter implements it for production; [`crate::StubExchange`] implements it
//! for tests and dry runs.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use btcbot_domain::{
    AccountEvent, Balance, NormalizedError, NormalizedOrder, NormalizedOrderState, OrderEvent,
};

/// Stream of normalized events; failures arrive in-band as `Err` items.
pub type EventStream<T> = BoxStream<'static, Result<T, NormalizedError>>;

// =============================================================================
// Exchange Port
// =============================================================================

/// Port for the exchange operations the live runtime needs.
///
/// Order operations never fail at the type level: a failure comes back as a
/// state with `status = "error"` and the detail in `raw.error`, so the
/// lifecycle tracker always has an order-shaped value to continue with.
///
/// Implementations:
/// - `StubExchange` - scripted responses for tests
/// - `GmoAdapter` - GMO Coin REST + private WebSocket
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Submit an order.
    async fn place_order(&self, order: &NormalizedOrder) -> NormalizedOrderState;

    /// Re-read an order by exchange id.
    async fn fetch_order(&self, order_id: &str) -> NormalizedOrderState;

    /// Cancel an order by exchange id.
    async fn cancel_order(&self, order_id: &str) -> NormalizedOrderState;

    /// Balances for an account type (e.g. `spot`, `margin`).
    async fn fetch_balances(&self, account_type: &str) -> Result<Vec<Balance>, NormalizedError>;

    /// Private order-update stream.
    fn stream_order_events(&self) -> EventStream<OrderEvent>;

    /// Private account-update stream.
    fn stream_account_events(&self) -> EventStream<AccountEvent>;
}
