//! btcbot Exchange Connectors
//!
//! GMO Coin protocol adapter (REST + private WebSocket).
//! Normalizes exchange-specific payloads and failures to domain types.
//!
//! # Modules
//!
//! - **signing**: HMAC-SHA256 request and subscription signatures
//! - **transport**: REST transport seam (`reqwest` in production)
//! - **retry**: category-aware retry for private calls
//! - **ws**: WebSocket client over raw TCP/TLS sockets
//! - **gmo_rest** / **gmo_stream**: the adapter itself

#![warn(clippy::all)]

// Public modules
pub mod gmo_rest;
pub mod gmo_stream;
pub mod retry;
pub mod signing;
pub mod transport;
pub mod ws;

// Re-exports
pub use gmo_rest::{
    map_gmo_code, normalize_order_status, order_body, unwrap_envelope, CredentialSource,
    GmoAdapter, GmoConfig, DEFAULT_API_BASE_URL, DEFAULT_WS_URL,
};
pub use gmo_stream::{
    parse_account_event, parse_order_event, subscribe_message, supervise, RawStream,
    SocketStreamFactory, StreamFactory, ACCOUNT_EVENTS_CHANNEL, ORDER_EVENTS_CHANNEL,
};
pub use retry::PrivateRetryPolicy;
pub use transport::{HttpMethod, ReqwestTransport, RestRequest, RestTransport};
pub use ws::{WsConnection, WsError};
