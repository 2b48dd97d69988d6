//! Private event streams for the GMO adapter.
//!
//! Each stream subscribes to one channel and yields normalized events.
//! Failures arrive in-band as `Err` items:
//!
//! - network failure (timeout, reset, TLS): one `network` error, then one
//!   reconnect. A second failure before any event arrives ends the stream.
//! - anything else (refused upgrade, bad frame, rejected subscription): one
//!   `exchange` error, then the stream ends.
//!
//! Retrying beyond that is the daemon's job.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use btcbot_domain::{
    AccountEvent, ApiCredentials, Balance, NormalizedError, NormalizedOrder, NormalizedOrderState,
    OrderEvent, ProductType,
};
use btcbot_exec::{EventStream, ExchangePort};

use crate::gmo_rest::{
    decimal_field, normalize_order_status, string_field, timestamp_field, GmoAdapter,
};
use crate::signing::{sign_ws_subscription, timestamp_millis};
use crate::ws::{WsConnection, WsError};

/// Order updates channel.
pub const ORDER_EVENTS_CHANNEL: &str = "orderEvents";

/// Account updates channel.
pub const ACCOUNT_EVENTS_CHANNEL: &str = "positionSummaryEvents";

/// Raw JSON messages of one subscription.
pub type RawStream = BoxStream<'static, Result<Value, WsError>>;

// =============================================================================
// Stream factories
// =============================================================================

/// Opens one subscription per call. Reconnecting means calling `open` again.
pub trait StreamFactory: Send + Sync {
    fn open(&self, channel: &str) -> RawStream;
}

/// Factory over real sockets: dial, upgrade, subscribe, read.
pub struct SocketStreamFactory {
    ws_url: String,
    request_timeout: Duration,
    credentials: ApiCredentials,
}

impl SocketStreamFactory {
    pub fn new(ws_url: impl Into<String>, request_timeout: Duration, credentials: ApiCredentials) -> Self {
        Self {
            ws_url: ws_url.into(),
            request_timeout,
            credentials,
        }
    }
}

impl StreamFactory for SocketStreamFactory {
    fn open(&self, channel: &str) -> RawStream {
        let ws_url = self.ws_url.clone();
        let deadline = self.request_timeout;
        let credentials = self.credentials.clone();
        let channel = channel.to_string();

        Box::pin(async_stream::stream! {
            let mut connection = match WsConnection::connect(&ws_url, deadline).await {
                Ok(connection) => connection,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let subscribe = match subscribe_message(&channel, Some(&credentials)) {
                Ok(message) => message,
                Err(e) => {
                    yield Err(WsError::Rejected(e.message));
                    return;
                }
            };
            if let Err(e) = connection.send_text(&subscribe.to_string()).await {
                yield Err(e);
                return;
            }
            debug!(channel = %channel, "Subscribed");

            loop {
                let text = match connection.next_text().await {
                    Ok(text) => text,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let message: Value = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(_) => {
                        debug!(channel = %channel, "Skipping non-JSON message");
                        continue;
                    }
                };
                if let Some(error) = message.get("error").and_then(Value::as_str) {
                    yield Err(WsError::Rejected(error.to_string()));
                    return;
                }
                yield Ok(message);
            }
        })
    }
}

/// Subscribe command for `channel`. Authenticated channels carry
/// `apiKey`, `timestamp` and a signature over `timestamp + "GET/ws"`.
pub fn subscribe_message(
    channel: &str,
    credentials: Option<&ApiCredentials>,
) -> Result<Value, NormalizedError> {
    let mut message = json!({ "command": "subscribe", "channel": channel });
    if let Some(credentials) = credentials {
        let timestamp = timestamp_millis();
        let signature = sign_ws_subscription(&credentials.api_secret, &timestamp)?;
        message["apiKey"] = json!(credentials.api_key);
        message["timestamp"] = json!(timestamp);
        message["signature"] = json!(signature);
    }
    Ok(message)
}

// =============================================================================
// Supervision
// =============================================================================

/// Drive `factory` for `channel`, parsing messages with `parse` and applying
/// the reconnect policy described in the module docs.
pub fn supervise<T, P>(factory: Arc<dyn StreamFactory>, channel: &str, parse: P) -> EventStream<T>
where
    T: Send + 'static,
    P: Fn(&Value) -> Option<T> + Send + 'static,
{
    let channel = channel.to_string();
    Box::pin(async_stream::stream! {
        let mut reconnect_available = true;
        loop {
            let mut raw = factory.open(&channel);
            let mut failure = None;

            while let Some(item) = raw.next().await {
                match item {
                    Ok(message) => {
                        if let Some(event) = parse(&message) {
                            // Healthy again; the next failure gets a reconnect
                            reconnect_available = true;
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            let Some(error) = failure else {
                debug!(channel = %channel, "Stream ended");
                break;
            };

            yield Err(error.normalize());
            if !error.is_network() || !reconnect_available {
                warn!(channel = %channel, error = %error, "Stream terminated");
                break;
            }
            reconnect_available = false;
            warn!(channel = %channel, error = %error, "Stream failed, reconnecting once");
        }
    })
}

fn single_error<T: Send + 'static>(error: NormalizedError) -> EventStream<T> {
    futures_util::stream::iter(vec![Err(error)]).boxed()
}

// =============================================================================
// Event parsing
// =============================================================================

/// Order event from either GMO keys or normalized keys. Subscription acks
/// and other non-order messages give `None`.
pub fn parse_order_event(message: &Value, product_type: ProductType) -> Option<OrderEvent> {
    let order_id = string_field(message, &["orderId", "order_id"])?;
    let status = string_field(message, &["orderStatus", "status"])?;
    Some(OrderEvent {
        order_id,
        status: normalize_order_status(&status),
        symbol: string_field(message, &["symbol"]),
        side: string_field(message, &["side"]).map(|s| s.to_ascii_lowercase()),
        qty: decimal_field(message, &["size", "orderSize", "qty"]),
        product_type,
        timestamp: timestamp_field(message, &["orderTimestamp", "timestamp"]),
    })
}

/// Account event; needs an event kind (`msgType` or `event_type`).
pub fn parse_account_event(message: &Value, product_type: ProductType) -> Option<AccountEvent> {
    let event_type = string_field(message, &["msgType", "event_type"])?;
    Some(AccountEvent {
        event_type: event_type.to_ascii_lowercase(),
        asset: string_field(message, &["symbol", "asset"]),
        balance: decimal_field(message, &["sumPositionQuantity", "balance"]),
        available: decimal_field(message, &["available"]),
        product_type,
        timestamp: timestamp_field(message, &["timestamp"]),
    })
}

// =============================================================================
// Adapter streams
// =============================================================================

impl GmoAdapter {
    fn open_stream<T, P>(&self, channel: &str, parse: P) -> EventStream<T>
    where
        T: Send + 'static,
        P: Fn(&Value) -> Option<T> + Send + 'static,
    {
        if let Some(factory) = &self.stream_factory {
            return supervise(factory.clone(), channel, parse);
        }
        if !self.config.use_http {
            return futures_util::stream::empty().boxed();
        }
        // No socket is opened without credentials
        let credentials = match self.require_credentials() {
            Ok(credentials) => credentials,
            Err(error) => {
                warn!(channel, "Stream needs credentials");
                return single_error(error);
            }
        };
        let factory = SocketStreamFactory::new(
            self.config.ws_url.clone(),
            self.config.request_timeout,
            credentials,
        );
        supervise(Arc::new(factory), channel, parse)
    }

    /// Order updates.
    pub fn stream_order_events(&self) -> EventStream<OrderEvent> {
        let product_type = self.product_type();
        self.open_stream(ORDER_EVENTS_CHANNEL, move |m| parse_order_event(m, product_type))
    }

    /// Account updates.
    pub fn stream_account_events(&self) -> EventStream<AccountEvent> {
        let product_type = self.product_type();
        self.open_stream(ACCOUNT_EVENTS_CHANNEL, move |m| parse_account_event(m, product_type))
    }
}

#[async_trait]
impl ExchangePort for GmoAdapter {
    async fn place_order(&self, order: &NormalizedOrder) -> NormalizedOrderState {
        GmoAdapter::place_order(self, order).await
    }

    async fn fetch_order(&self, order_id: &str) -> NormalizedOrderState {
        GmoAdapter::fetch_order(self, order_id).await
    }

    async fn cancel_order(&self, order_id: &str) -> NormalizedOrderState {
        GmoAdapter::cancel_order(self, order_id).await
    }

    async fn fetch_balances(&self, account_type: &str) -> Result<Vec<Balance>, NormalizedError> {
        GmoAdapter::fetch_balances(self, account_type).await
    }

    fn stream_order_events(&self) -> EventStream<OrderEvent> {
        GmoAdapter::stream_order_events(self)
    }

    fn stream_account_events(&self) -> EventStream<AccountEvent> {
        GmoAdapter::stream_account_events(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
