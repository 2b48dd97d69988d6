//! GMO Coin REST adapter.
//!
//! Public endpoints (`/public/v1/...`) are sent once. Private endpoints
//! (`/private/v1/...`) are signed and run through the
//! [`PrivateRetryPolicy`]. Every response goes through the GMO envelope
//! check (`status != 0` means failure) before it is parsed.
//!
//! # Result shapes
//!
//! - reads (`fetch_klines`, `fetch_positions`) return an [`ErrorAwareList`]
//! - point reads (`fetch_ticker`, `fetch_balances`) return `Result`
//! - order operations return a [`NormalizedOrderState`], with failures
//!   embedded as `status = "error"`

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use btcbot_domain::{
    normalize_error, order_status, source_codes, ApiCredentials, Balance, ErrorAwareList, Kline,
    NormalizedError, NormalizedOrder, NormalizedOrderState, OrderType, Position, ProductType,
    Ticker,
};

use crate::gmo_stream::StreamFactory;
use crate::retry::PrivateRetryPolicy;
use crate::signing::auth_headers;
use crate::transport::{
    HttpMethod, ReqwestTransport, RestRequest, RestTransport, DEFAULT_REQUEST_TIMEOUT_SECS,
};

// =============================================================================
// Constants
// =============================================================================

/// GMO Coin REST base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.coin.z.com";

/// GMO Coin WebSocket URL
pub const DEFAULT_WS_URL: &str = "wss://api.coin.z.com/ws";

const KLINES_PATH: &str = "/public/v1/klines";
const TICKER_PATH: &str = "/public/v1/ticker";
const ASSETS_PATH: &str = "/private/v1/account/assets";
const OPEN_POSITIONS_PATH: &str = "/private/v1/openPositions";
const ORDER_PATH: &str = "/private/v1/order";
const CANCEL_ORDER_PATH: &str = "/private/v1/cancelOrder";
const ORDERS_PATH: &str = "/private/v1/orders";

// Guards against unbounded day-by-day kline fetches.
const MAX_KLINE_DAYS: i64 = 366;

// =============================================================================
// Configuration
// =============================================================================

/// Adapter settings.
#[derive(Debug, Clone)]
pub struct GmoConfig {
    /// Exchange name; also the credential env prefix
    pub exchange: String,
    /// Product type stamped on every result
    pub product_type: ProductType,
    pub api_base_url: String,
    pub ws_url: String,
    /// When false every call fails locally without touching the network
    pub use_http: bool,
    pub retry: PrivateRetryPolicy,
    pub request_timeout: Duration,
}

impl Default for GmoConfig {
    fn default() -> Self {
        Self {
            exchange: "gmo".to_string(),
            product_type: ProductType::Spot,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            use_http: false,
            retry: PrivateRetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Where private calls get their credentials from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// `{EXCHANGE}_API_KEY` / `{EXCHANGE}_API_SECRET`, read at call time
    Env { exchange: String },
    /// Fixed credentials (or a fixed absence), for tests
    Fixed(Option<ApiCredentials>),
}

impl CredentialSource {
    pub fn resolve(&self) -> Option<ApiCredentials> {
        match self {
            CredentialSource::Env { exchange } => ApiCredentials::from_env(exchange),
            CredentialSource::Fixed(credentials) => credentials.clone(),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// GMO Coin protocol adapter.
pub struct GmoAdapter {
    pub(crate) config: GmoConfig,
    pub(crate) credentials: CredentialSource,
    transport: Arc<dyn RestTransport>,
    pub(crate) stream_factory: Option<Arc<dyn StreamFactory>>,
}

impl GmoAdapter {
    /// Adapter over real HTTP with credentials from the environment.
    pub fn new(config: GmoConfig) -> Self {
        let transport = ReqwestTransport::new(config.api_base_url.clone(), config.request_timeout);
        let credentials = CredentialSource::Env {
            exchange: config.exchange.clone(),
        };
        Self {
            config,
            credentials,
            transport: Arc::new(transport),
            stream_factory: None,
        }
    }

    /// Replace the REST transport.
    pub fn with_transport(mut self, transport: Arc<dyn RestTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Use fixed credentials instead of the environment.
    pub fn with_credentials(mut self, credentials: Option<ApiCredentials>) -> Self {
        self.credentials = CredentialSource::Fixed(credentials);
        self
    }

    /// Open streams through `factory` instead of sockets.
    pub fn with_stream_factory(mut self, factory: Arc<dyn StreamFactory>) -> Self {
        self.stream_factory = Some(factory);
        self
    }

    pub fn config(&self) -> &GmoConfig {
        &self.config
    }

    pub fn product_type(&self) -> ProductType {
        self.config.product_type
    }

    fn ensure_http(&self, operation: &str) -> Result<(), NormalizedError> {
        if self.config.use_http {
            Ok(())
        } else {
            Err(NormalizedError::invalid_response(format!(
                "{}_requires_http_mode",
                operation
            )))
        }
    }

    pub(crate) fn require_credentials(&self) -> Result<ApiCredentials, NormalizedError> {
        self.credentials.resolve().ok_or_else(|| {
            NormalizedError::auth_failed(format!(
                "missing {} credentials",
                self.config.exchange
            ))
        })
    }

    // ===== Request plumbing =====

    async fn public_get(
        &self,
        operation: &str,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<Value, NormalizedError> {
        self.ensure_http(operation)?;
        let request = RestRequest {
            method: HttpMethod::Get,
            path: path.to_string(),
            query,
            body: None,
            headers: Vec::new(),
            private: false,
        };
        let payload = self.transport.send(&request).await?;
        unwrap_envelope(payload)
    }

    async fn private_call(
        &self,
        operation: &str,
        method: HttpMethod,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> Result<Value, NormalizedError> {
        self.ensure_http(operation)?;
        let credentials = self.require_credentials()?;
        let body = body.map(|b| b.to_string());

        self.config
            .retry
            .run(operation, |attempt| {
                let request = self.signed_request(&credentials, method, path, &query, body.as_deref());
                async move {
                    let request = request?;
                    debug!(operation, attempt, path = %request.path, "Private call");
                    let payload = self.transport.send(&request).await?;
                    unwrap_envelope(payload)
                }
            })
            .await
    }

    fn signed_request(
        &self,
        credentials: &ApiCredentials,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&str>,
    ) -> Result<RestRequest, NormalizedError> {
        let mut request = RestRequest {
            method,
            path: path.to_string(),
            query: query.to_vec(),
            body: body.map(str::to_string),
            headers: Vec::new(),
            private: true,
        };
        // A fresh timestamp per attempt
        request.headers = auth_headers(
            credentials,
            method.as_str(),
            &request.path_and_query(),
            body.unwrap_or(""),
        )?;
        Ok(request)
    }

    // ===== Public reads =====

    /// Candles for `symbol` between `start` and `end` (inclusive), oldest
    /// first, at most `limit` of the most recent ones.
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> ErrorAwareList<Kline> {
        let result = self.fetch_klines_inner(symbol, interval, start, end, limit).await;
        if let Err(error) = &result {
            warn!(symbol, interval, category = %error.category, "fetch_klines failed");
        }
        result.into()
    }

    async fn fetch_klines_inner(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Kline>, NormalizedError> {
        if end < start {
            return Ok(Vec::new());
        }

        let mut klines = Vec::new();
        for date in kline_date_params(interval, start.date_naive(), end.date_naive()) {
            let query = vec![
                ("symbol".to_string(), symbol.to_string()),
                ("interval".to_string(), interval.to_string()),
                ("date".to_string(), date),
            ];
            let data = self.public_get("fetch_klines", KLINES_PATH, query).await?;
            for item in data_list(&data) {
                let kline = parse_kline(item)
                    .ok_or_else(|| NormalizedError::invalid_response("kline_malformed"))?;
                if kline.timestamp >= start && kline.timestamp <= end {
                    klines.push(kline);
                }
            }
        }

        klines.sort_by_key(|k| k.timestamp);
        klines.dedup_by_key(|k| k.timestamp);
        if klines.len() > limit {
            klines.drain(..klines.len() - limit);
        }
        Ok(klines)
    }

    /// Latest ticker for `symbol`.
    pub async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, NormalizedError> {
        let query = vec![("symbol".to_string(), symbol.to_string())];
        let data = self.public_get("fetch_ticker", TICKER_PATH, query).await?;

        let entries = data_list(&data);
        let entry = entries
            .iter()
            .find(|e| string_field(e, &["symbol"]).as_deref() == Some(symbol))
            .or_else(|| entries.first())
            .ok_or_else(|| NormalizedError::invalid_response("ticker_missing"))?;

        Ok(Ticker {
            symbol: string_field(entry, &["symbol"]).unwrap_or_else(|| symbol.to_string()),
            bid: decimal_field(entry, &["bid"]),
            ask: decimal_field(entry, &["ask"]),
            last: decimal_field(entry, &["last"]),
            timestamp: timestamp_field(entry, &["timestamp"]),
            product_type: self.product_type(),
        })
    }

    // ===== Private reads =====

    /// Asset balances.
    pub async fn fetch_balances(&self, account_type: &str) -> Result<Vec<Balance>, NormalizedError> {
        let data = self
            .private_call("fetch_balances", HttpMethod::Get, ASSETS_PATH, Vec::new(), None)
            .await?;

        data_list(&data)
            .iter()
            .map(|entry| -> Result<Balance, NormalizedError> {
                let asset = string_field(entry, &["symbol", "asset"])
                    .ok_or_else(|| NormalizedError::invalid_response("balance_missing_symbol"))?;
                let total = decimal_field(entry, &["amount", "total"]).unwrap_or_default();
                Ok(Balance {
                    asset,
                    total,
                    available: decimal_field(entry, &["available"]).unwrap_or(total),
                    account_type: account_type.to_string(),
                    product_type: self.product_type(),
                })
            })
            .collect()
    }

    /// Open positions for `symbol`.
    pub async fn fetch_positions(&self, symbol: &str) -> ErrorAwareList<Position> {
        let query = vec![("symbol".to_string(), symbol.to_string())];
        let result = self
            .private_call("fetch_positions", HttpMethod::Get, OPEN_POSITIONS_PATH, query, None)
            .await
            .map(|data| {
                data_list(&data)
                    .iter()
                    .filter_map(|entry| self.parse_position(entry))
                    .collect::<Vec<_>>()
            });
        if let Err(error) = &result {
            warn!(symbol, category = %error.category, "fetch_positions failed");
        }
        result.into()
    }

    fn parse_position(&self, entry: &Value) -> Option<Position> {
        Some(Position {
            symbol: string_field(entry, &["symbol"])?,
            side: string_field(entry, &["side"])?.to_ascii_lowercase(),
            qty: decimal_field(entry, &["size", "qty"])?,
            entry_price: decimal_field(entry, &["price", "entry_price"]),
            leverage: decimal_field(entry, &["leverage"]),
            unrealized_pnl: decimal_field(entry, &["lossGain", "unrealized_pnl"]),
            product_type: self.product_type(),
        })
    }

    // ===== Orders =====

    /// Submit an order.
    pub async fn place_order(&self, order: &NormalizedOrder) -> NormalizedOrderState {
        let product_type = order.product_type();
        let body = order_body(order);

        match self
            .private_call("place_order", HttpMethod::Post, ORDER_PATH, Vec::new(), Some(body))
            .await
        {
            Ok(data) => {
                let (order_id, status) = match &data {
                    Value::Object(_) => (
                        string_field(&data, &["orderId", "order_id"]).unwrap_or_default(),
                        string_field(&data, &["status", "orderStatus"])
                            .map(|s| normalize_order_status(&s))
                            .unwrap_or_else(|| order_status::ACCEPTED.to_string()),
                    ),
                    other => (
                        scalar_string(other).unwrap_or_default(),
                        order_status::ACCEPTED.to_string(),
                    ),
                };
                info!(
                    order_id = %order_id,
                    status = %status,
                    client_order_id = %order.client_order_id,
                    "Order placed"
                );
                NormalizedOrderState {
                    order_id,
                    status,
                    symbol: Some(order.symbol.as_str().to_string()),
                    side: Some(order.side.as_str().to_string()),
                    order_type: Some(order.order_type.as_str().to_string()),
                    qty: Some(order.qty.as_decimal()),
                    price: order.price.map(|p| p.as_decimal()),
                    product_type,
                    reduce_only: order.reduce_only(),
                    raw: json!({
                        "response": data,
                        "client_order_id": order.client_order_id.as_str(),
                    }),
                }
            }
            Err(error) => {
                warn!(
                    client_order_id = %order.client_order_id,
                    category = %error.category,
                    "Order placement failed"
                );
                NormalizedOrderState::from_error("", product_type, &error)
            }
        }
    }

    /// Cancel an order.
    pub async fn cancel_order(&self, order_id: &str) -> NormalizedOrderState {
        let product_type = self.product_type();
        let body = json!({ "orderId": id_value(order_id) });

        match self
            .private_call("cancel_order", HttpMethod::Post, CANCEL_ORDER_PATH, Vec::new(), Some(body))
            .await
        {
            Ok(data) => {
                let status = string_field(&data, &["status", "orderStatus"])
                    .map(|s| normalize_order_status(&s))
                    .unwrap_or_else(|| order_status::CANCELLED.to_string());
                NormalizedOrderState {
                    raw: json!({ "response": data }),
                    ..NormalizedOrderState::bare(order_id, status, product_type)
                }
            }
            Err(error) => NormalizedOrderState::from_error(order_id, product_type, &error),
        }
    }

    /// Re-read an order.
    pub async fn fetch_order(&self, order_id: &str) -> NormalizedOrderState {
        let product_type = self.product_type();
        let query = vec![("orderId".to_string(), order_id.to_string())];

        let result = self
            .private_call("fetch_order", HttpMethod::Get, ORDERS_PATH, query, None)
            .await
            .and_then(|data| self.parse_fetched_order(order_id, data));

        match result {
            Ok(state) => state,
            Err(error) => NormalizedOrderState::from_error(order_id, product_type, &error),
        }
    }

    fn parse_fetched_order(
        &self,
        order_id: &str,
        data: Value,
    ) -> Result<NormalizedOrderState, NormalizedError> {
        let entry = data_list(&data)
            .into_iter()
            .find(|e| string_field(e, &["orderId", "order_id"]).as_deref() == Some(order_id))
            .or_else(|| data.is_object().then_some(&data))
            .cloned()
            .unwrap_or(Value::Null);

        let status = string_field(&entry, &["status", "orderStatus"])
            .ok_or_else(|| NormalizedError::invalid_response("fetch_order_status_unknown"))?;

        Ok(NormalizedOrderState {
            order_id: string_field(&entry, &["orderId", "order_id"])
                .unwrap_or_else(|| order_id.to_string()),
            status: normalize_order_status(&status),
            symbol: string_field(&entry, &["symbol"]),
            side: string_field(&entry, &["side"]).map(|s| s.to_ascii_lowercase()),
            order_type: string_field(&entry, &["executionType", "order_type"])
                .map(|s| s.to_ascii_lowercase()),
            qty: decimal_field(&entry, &["size", "qty"]),
            price: decimal_field(&entry, &["price"]),
            product_type: self.product_type(),
            reduce_only: None,
            raw: entry,
        })
    }
}

// =============================================================================
// Envelope and status mapping
// =============================================================================

/// Map a GMO `message_code` onto the shared source codes. Unknown codes pass
/// through unchanged (and classify as `exchange`).
pub fn map_gmo_code(code: &str) -> &str {
    match code {
        "ERR-5003" => source_codes::RATE_LIMIT,
        "ERR-5008" | "ERR-5009" | "ERR-5010" | "ERR-5011" | "ERR-5012" | "ERR-5014" => {
            source_codes::AUTH_FAILED
        }
        "ERR-5106" | "ERR-5114" | "ERR-5122" | "ERR-5123" | "ERR-5126" => {
            source_codes::INVALID_PARAM
        }
        "ERR-201" | "ERR-208" => "INSUFFICIENT_MARGIN",
        other => other,
    }
}

/// Strip the `{status, data, messages}` envelope.
///
/// Payloads without a numeric `status` field are taken as-is.
pub fn unwrap_envelope(payload: Value) -> Result<Value, NormalizedError> {
    let status = payload.get("status").and_then(Value::as_i64);
    if let Some(status) = status.filter(|s| *s != 0) {
        let first = payload
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|m| m.first());
        let code = first
            .and_then(|m| m.get("message_code"))
            .and_then(Value::as_str)
            .map(map_gmo_code)
            .unwrap_or(source_codes::EXCHANGE_ERROR);
        let message = first
            .and_then(|m| m.get("message_string"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("GMO API status {}", status));
        return Err(normalize_error(Some(code), message));
    }

    Ok(match payload {
        Value::Object(mut map) if status.is_some() => map.remove("data").unwrap_or(Value::Null),
        other => other,
    })
}

/// GMO order status to lifecycle word.
pub fn normalize_order_status(raw: &str) -> String {
    match raw.trim().to_ascii_uppercase().as_str() {
        "WAITING" => order_status::ACCEPTED.to_string(),
        "ORDERED" | "MODIFYING" | "CANCELLING" => order_status::ACTIVE.to_string(),
        "CANCELED" | "CANCELLED" => order_status::CANCELLED.to_string(),
        "EXECUTED" => order_status::FILLED.to_string(),
        "EXPIRED" => order_status::EXPIRED.to_string(),
        _ => raw.trim().to_ascii_lowercase(),
    }
}

/// JSON body for `POST /private/v1/order`.
pub fn order_body(order: &NormalizedOrder) -> Value {
    let mut body = Map::new();
    body.insert("symbol".into(), json!(order.symbol.as_str()));
    body.insert("side".into(), json!(order.side.to_string()));
    body.insert(
        "executionType".into(),
        json!(match order.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }),
    );
    body.insert("size".into(), json!(order.qty.as_decimal().normalize().to_string()));
    if let Some(price) = order.price {
        body.insert("price".into(), json!(price.as_decimal().normalize().to_string()));
    }
    if let Some(tif) = &order.time_in_force {
        body.insert("timeInForce".into(), json!(tif));
    }
    // Spot orders never carry reduceOnly
    if let Some(reduce_only) = order.reduce_only() {
        body.insert("reduceOnly".into(), json!(reduce_only));
    }
    Value::Object(body)
}

fn id_value(order_id: &str) -> Value {
    order_id
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(order_id))
}

/// `date` query values covering `[start, end]`. Intraday intervals are
/// served per day (`YYYYMMDD`), longer ones per year (`YYYY`).
fn kline_date_params(interval: &str, start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let intraday = matches!(interval, "1min" | "5min" | "10min" | "15min" | "30min" | "1hour");
    let mut dates = Vec::new();
    let mut day = start;
    let mut steps = 0;
    while day <= end && steps < MAX_KLINE_DAYS {
        let param = if intraday {
            day.format("%Y%m%d").to_string()
        } else {
            day.format("%Y").to_string()
        };
        if dates.last() != Some(&param) {
            dates.push(param);
        }
        day += ChronoDuration::days(1);
        steps += 1;
    }
    dates
}

fn parse_kline(entry: &Value) -> Option<Kline> {
    Some(Kline {
        timestamp: timestamp_field(entry, &["openTime", "timestamp"])?,
        open: decimal_field(entry, &["open"])?,
        high: decimal_field(entry, &["high"])?,
        low: decimal_field(entry, &["low"])?,
        close: decimal_field(entry, &["close"])?,
        volume: decimal_field(entry, &["volume"]).unwrap_or_default(),
    })
}

// =============================================================================
// Field helpers (shared with the stream parser)
// =============================================================================

/// Entries of `data`: the array itself, or `data.list`.
pub(crate) fn data_list(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map
            .get("list")
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First present key, as a string (numbers are stringified).
pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| value.get(*k).and_then(scalar_string))
}

/// First present key, as a decimal (string or number).
pub(crate) fn decimal_field(value: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|k| {
        value
            .get(*k)
            .and_then(scalar_string)
            .and_then(|s| Decimal::from_str(&s).or_else(|_| Decimal::from_scientific(&s)).ok())
    })
}

/// First present key, as a timestamp (RFC 3339 or millisecond epoch).
pub(crate) fn timestamp_field(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|k| {
        let raw = value.get(*k).and_then(scalar_string)?;
        if let Ok(ms) = raw.parse::<i64>() {
            return Utc.timestamp_millis_opt(ms).single();
        }
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

// =============================================================================
// Tests
// =============================================================================
