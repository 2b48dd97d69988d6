//! REST transport.
//!
//! The adapter builds fully signed [`RestRequest`]s and hands them to a
//! [`RestTransport`]. Production uses [`ReqwestTransport`]; tests plug in a
//! recording fake. Every transport failure comes back already classified.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use btcbot_domain::{normalize_error, source_codes, NormalizedError};

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Request
// =============================================================================

/// HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request ready to send; `body` is the exact text that was signed.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Whether the request carries auth headers
    pub private: bool,
}

impl RestRequest {
    /// `path?query` with the query in insertion order.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }

    /// Parsed JSON body, if any.
    pub fn body_json(&self) -> Option<Value> {
        self.body.as_deref().and_then(|b| serde_json::from_str(b).ok())
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Sends a request and returns the decoded JSON payload.
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn send(&self, request: &RestRequest) -> Result<Value, NormalizedError>;
}

/// reqwest-backed transport with a per-request timeout.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }
}

#[async_trait]
impl RestTransport for ReqwestTransport {
    async fn send(&self, request: &RestRequest) -> Result<Value, NormalizedError> {
        let url = format!("{}{}", self.base_url, request.path_and_query());
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body.clone());
        }

        debug!(method = %request.method, path = %request.path, "Sending request");

        let response = timeout(self.request_timeout, builder.send())
            .await
            .map_err(|_| normalize_error(Some(source_codes::NETWORK_TIMEOUT), "request timed out"))?
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(NormalizedError::from_http_status(
                status.as_u16(),
                format!("HTTP {}: {}", status.as_u16(), snippet),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| NormalizedError::invalid_response(format!("invalid JSON: {}", e)))
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> NormalizedError {
    let code = if error.is_timeout() {
        source_codes::NETWORK_TIMEOUT
    } else if error.is_connect() || error.is_request() || error.is_body() {
        source_codes::CONNECTION_ERROR
    } else {
        source_codes::EXCHANGE_ERROR
    };
    normalize_error(Some(code), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: Vec<(&str, &str)>) -> RestRequest {
        RestRequest {
            method: HttpMethod::Get,
            path: "/public/v1/ticker".to_string(),
            query: query.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: None,
            headers: Vec::new(),
            private: false,
        }
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(request(vec![]).path_and_query(), "/public/v1/ticker");
        assert_eq!(
            request(vec![("symbol", "BTC_JPY"), ("a", "1")]).path_and_query(),
            "/public/v1/ticker?symbol=BTC_JPY&a=1"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 on localhost is closed in CI containers
        let transport = ReqwestTransport::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = transport.send(&request(vec![])).await.unwrap_err();
        assert_eq!(err.category, btcbot_domain::ErrorCategory::Network);
        assert!(err.retryable);
    }
}
