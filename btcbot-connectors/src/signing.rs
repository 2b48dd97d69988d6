//! Request signing.
//!
//! GMO private endpoints authenticate with three headers:
//! - `API-KEY`
//! - `API-TIMESTAMP` (millisecond epoch)
//! - `API-SIGN` = hex(HMAC-SHA256(secret, timestamp + method + path[?query] + body))
//!
//! The private WebSocket subscribe message carries the same kind of
//! signature over `timestamp + "GET" + "/ws"`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use btcbot_domain::{ApiCredentials, NormalizedError};

type HmacSha256 = Hmac<Sha256>;

/// Path signed for WebSocket subscriptions.
pub const WS_SIGN_PATH: &str = "/ws";

/// Current millisecond epoch as a string.
pub fn timestamp_millis() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Hex HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String, NormalizedError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| NormalizedError::auth_failed(format!("HMAC error: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature for a private REST call. `path_and_query` includes `?query`
/// when there is one.
pub fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    path_and_query: &str,
    body: &str,
) -> Result<String, NormalizedError> {
    hmac_sha256_hex(secret, &format!("{}{}{}{}", timestamp, method, path_and_query, body))
}

/// Signature for a WebSocket subscription.
pub fn sign_ws_subscription(secret: &str, timestamp: &str) -> Result<String, NormalizedError> {
    sign_request(secret, timestamp, "GET", WS_SIGN_PATH, "")
}

/// Auth headers for a private REST call, in send order.
pub fn auth_headers(
    credentials: &ApiCredentials,
    method: &str,
    path_and_query: &str,
    body: &str,
) -> Result<Vec<(String, String)>, NormalizedError> {
    let timestamp = timestamp_millis();
    let signature = sign_request(&credentials.api_secret, &timestamp, method, path_and_query, body)?;
    Ok(vec![
        ("API-KEY".to_string(), credentials.api_key.clone()),
        ("API-TIMESTAMP".to_string(), timestamp),
        ("API-SIGN".to_string(), signature),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_hex_sha256() {
        let sig = sign_request("secret", "1700000000000", "POST", "/private/v1/order", "{}").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_known_vector() {
        // RFC 4231 test case 2
        let sig = hmac_sha256_hex("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn test_signature_covers_every_part() {
        let base = sign_request("s", "1", "GET", "/a?x=1", "").unwrap();
        assert_ne!(base, sign_request("s", "2", "GET", "/a?x=1", "").unwrap());
        assert_ne!(base, sign_request("s", "1", "POST", "/a?x=1", "").unwrap());
        assert_ne!(base, sign_request("s", "1", "GET", "/a?x=2", "").unwrap());
        assert_ne!(base, sign_request("s", "1", "GET", "/a?x=1", "{}").unwrap());
        assert_ne!(base, sign_request("t", "1", "GET", "/a?x=1", "").unwrap());
    }

    #[test]
    fn test_ws_signature_matches_get_ws() {
        assert_eq!(
            sign_ws_subscription("secret", "123").unwrap(),
            sign_request("secret", "123", "GET", "/ws", "").unwrap()
        );
    }

    #[test]
    fn test_auth_headers() {
        let creds = ApiCredentials::new("key", "secret");
        let headers = auth_headers(&creds, "GET", "/private/v1/account/assets", "").unwrap();

        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["API-KEY", "API-TIMESTAMP", "API-SIGN"]);
        assert_eq!(headers[0].1, "key");
        assert_eq!(headers[2].1.len(), 64);
    }
}
