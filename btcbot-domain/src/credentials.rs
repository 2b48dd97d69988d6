//! Exchange API credentials.
//!
//! # Security Model
//!
//! - Read from `{EXCHANGE}_API_KEY` / `{EXCHANGE}_API_SECRET` at call time
//! - Never serialized, never logged (`Debug` is redacted)
//! - Secret is zeroized when dropped

use std::fmt;
use zeroize::Zeroize;

// =============================================================================
// Environment names
// =============================================================================

/// Environment variable holding the API key for `exchange` (`gmo` -> `GMO_API_KEY`).
pub fn api_key_env(exchange: &str) -> String {
    format!("{}_API_KEY", env_prefix(exchange))
}

/// Environment variable holding the API secret for `exchange`.
pub fn api_secret_env(exchange: &str) -> String {
    format!("{}_API_SECRET", env_prefix(exchange))
}

fn env_prefix(exchange: &str) -> String {
    exchange
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

// =============================================================================
// API Credentials
// =============================================================================

/// Decrypted API credentials (in-memory only, never persisted).
pub struct ApiCredentials {
    /// API Key (public identifier)
    pub api_key: String,
    /// API Secret (secret key)
    pub api_secret: zeroize::Zeroizing<String>,
}

impl ApiCredentials {
    /// Create new API credentials.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: zeroize::Zeroizing::new(api_secret.into()),
        }
    }

    /// Load from the process environment. `None` if either value is missing
    /// or blank.
    pub fn from_env(exchange: &str) -> Option<Self> {
        Self::from_lookup(exchange, |name| std::env::var(name).ok())
    }

    /// Load through an arbitrary lookup (tests inject a map here).
    pub fn from_lookup<F>(exchange: &str, lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = lookup(&api_key_env(exchange)).filter(|v| !v.trim().is_empty())?;
        let secret = lookup(&api_secret_env(exchange)).filter(|v| !v.trim().is_empty())?;
        Some(Self::new(key, secret))
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

impl Clone for ApiCredentials {
    fn clone(&self) -> Self {
        Self::new(self.api_key.clone(), self.api_secret.as_str())
    }
}

impl zeroize::Zeroize for ApiCredentials {
    fn zeroize(&mut self) {
        self.api_key.zeroize();
        self.api_secret.zeroize();
    }
}

impl Drop for ApiCredentials {
    fn drop(&mut self) {
        self.zeroize();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(map: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |name| map.get(name).map(|v| v.to_string())
    }

    #[test]
    fn test_env_names() {
        assert_eq!(api_key_env("gmo"), "GMO_API_KEY");
        assert_eq!(api_secret_env("gmo"), "GMO_API_SECRET");
        assert_eq!(api_key_env("gmo-coin"), "GMO_COIN_API_KEY");
    }

    #[test]
    fn test_from_lookup_requires_both() {
        let both = lookup(HashMap::from([("GMO_API_KEY", "k"), ("GMO_API_SECRET", "s")]));
        let creds = ApiCredentials::from_lookup("gmo", both).unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.api_secret.as_str(), "s");

        let key_only = lookup(HashMap::from([("GMO_API_KEY", "k")]));
        assert!(ApiCredentials::from_lookup("gmo", key_only).is_none());

        let blank = lookup(HashMap::from([("GMO_API_KEY", "k"), ("GMO_API_SECRET", " ")]));
        assert!(ApiCredentials::from_lookup("gmo", blank).is_none());
    }

    #[test]
    fn test_debug_is_redacted() {
        let creds = ApiCredentials::new("my-key", "my-secret");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("my-key"));
        assert!(!debug.contains("my-secret"));
    }

    #[test]
    fn test_api_credentials_zeroize() {
        let mut creds = ApiCredentials::new("key", "secret");
        creds.zeroize();
        assert!(creds.api_key.is_empty());
        assert!(creds.api_secret.is_empty());
    }
}
