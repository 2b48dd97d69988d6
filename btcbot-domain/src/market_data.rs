//! Read models
//!
//! Exchange-agnostic views of candles, tickers, balances, positions and
//! stream events. Every model records the product type it was read for.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::error::NormalizedError;
use crate::value_objects::ProductType;

// =============================================================================
// ErrorAwareList
// =============================================================================

/// A list result that never fails at the type level.
///
/// On failure the list is empty and `error` is set, so callers that only want
/// "whatever data there is" can ignore the error entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAwareList<T> {
    items: Vec<T>,
    /// Why the list is empty, if it is empty because of a failure
    pub error: Option<NormalizedError>,
}

impl<T> ErrorAwareList<T> {
    /// Successful result.
    pub fn ok(items: Vec<T>) -> Self {
        Self { items, error: None }
    }

    /// Failed result: empty list plus the error.
    pub fn failed(error: NormalizedError) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error),
        }
    }

    /// Whether the read succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Take the items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for ErrorAwareList<T> {
    fn default() -> Self {
        Self::ok(Vec::new())
    }
}

impl<T> Deref for ErrorAwareList<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> IntoIterator for ErrorAwareList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> From<Result<Vec<T>, NormalizedError>> for ErrorAwareList<T> {
    fn from(result: Result<Vec<T>, NormalizedError>) -> Self {
        match result {
            Ok(items) => Self::ok(items),
            Err(error) => Self::failed(error),
        }
    }
}

// =============================================================================
// Kline
// =============================================================================

/// One OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// Open time
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Traded volume
    pub volume: Decimal,
}

// =============================================================================
// Ticker / Balance / Position
// =============================================================================

/// Best bid/ask and last trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Symbol
    pub symbol: String,
    /// Best bid
    pub bid: Option<Decimal>,
    /// Best ask
    pub ask: Option<Decimal>,
    /// Last trade price
    pub last: Option<Decimal>,
    /// Exchange timestamp
    pub timestamp: Option<DateTime<Utc>>,
    /// Product type
    pub product_type: ProductType,
}

/// Holding of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Asset symbol (e.g. `JPY`)
    pub asset: String,
    /// Total amount
    pub total: Decimal,
    /// Amount available for new orders
    pub available: Decimal,
    /// Account the balance belongs to
    pub account_type: String,
    /// Product type
    pub product_type: ProductType,
}

/// Open leveraged position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Symbol
    pub symbol: String,
    /// Side (`buy`/`sell`)
    pub side: String,
    /// Size
    pub qty: Decimal,
    /// Average entry price
    pub entry_price: Option<Decimal>,
    /// Leverage multiplier
    pub leverage: Option<Decimal>,
    /// Unrealized profit and loss
    pub unrealized_pnl: Option<Decimal>,
    /// Product type
    pub product_type: ProductType,
}

// =============================================================================
// Stream events
// =============================================================================

/// Order update pushed over the private stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Exchange order id
    pub order_id: String,
    /// Status word
    pub status: String,
    /// Symbol
    pub symbol: Option<String>,
    /// Side
    pub side: Option<String>,
    /// Quantity
    pub qty: Option<Decimal>,
    /// Product type
    pub product_type: ProductType,
    /// Event time
    pub timestamp: Option<DateTime<Utc>>,
}

/// Account update pushed over the private stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEvent {
    /// Event kind as reported by the exchange
    pub event_type: String,
    /// Asset
    pub asset: Option<String>,
    /// Total balance after the event
    pub balance: Option<Decimal>,
    /// Available balance after the event
    pub available: Option<Decimal>,
    /// Product type
    pub product_type: ProductType,
    /// Event time
    pub timestamp: Option<DateTime<Utc>>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::normalize_error;
    use rust_decimal_macros::dec;

    #[test]
    fn test_failed_list_is_empty() {
        let list: ErrorAwareList<Kline> =
            ErrorAwareList::failed(normalize_error(Some("NETWORK_TIMEOUT"), "timeout"));

        assert!(list.is_empty());
        assert!(!list.is_ok());
        assert_eq!(list.iter().count(), 0);
        assert_eq!(list.error.as_ref().unwrap().source_code.as_deref(), Some("NETWORK_TIMEOUT"));
    }

    #[test]
    fn test_ok_list_behaves_like_slice() {
        let balance = Balance {
            asset: "JPY".to_string(),
            total: dec!(100),
            available: dec!(80),
            account_type: "spot".to_string(),
            product_type: ProductType::Spot,
        };
        let list = ErrorAwareList::ok(vec![balance.clone()]);

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].available, dec!(80));
        assert_eq!(list.into_items(), vec![balance]);
    }

    #[test]
    fn test_from_result() {
        let ok: ErrorAwareList<u8> = Ok(vec![1, 2]).into();
        assert!(ok.is_ok());

        let failed: ErrorAwareList<u8> = Err(normalize_error(Some("AUTH_FAILED"), "no")).into();
        assert!(failed.is_empty());
        assert!(failed.error.is_some());
    }
}
