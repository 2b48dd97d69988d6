//! Value Objects for the btcbot domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice("Price must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive decimal quantity
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity("Quantity must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Exchange symbol as the exchange spells it (e.g. `BTC_JPY`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if the value is blank
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidSymbol("Symbol must be non-empty".to_string()));
        }
        Ok(Self(value))
    }

    /// Exchange spelling.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-case alphanumeric form, at most 16 chars (`BTC_JPY` -> `BTCJPY`).
    pub fn compact(&self) -> String {
        self.0
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .take(16)
            .collect()
    }
}

impl Default for Symbol {
    /// `BTC_JPY`, the market the runtime trades unless configured otherwise.
    fn default() -> Self {
        Self("BTC_JPY".to_string())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Product Type
// =============================================================================

/// Spot or leveraged (margin) trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    /// Spot trading
    Spot,
    /// Leveraged trading
    Leverage,
}

impl ProductType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Spot => "spot",
            ProductType::Leverage => "leverage",
        }
    }

    /// Parse a wire name.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidOrderField` for anything else
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(ProductType::Spot),
            "leverage" => Ok(ProductType::Leverage),
            other => Err(DomainError::InvalidOrderField(format!("product_type: {}", other))),
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// OrderSide
// =============================================================================

/// OrderSide represents the order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl OrderSide {
    /// Wire name (`buy`/`sell`).
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// OrderType
// =============================================================================

/// Execution type of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Execute at market
    Market,
    /// Rest at a limit price
    Limit,
}

impl OrderType {
    /// Wire name (`market`/`limit`).
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

// =============================================================================
// Client Order ID
// =============================================================================

/// Caller-generated idempotency key, `live-{SYMBOL}-{yyyymmddHHMMSSffffff}-{8 hex}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Generate a fresh id for one order attempt.
    pub fn generate(symbol: &Symbol, now: DateTime<Utc>) -> Self {
        let suffix: [u8; 4] = rand::random();
        Self(format!(
            "live-{}-{}-{}",
            symbol.compact(),
            now.format("%Y%m%d%H%M%S%6f"),
            hex::encode(suffix)
        ))
    }

    /// Wrap an existing id (e.g. replayed from an audit log).
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The id as sent to the exchange.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Monitor Status
// =============================================================================

/// Derived connectivity/risk health of the runtime.
///
/// Always recomputed from the latest stream probes and guard verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// Streams healthy, guards passing
    Active,
    /// A stream reported a retryable failure
    Reconnecting,
    /// Non-retryable stream failure or a guard breach
    Degraded,
}

impl MonitorStatus {
    /// Every status, in gauge order.
    pub const ALL: [MonitorStatus; 3] = [
        MonitorStatus::Degraded,
        MonitorStatus::Active,
        MonitorStatus::Reconnecting,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Active => "active",
            MonitorStatus::Reconnecting => "reconnecting",
            MonitorStatus::Degraded => "degraded",
        }
    }

    /// Value exported on the `monitor_status` gauge.
    pub fn gauge_value(&self) -> i64 {
        match self {
            MonitorStatus::Degraded => 0,
            MonitorStatus::Active => 1,
            MonitorStatus::Reconnecting => 2,
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
