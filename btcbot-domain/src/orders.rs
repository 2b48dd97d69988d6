//! Order request and order state models.
//!
//! `NormalizedOrder` is what the runtime asks the exchange to do;
//! `NormalizedOrderState` is what the exchange says happened. A failed
//! operation still produces an order-shaped state (`status = "error"`) so the
//! lifecycle tracker can keep going without branching on error types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::NormalizedError;
use crate::value_objects::{ClientOrderId, OrderSide, OrderType, Price, ProductType, Quantity, Symbol};

// =============================================================================
// Status words
// =============================================================================

/// Normalized order status words.
pub mod order_status {
    /// Acknowledged, not yet live on the book
    pub const ACCEPTED: &str = "accepted";
    /// Live on the book
    pub const ACTIVE: &str = "active";
    /// Refused by the exchange
    pub const REJECTED: &str = "rejected";
    /// Cancelled
    pub const CANCELLED: &str = "cancelled";
    /// Fully executed
    pub const FILLED: &str = "filled";
    /// Expired
    pub const EXPIRED: &str = "expired";
    /// Sentinel for a failed operation; `raw.error` carries the detail
    pub const ERROR: &str = "error";
}

// =============================================================================
// Order Product
// =============================================================================

/// Product type of an order together with its reduce-only flag.
///
/// Spot orders cannot carry a reduce-only flag and leveraged orders always
/// carry one, so the pairing is fixed by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderProduct {
    /// Spot order
    Spot,
    /// Leveraged order
    Leverage {
        /// Forbid increasing existing exposure
        reduce_only: bool,
    },
}

impl OrderProduct {
    /// Product type without the flag.
    pub fn product_type(&self) -> ProductType {
        match self {
            OrderProduct::Spot => ProductType::Spot,
            OrderProduct::Leverage { .. } => ProductType::Leverage,
        }
    }

    /// `None` for spot, the flag for leverage.
    pub fn reduce_only(&self) -> Option<bool> {
        match self {
            OrderProduct::Spot => None,
            OrderProduct::Leverage { reduce_only } => Some(*reduce_only),
        }
    }

    /// Default product for a product type (leverage orders open exposure).
    pub fn for_product_type(product_type: ProductType) -> Self {
        match product_type {
            ProductType::Spot => OrderProduct::Spot,
            ProductType::Leverage => OrderProduct::Leverage { reduce_only: false },
        }
    }
}

// =============================================================================
// Normalized Order
// =============================================================================

/// Exchange-agnostic order request.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOrder {
    /// Exchange name (e.g. `gmo`)
    pub exchange: String,
    /// Product type and reduce-only flag
    pub product: OrderProduct,
    /// Traded symbol
    pub symbol: Symbol,
    /// Direction
    pub side: OrderSide,
    /// Market or limit
    pub order_type: OrderType,
    /// Time in force, exchange spelling
    pub time_in_force: Option<String>,
    /// Order size
    pub qty: Quantity,
    /// Limit price
    pub price: Option<Price>,
    /// Idempotency key
    pub client_order_id: ClientOrderId,
}

impl NormalizedOrder {
    /// Market order with no time in force.
    pub fn market(
        exchange: impl Into<String>,
        product: OrderProduct,
        symbol: Symbol,
        side: OrderSide,
        qty: Quantity,
        client_order_id: ClientOrderId,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            product,
            symbol,
            side,
            order_type: OrderType::Market,
            time_in_force: None,
            qty,
            price: None,
            client_order_id,
        }
    }

    /// Product type of the order.
    pub fn product_type(&self) -> ProductType {
        self.product.product_type()
    }

    /// Reduce-only flag (`None` for spot).
    pub fn reduce_only(&self) -> Option<bool> {
        self.product.reduce_only()
    }

    /// Flat JSON form used in audit payloads.
    pub fn to_json(&self) -> Value {
        json!({
            "exchange": self.exchange,
            "product_type": self.product_type().as_str(),
            "symbol": self.symbol.as_str(),
            "side": self.side.as_str(),
            "order_type": self.order_type.as_str(),
            "time_in_force": self.time_in_force,
            "qty": self.qty.as_decimal(),
            "price": self.price.map(|p| p.as_decimal()),
            "reduce_only": self.reduce_only(),
            "client_order_id": self.client_order_id.as_str(),
        })
    }
}

// =============================================================================
// Normalized Order State
// =============================================================================

/// Exchange view of an order after place/fetch/cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrderState {
    /// Exchange order id (empty when the exchange never assigned one)
    pub order_id: String,
    /// Normalized status word, or `"error"`
    pub status: String,
    /// Symbol
    pub symbol: Option<String>,
    /// Side
    pub side: Option<String>,
    /// Order type
    pub order_type: Option<String>,
    /// Quantity
    pub qty: Option<Decimal>,
    /// Price
    pub price: Option<Decimal>,
    /// Product type the call was made for
    pub product_type: ProductType,
    /// Reduce-only flag (always `None` for spot)
    pub reduce_only: Option<bool>,
    /// Raw exchange payload; holds `error` when `status == "error"`
    pub raw: Value,
}

impl NormalizedOrderState {
    /// State carrying only an id and a status.
    pub fn bare(order_id: impl Into<String>, status: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            order_id: order_id.into(),
            status: status.into(),
            symbol: None,
            side: None,
            order_type: None,
            qty: None,
            price: None,
            product_type,
            reduce_only: None,
            raw: json!({}),
        }
    }

    /// Order-shaped result for a failed operation.
    pub fn from_error(order_id: impl Into<String>, product_type: ProductType, error: &NormalizedError) -> Self {
        Self {
            raw: json!({ "error": error.to_json() }),
            ..Self::bare(order_id, order_status::ERROR, product_type)
        }
    }

    /// Whether this is the error sentinel.
    pub fn is_error(&self) -> bool {
        self.status == order_status::ERROR
    }

    /// The embedded error, when this is the error sentinel.
    pub fn error(&self) -> Option<NormalizedError> {
        if !self.is_error() {
            return None;
        }
        self.raw.get("error").and_then(NormalizedError::from_json)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{normalize_error, ErrorCategory};
    use rust_decimal_macros::dec;

    fn order(product: OrderProduct) -> NormalizedOrder {
        NormalizedOrder::market(
            "gmo",
            product,
            Symbol::new("BTC_JPY").unwrap(),
            OrderSide::Buy,
            Quantity::new(dec!(0.01)).unwrap(),
            ClientOrderId::from_string("live-BTCJPY-1-deadbeef"),
        )
    }

    #[test]
    fn test_spot_order_has_null_reduce_only() {
        let spot = order(OrderProduct::Spot);
        assert_eq!(spot.reduce_only(), None);
        assert_eq!(spot.to_json()["reduce_only"], Value::Null);
        assert_eq!(spot.to_json()["product_type"], "spot");
    }

    #[test]
    fn test_leverage_order_carries_flag() {
        let lev = order(OrderProduct::Leverage { reduce_only: true });
        assert_eq!(lev.product_type(), ProductType::Leverage);
        assert_eq!(lev.to_json()["reduce_only"], true);
        assert_eq!(
            OrderProduct::for_product_type(ProductType::Leverage).reduce_only(),
            Some(false)
        );
    }

    #[test]
    fn test_error_state_embeds_error() {
        let err = normalize_error(Some("RATE_LIMIT"), "slow down");
        let state = NormalizedOrderState::from_error("", ProductType::Spot, &err);

        assert!(state.is_error());
        assert_eq!(state.raw["error"]["category"], "rate_limit");
        assert_eq!(state.raw["error"]["retryable"], true);

        let back = state.error().unwrap();
        assert_eq!(back.category, ErrorCategory::RateLimit);
        assert_eq!(back.message, "slow down");
    }

    #[test]
    fn test_non_error_state_has_no_error() {
        let state = NormalizedOrderState::bare("1", order_status::ACTIVE, ProductType::Spot);
        assert!(!state.is_error());
        assert!(state.error().is_none());
    }
}
