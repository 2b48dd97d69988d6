//! Stub exchange for testing.
//!
//! Scripted responses for every port method, plus call counters so tests can
//! assert exactly which exchange calls a code path made.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use btcbot_domain::{
    order_status, AccountEvent, Balance, NormalizedError, NormalizedOrder, NormalizedOrderState,
    OrderEvent, ProductType,
};

use crate::ports::{EventStream, ExchangePort};

// =============================================================================
// Scripts
// =============================================================================

/// Scripted result of one order operation.
#[derive(Debug, Clone)]
pub enum StubOutcome {
    /// Return a state with this status
    Status(String),
    /// Return the error sentinel carrying this error
    Error(NormalizedError),
}

impl StubOutcome {
    /// Shorthand for `StubOutcome::Status`.
    pub fn status(status: &str) -> Self {
        StubOutcome::Status(status.to_string())
    }
}

/// Scripted behaviour of one event stream.
#[derive(Debug, Clone)]
pub enum StubStream<T> {
    /// Yield these items, then end
    Items(Vec<Result<T, NormalizedError>>),
    /// Never yield anything
    Pending,
}

struct Script {
    place: StubOutcome,
    fetch: StubOutcome,
    cancel: StubOutcome,
    balances: Result<Vec<Balance>, NormalizedError>,
    order_stream: StubStream<OrderEvent>,
    account_stream: StubStream<AccountEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Stub Exchange
// =============================================================================

/// Stub exchange for testing.
///
/// Defaults model a resting order: place → `accepted`, fetch → `active`,
/// cancel → `cancelled`, one JPY balance, and empty streams.
pub struct StubExchange {
    product_type: ProductType,
    script: Mutex<Script>,
    placed: Mutex<Vec<NormalizedOrder>>,
    order_counter: AtomicU64,
    place_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    balance_calls: AtomicUsize,
}

impl StubExchange {
    /// Create a stub that reports `available_jpy` as the available balance.
    pub fn new(product_type: ProductType, available_jpy: Decimal) -> Self {
        Self {
            product_type,
            script: Mutex::new(Script {
                place: StubOutcome::status(order_status::ACCEPTED),
                fetch: StubOutcome::status(order_status::ACTIVE),
                cancel: StubOutcome::status(order_status::CANCELLED),
                balances: Ok(vec![Balance {
                    asset: "JPY".to_string(),
                    total: available_jpy,
                    available: available_jpy,
                    account_type: product_type.as_str().to_string(),
                    product_type,
                }]),
                order_stream: StubStream::Items(Vec::new()),
                account_stream: StubStream::Items(Vec::new()),
            }),
            placed: Mutex::new(Vec::new()),
            order_counter: AtomicU64::new(0),
            place_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
        }
    }

    /// Script `place_order`.
    pub fn set_place(&self, outcome: StubOutcome) {
        lock(&self.script).place = outcome;
    }

    /// Script `fetch_order`.
    pub fn set_fetch(&self, outcome: StubOutcome) {
        lock(&self.script).fetch = outcome;
    }

    /// Script `cancel_order`.
    pub fn set_cancel(&self, outcome: StubOutcome) {
        lock(&self.script).cancel = outcome;
    }

    /// Script `fetch_balances`.
    pub fn set_balances(&self, balances: Result<Vec<Balance>, NormalizedError>) {
        lock(&self.script).balances = balances;
    }

    /// Script the order stream (fresh copy per subscription).
    pub fn set_order_stream(&self, stream: StubStream<OrderEvent>) {
        lock(&self.script).order_stream = stream;
    }

    /// Script the account stream (fresh copy per subscription).
    pub fn set_account_stream(&self, stream: StubStream<AccountEvent>) {
        lock(&self.script).account_stream = stream;
    }

    /// Orders received by `place_order`, in call order.
    pub fn placed_orders(&self) -> Vec<NormalizedOrder> {
        lock(&self.placed).clone()
    }

    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    fn next_order_id(&self) -> String {
        let n = self.order_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("STUB-{}", n)
    }

    fn resolve(&self, order_id: &str, outcome: StubOutcome) -> NormalizedOrderState {
        match outcome {
            StubOutcome::Status(status) => NormalizedOrderState::bare(order_id, status, self.product_type),
            StubOutcome::Error(error) => NormalizedOrderState::from_error(order_id, self.product_type, &error),
        }
    }
}

fn into_stream<T: Send + 'static>(script: StubStream<T>) -> EventStream<T> {
    match script {
        StubStream::Items(items) => stream::iter(items).boxed(),
        StubStream::Pending => stream::pending().boxed(),
    }
}

#[async_trait]
impl ExchangePort for StubExchange {
    async fn place_order(&self, order: &NormalizedOrder) -> NormalizedOrderState {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.placed).push(order.clone());

        let outcome = lock(&self.script).place.clone();
        let order_id = match outcome {
            StubOutcome::Status(_) => self.next_order_id(),
            StubOutcome::Error(_) => String::new(),
        };
        let mut state = self.resolve(&order_id, outcome);
        state.symbol = Some(order.symbol.as_str().to_string());
        state.side = Some(order.side.as_str().to_string());
        state.qty = Some(order.qty.as_decimal());
        state.reduce_only = order.reduce_only();

        tracing::debug!(order_id = %state.order_id, status = %state.status, "Stub: order placed");
        state
    }

    async fn fetch_order(&self, order_id: &str) -> NormalizedOrderState {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.script).fetch.clone();
        self.resolve(order_id, outcome)
    }

    async fn cancel_order(&self, order_id: &str) -> NormalizedOrderState {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.script).cancel.clone();
        tracing::debug!(order_id, "Stub: order cancelled");
        self.resolve(order_id, outcome)
    }

    async fn fetch_balances(&self, _account_type: &str) -> Result<Vec<Balance>, NormalizedError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.script).balances.clone()
    }

    fn stream_order_events(&self) -> EventStream<OrderEvent> {
        into_stream(lock(&self.script).order_stream.clone())
    }

    fn stream_account_events(&self) -> EventStream<AccountEvent> {
        into_stream(lock(&self.script).account_stream.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================
