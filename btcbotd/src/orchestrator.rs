//! Live orchestrator: one trading cycle.
//!
//! # Cycle
//!
//! ```text
//! progress(running)
//!   → inputs → risk guards → progress(guard status)
//!   → gates: risk, execute_orders, live_http, decision, size, journal
//!   → place_order → lifecycle (fetch / cancel) → audit
//!   → probe streams → monitor status
//! ```
//!
//! Exchange failures never escape a cycle: they end up as reason codes, audit
//! events and the order status in the [`CycleReport`]. Only failures of the
//! daemon's own plumbing (inputs, journal) return `Err`, which the
//! supervising loop treats as a failed cycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use btcbot_domain::{
    reason_codes, ClientOrderId, Decision, GuardResult, MonitorStatus, NormalizedOrder, OrderProduct,
    Quantity, Symbol,
};
use btcbot_engine::{evaluate, size_order_detailed, OrderSizing};
use btcbot_exec::{ExchangePort, ExecError, LifecycleStep, LifecycleTracker, OrderJournal};

use crate::audit::AuditSink;
use crate::config::Config;
use crate::daemon::CycleRunner;
use crate::error::DaemonResult;
use crate::inputs::{CycleInputSource, CycleInputs};
use crate::monitor::{derive_status, probe_streams, MonitorSummary};
use crate::progress::{progress_status, ProgressRecord, ProgressSink};

/// `order_status` values for cycles that never reached the exchange.
pub mod order_outcome {
    pub const NOT_ATTEMPTED: &str = "not_attempted";
    pub const SKIPPED_DUE_TO_RISK: &str = "skipped_due_to_risk";
    pub const SKIPPED_HTTP_DISABLED: &str = "skipped_http_disabled";
    pub const SKIPPED_BY_STRATEGY: &str = "skipped_by_strategy";
    pub const SKIPPED_QTY_TOO_SMALL: &str = "skipped_qty_too_small";
    pub const SKIPPED_DUPLICATE: &str = "skipped_duplicate";
}

/// Audit event types written by the orchestrator.
pub mod audit_event {
    pub const ORDER_ATTEMPT: &str = "order_attempt";
    pub const ORDER_RESULT: &str = "order_result";
    pub const ORDER_FETCH_RESULT: &str = "order_fetch_result";
    pub const ORDER_CANCEL_RESULT: &str = "order_cancel_result";
    pub const RISK_STOP: &str = "risk_stop";
    pub const STARTUP_VALIDATION: &str = "startup_validation";
}

// =============================================================================
// Cycle report
// =============================================================================

/// Lifecycle section of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleSummary {
    pub transitions: Vec<String>,
    pub retryable: Option<bool>,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    /// Guard verdict (`success`, `degraded`, `abort`)
    pub status: String,
    /// Every reason code raised this cycle, first occurrence order
    pub reason_codes: Vec<String>,
    /// Guard codes that stopped order placement
    pub stop_reason_codes: Vec<String>,
    pub decision_action: String,
    pub execute_orders: bool,
    pub live_http_enabled: bool,
    pub order_attempted: bool,
    pub order_status: String,
    pub order_client_order_id: Option<String>,
    pub order_sizing: Option<OrderSizing>,
    pub order_lifecycle: Option<LifecycleSummary>,
    pub live_order_auto_cancel: bool,
    pub monitor_summary: MonitorSummary,
}

impl CycleReport {
    fn new(run_id: Uuid, guard: &GuardResult, decision: &Decision, config: &Config, reconnect_count: u32) -> Self {
        let mut report = Self {
            run_id,
            status: guard.status.as_str().to_string(),
            reason_codes: Vec::new(),
            stop_reason_codes: Vec::new(),
            decision_action: decision.action.as_str().to_string(),
            execute_orders: config.execution.execute_orders,
            live_http_enabled: config.execution.live_http_enabled,
            order_attempted: false,
            order_status: order_outcome::NOT_ATTEMPTED.to_string(),
            order_client_order_id: None,
            order_sizing: None,
            order_lifecycle: None,
            live_order_auto_cancel: config.execution.live_order_auto_cancel,
            monitor_summary: MonitorSummary {
                status: MonitorStatus::Active,
                reconnect_count,
            },
        };
        report.push_codes(guard.reason_codes.iter().cloned());
        report
    }

    fn push_codes<I: IntoIterator<Item = String>>(&mut self, codes: I) {
        for code in codes {
            if !self.reason_codes.contains(&code) {
                self.reason_codes.push(code);
            }
        }
    }

    fn skip(&mut self, order_status: &str, codes: &[&str]) {
        self.order_status = order_status.to_string();
        self.push_codes(codes.iter().map(|c| c.to_string()));
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

type IdSource = Box<dyn Fn(&Symbol) -> ClientOrderId + Send + Sync>;

/// Runs trading cycles against one exchange.
pub struct LiveOrchestrator<E: ExchangePort + ?Sized> {
    config: Config,
    exchange: Arc<E>,
    inputs: Arc<dyn CycleInputSource>,
    audit: Arc<dyn AuditSink>,
    progress: Arc<dyn ProgressSink>,
    journal: OrderJournal,
    tracker: LifecycleTracker,
    next_client_order_id: IdSource,
}

impl<E: ExchangePort + ?Sized> LiveOrchestrator<E> {
    pub fn new(
        config: Config,
        exchange: Arc<E>,
        inputs: Arc<dyn CycleInputSource>,
        audit: Arc<dyn AuditSink>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let tracker = LifecycleTracker::new(config.execution.live_order_auto_cancel);
        Self {
            config,
            exchange,
            inputs,
            audit,
            progress,
            journal: OrderJournal::new(),
            tracker,
            next_client_order_id: Box::new(|symbol| ClientOrderId::generate(symbol, Utc::now())),
        }
    }

    /// Replace client order id generation (replay tooling, tests).
    pub fn with_client_order_ids<F>(mut self, source: F) -> Self
    where
        F: Fn(&Symbol) -> ClientOrderId + Send + Sync + 'static,
    {
        self.next_client_order_id = Box::new(source);
        self
    }

    /// Attempts recorded so far.
    pub fn journal(&self) -> &OrderJournal {
        &self.journal
    }

    /// Run one cycle.
    pub async fn run_cycle(&self, reconnect_count: u32) -> DaemonResult<CycleReport> {
        let run_id = Uuid::now_v7();
        self.emit(ProgressRecord::live(
            progress_status::RUNNING,
            None,
            MonitorStatus::Active,
            reconnect_count,
        ))
        .await;

        let inputs = self.inputs.next_inputs().await?;

        let guard = evaluate(&self.config.risk, &inputs.snapshot);
        let guard_monitor = if guard.is_success() {
            MonitorStatus::Active
        } else {
            MonitorStatus::Degraded
        };
        self.emit(ProgressRecord::live(
            guard.status.as_str(),
            guard.reason_codes.first().cloned(),
            guard_monitor,
            reconnect_count,
        ))
        .await;

        let mut report = CycleReport::new(run_id, &guard, &inputs.decision, &self.config, reconnect_count);

        if guard.is_success() {
            self.place_and_track(&mut report, &inputs).await?;
        } else {
            warn!(%run_id, status = %guard.status, codes = ?guard.reason_codes, "Risk guard fired, skipping order");
            report.stop_reason_codes = guard.reason_codes.clone();
            report.skip(order_outcome::SKIPPED_DUE_TO_RISK, &[reason_codes::SKIPPED_DUE_TO_RISK]);
            self.record(
                audit_event::RISK_STOP,
                json!({
                    "run_id": run_id,
                    "status": guard.status,
                    "reason_codes": &guard.reason_codes,
                    "snapshot": &guard.snapshot,
                    "limits": &guard.limits,
                }),
            )
            .await;
        }

        let probes = probe_streams(self.exchange.as_ref(), self.config.execution.stream_probe_timeout).await;
        let (monitor_status, stream_codes) = derive_status(&probes, &guard);
        report.push_codes(stream_codes);
        report.monitor_summary.status = monitor_status;

        info!(
            %run_id,
            status = %report.status,
            order_status = %report.order_status,
            monitor_status = %monitor_status,
            reason_codes = ?report.reason_codes,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn place_and_track(&self, report: &mut CycleReport, inputs: &CycleInputs) -> DaemonResult<()> {
        let execution = &self.config.execution;

        if !execution.execute_orders {
            report.skip(order_outcome::NOT_ATTEMPTED, &[reason_codes::EXECUTE_ORDERS_DISABLED]);
            return Ok(());
        }
        if !execution.live_http_enabled {
            report.skip(order_outcome::SKIPPED_HTTP_DISABLED, &[reason_codes::LIVE_HTTP_DISABLED]);
            return Ok(());
        }

        let decision = &inputs.decision;
        report.push_codes(decision.reason_codes.iter().cloned());
        let Some(side) = decision.action.order_side() else {
            report.skip(order_outcome::SKIPPED_BY_STRATEGY, &[]);
            return Ok(());
        };
        if decision.confidence < execution.min_confidence {
            report.skip(order_outcome::SKIPPED_BY_STRATEGY, &[reason_codes::CONFIDENCE_BELOW_THRESHOLD]);
            return Ok(());
        }

        let balance = self.resolve_balance(inputs.balance_override).await;
        let sizing = size_order_detailed(balance, inputs.close, inputs.atr, &self.config.sizing);
        report.order_sizing = Some(sizing.clone());
        if sizing.final_qty <= Decimal::ZERO {
            info!(balance = %balance, close = %inputs.close, atr = %inputs.atr, "Order size below minimum");
            report.skip(order_outcome::SKIPPED_QTY_TOO_SMALL, &[reason_codes::ORDER_SIZE_TOO_SMALL]);
            return Ok(());
        }

        let exchange_config = &self.config.exchange;
        let client_order_id = (self.next_client_order_id)(&exchange_config.symbol);
        report.order_client_order_id = Some(client_order_id.to_string());
        match self.journal.record(&client_order_id) {
            Ok(()) => {}
            Err(ExecError::AlreadySubmitted(id)) => {
                warn!(client_order_id = %id, "Duplicate order attempt refused");
                report.skip(order_outcome::SKIPPED_DUPLICATE, &[reason_codes::DUPLICATE_ORDER_ATTEMPT]);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let order = NormalizedOrder::market(
            exchange_config.name.clone(),
            OrderProduct::for_product_type(exchange_config.product_type),
            exchange_config.symbol.clone(),
            side,
            Quantity::new(sizing.final_qty)?,
            client_order_id.clone(),
        );

        self.record(
            audit_event::ORDER_ATTEMPT,
            json!({
                "run_id": report.run_id,
                "client_order_id": &client_order_id,
                "request": order.to_json(),
                "sizing": &sizing,
            }),
        )
        .await;
        report.order_attempted = true;

        info!(%client_order_id, side = %side, qty = %sizing.final_qty, "Placing order");
        let placed = self.exchange.place_order(&order).await;
        self.record(
            audit_event::ORDER_RESULT,
            json!({
                "run_id": report.run_id,
                "client_order_id": &client_order_id,
                "state": &placed,
            }),
        )
        .await;

        let lifecycle = self.tracker.track(self.exchange.as_ref(), placed).await;
        for step in &lifecycle.steps {
            let (event_type, body) = match step {
                LifecycleStep::Fetch { state } => (audit_event::ORDER_FETCH_RESULT, json!({ "state": state })),
                LifecycleStep::Cancel { state } => (audit_event::ORDER_CANCEL_RESULT, json!({ "state": state })),
                LifecycleStep::CancelSkipped { order_id } => (
                    audit_event::ORDER_CANCEL_RESULT,
                    json!({ "status": "skipped_auto_cancel_disabled", "order_id": order_id }),
                ),
            };
            self.record(event_type, with_ids(body, report.run_id, &client_order_id)).await;
        }

        self.journal.complete(&client_order_id, lifecycle.final_status())?;

        report.order_status = lifecycle.final_status().to_string();
        report.push_codes(lifecycle.reason_codes.iter().cloned());
        report.order_lifecycle = Some(LifecycleSummary {
            transitions: lifecycle.transitions.clone(),
            retryable: lifecycle.retryable,
        });
        Ok(())
    }

    /// Override, else the exchange's available quote balance, else the
    /// configured conservative default.
    async fn resolve_balance(&self, balance_override: Option<Decimal>) -> Decimal {
        if let Some(balance) = balance_override {
            return balance;
        }

        let default = self.config.execution.default_available_balance;
        let asset = quote_asset(&self.config.exchange.symbol);
        let account_type = self.config.exchange.product_type.as_str();

        match self.exchange.fetch_balances(account_type).await {
            Ok(balances) => match balances.iter().find(|b| b.asset.eq_ignore_ascii_case(&asset)) {
                Some(balance) => balance.available,
                None => {
                    warn!(%asset, "No balance for quote asset, using default");
                    default
                }
            },
            Err(e) => {
                warn!(category = %e.category, message = %e.message, "Balance query failed, using default");
                default
            }
        }
    }

    async fn record(&self, event_type: &str, payload: Value) {
        if let Err(e) = self.audit.append_audit_event(event_type, payload).await {
            error!(event_type, error = %e, "Failed to append audit event");
        }
    }

    async fn emit(&self, record: ProgressRecord) {
        if let Err(e) = self.progress.emit_progress(record).await {
            error!(error = %e, "Failed to write progress");
        }
    }
}

#[async_trait]
impl<E: ExchangePort + ?Sized> CycleRunner for LiveOrchestrator<E> {
    async fn run_cycle(&self, reconnect_count: u32) -> DaemonResult<CycleReport> {
        LiveOrchestrator::run_cycle(self, reconnect_count).await
    }
}

fn with_ids(mut body: Value, run_id: Uuid, client_order_id: &ClientOrderId) -> Value {
    if let Value::Object(fields) = &mut body {
        fields.insert("run_id".to_string(), json!(run_id));
        fields.insert("client_order_id".to_string(), json!(client_order_id));
    }
    body
}

/// Quote currency of an exchange symbol (`BTC_JPY` → `JPY`). Bare symbols
/// such as GMO's spot `BTC` are quoted in JPY.
pub fn quote_asset(symbol: &Symbol) -> String {
    match symbol.as_str().rsplit_once('_') {
        Some((_, quote)) if !quote.is_empty() => quote.to_uppercase(),
        _ => "JPY".to_string(),
    }
}
