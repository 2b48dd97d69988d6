//! End-to-end trading cycles against the stub exchange.
//!
//! Wires a `LiveOrchestrator` to `StubExchange` and in-memory audit/progress
//! sinks, then checks the cycle report, the audit trail and the exchange calls
//! made for each gate of the cycle.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use btcbot_domain::{
    normalize_error, ClientOrderId, Decision, DecisionAction, MonitorStatus, ProductType, RiskSnapshot,
};
use btcbot_exec::{StubExchange, StubOutcome, StubStream};
use btcbotd::orchestrator::{audit_event, order_outcome};
use btcbotd::{
    Config, CycleInputs, LiveOrchestrator, MemoryAuditSink, MemoryProgressSink, RuntimeMetrics, StaticInputs,
    SupervisingDaemon,
};

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    exchange: Arc<StubExchange>,
    audit: Arc<MemoryAuditSink>,
    progress: Arc<MemoryProgressSink>,
    orchestrator: LiveOrchestrator<StubExchange>,
}

fn buy_inputs() -> CycleInputs {
    CycleInputs {
        snapshot: RiskSnapshot::default(),
        decision: Decision::new(DecisionAction::Buy, 0.8, vec!["trend_up".to_string()]),
        close: dec!(100000),
        atr: dec!(1000),
        balance_override: None,
    }
}

fn harness_with(config: Config, inputs: CycleInputs) -> Harness {
    let exchange = Arc::new(StubExchange::new(ProductType::Spot, dec!(100000)));
    let audit = Arc::new(MemoryAuditSink::new());
    let progress = Arc::new(MemoryProgressSink::new());
    let orchestrator = LiveOrchestrator::new(
        config,
        exchange.clone(),
        Arc::new(StaticInputs::new(inputs)),
        audit.clone(),
        progress.clone(),
    );
    Harness {
        exchange,
        audit,
        progress,
        orchestrator,
    }
}

fn harness(inputs: CycleInputs) -> Harness {
    harness_with(Config::test(), inputs)
}

// =============================================================================
// Normal cycle
// =============================================================================

#[tokio::test]
async fn test_buy_cycle_places_tracks_and_cancels() {
    let h = harness(buy_inputs());

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.status, "success");
    assert_eq!(report.decision_action, "buy");
    assert!(report.order_attempted);
    assert_eq!(report.order_status, "cancelled");
    assert_eq!(report.reason_codes, vec!["trend_up"]);
    assert!(report.stop_reason_codes.is_empty());
    assert_eq!(report.monitor_summary.status, MonitorStatus::Active);
    assert_eq!(report.monitor_summary.reconnect_count, 0);

    let lifecycle = report.order_lifecycle.unwrap();
    assert_eq!(lifecycle.transitions, vec!["accepted", "active", "cancelled"]);
    assert_eq!(lifecycle.retryable, None);

    // balance 100000 from the exchange, notional cap 10% at close 100000
    let sizing = report.order_sizing.unwrap();
    assert_eq!(sizing.available_balance, dec!(100000));
    assert_eq!(sizing.final_qty, dec!(0.1));

    assert_eq!(h.exchange.place_calls(), 1);
    assert_eq!(h.exchange.fetch_calls(), 1);
    assert_eq!(h.exchange.cancel_calls(), 1);
    assert_eq!(h.exchange.placed_orders()[0].qty.as_decimal(), dec!(0.1));

    assert_eq!(
        h.audit.event_types(),
        vec![
            audit_event::ORDER_ATTEMPT,
            audit_event::ORDER_RESULT,
            audit_event::ORDER_FETCH_RESULT,
            audit_event::ORDER_CANCEL_RESULT,
        ]
    );
}

#[tokio::test]
async fn test_audit_payloads_carry_client_order_id() {
    let h = harness(buy_inputs());
    let report = h.orchestrator.run_cycle(0).await.unwrap();
    let client_order_id = report.order_client_order_id.unwrap();

    for event_type in [audit_event::ORDER_ATTEMPT, audit_event::ORDER_RESULT, audit_event::ORDER_CANCEL_RESULT] {
        let record = h.audit.find(event_type).unwrap();
        assert_eq!(record.payload["client_order_id"], client_order_id.as_str(), "{}", event_type);
    }
    let attempt = h.audit.find(audit_event::ORDER_ATTEMPT).unwrap();
    assert_eq!(attempt.payload["request"]["side"], "buy");
}

#[tokio::test]
async fn test_progress_running_then_guard_status() {
    let h = harness(buy_inputs());
    h.orchestrator.run_cycle(2).await.unwrap();

    let records = h.progress.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, "running");
    assert_eq!(records[1].status, "success");
    assert_eq!(records[1].last_error, None);
    assert_eq!(records[1].reconnect_count, 2);
}

#[tokio::test]
async fn test_journal_records_completed_attempt() {
    let h = harness(buy_inputs());
    let report = h.orchestrator.run_cycle(0).await.unwrap();
    let id = ClientOrderId::from_string(report.order_client_order_id.unwrap());

    let attempt = h.orchestrator.journal().get(&id).unwrap().unwrap();
    assert_eq!(attempt.final_status.as_deref(), Some("cancelled"));
}

// =============================================================================
// Risk gate
// =============================================================================

#[tokio::test]
async fn test_guard_abort_skips_order() {
    let mut inputs = buy_inputs();
    inputs.snapshot.drawdown = dec!(0.25);
    let h = harness(inputs);

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.status, "abort");
    assert_eq!(report.order_status, order_outcome::SKIPPED_DUE_TO_RISK);
    assert_eq!(report.stop_reason_codes, vec!["max_drawdown_exceeded"]);
    assert_eq!(report.reason_codes, vec!["max_drawdown_exceeded", "skipped_due_to_risk"]);
    assert!(!report.order_attempted);
    assert_eq!(report.monitor_summary.status, MonitorStatus::Degraded);

    assert_eq!(h.exchange.place_calls(), 0);
    assert_eq!(h.audit.event_types(), vec![audit_event::RISK_STOP]);
    let stop = h.audit.find(audit_event::RISK_STOP).unwrap();
    assert_eq!(stop.payload["status"], "abort");

    let last = h.progress.last().unwrap();
    assert_eq!(last.status, "abort");
    assert_eq!(last.last_error.as_deref(), Some("max_drawdown_exceeded"));
    assert_eq!(last.monitor_status, MonitorStatus::Degraded);
}

#[tokio::test]
async fn test_guard_degraded_also_skips_order() {
    let mut inputs = buy_inputs();
    inputs.snapshot.leverage = dec!(3);
    let h = harness(inputs);

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.status, "degraded");
    assert_eq!(report.order_status, order_outcome::SKIPPED_DUE_TO_RISK);
    assert_eq!(h.exchange.place_calls(), 0);
}

// =============================================================================
// Execution gates
// =============================================================================

#[tokio::test]
async fn test_execute_orders_disabled() {
    let mut config = Config::test();
    config.execution.execute_orders = false;
    let h = harness_with(config, buy_inputs());

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.order_status, order_outcome::NOT_ATTEMPTED);
    assert_eq!(report.reason_codes, vec!["execute_orders_disabled"]);
    assert!(!report.execute_orders);
    assert_eq!(h.exchange.place_calls(), 0);
    assert_eq!(h.exchange.balance_calls(), 0);
}

#[tokio::test]
async fn test_live_http_disabled() {
    let mut config = Config::test();
    config.execution.live_http_enabled = false;
    let h = harness_with(config, buy_inputs());

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.order_status, order_outcome::SKIPPED_HTTP_DISABLED);
    assert_eq!(report.reason_codes, vec!["live_http_disabled"]);
    assert_eq!(h.exchange.place_calls(), 0);
}

#[tokio::test]
async fn test_hold_is_skipped_by_strategy() {
    let h = harness(CycleInputs::no_setup());

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.decision_action, "hold");
    assert_eq!(report.order_status, order_outcome::SKIPPED_BY_STRATEGY);
    assert_eq!(report.reason_codes, vec!["no_trade_setup"]);
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn test_low_confidence_is_skipped() {
    let mut inputs = buy_inputs();
    inputs.decision.confidence = 0.3;
    let h = harness(inputs);

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.order_status, order_outcome::SKIPPED_BY_STRATEGY);
    assert_eq!(report.reason_codes, vec!["trend_up", "confidence_below_threshold"]);
    assert_eq!(h.exchange.place_calls(), 0);
}

#[tokio::test]
async fn test_size_below_minimum_is_skipped() {
    let mut inputs = buy_inputs();
    inputs.balance_override = Some(dec!(500));
    let h = harness(inputs);

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.order_status, order_outcome::SKIPPED_QTY_TOO_SMALL);
    assert!(report.reason_codes.contains(&"order_size_too_small".to_string()));
    assert_eq!(report.order_sizing.unwrap().final_qty, dec!(0));
    assert_eq!(h.exchange.balance_calls(), 0);
    assert_eq!(h.exchange.place_calls(), 0);
}

#[tokio::test]
async fn test_duplicate_client_order_id_is_refused() {
    let h = harness(buy_inputs());
    let orchestrator = h
        .orchestrator
        .with_client_order_ids(|_| ClientOrderId::from_string("live-BTCJPY-fixed"));

    let first = orchestrator.run_cycle(0).await.unwrap();
    assert_eq!(first.order_status, "cancelled");

    let second = orchestrator.run_cycle(0).await.unwrap();
    assert_eq!(second.order_status, order_outcome::SKIPPED_DUPLICATE);
    assert!(second.reason_codes.contains(&"duplicate_order_attempt".to_string()));
    assert!(!second.order_attempted);
    assert_eq!(h.exchange.place_calls(), 1);
}

#[tokio::test]
async fn test_balance_query_failure_falls_back_to_default() {
    let h = harness(buy_inputs());
    h.exchange
        .set_balances(Err(normalize_error(Some("NETWORK_TIMEOUT"), "timed out")));

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    let sizing = report.order_sizing.unwrap();
    assert_eq!(sizing.available_balance, dec!(10000));
    assert_eq!(sizing.final_qty, dec!(0.01));
    assert_eq!(h.exchange.balance_calls(), 1);
    assert_eq!(report.order_status, "cancelled");
}

// =============================================================================
// Exchange failures
// =============================================================================

#[tokio::test]
async fn test_place_failure_is_reported_not_raised() {
    let h = harness(buy_inputs());
    h.exchange
        .set_place(StubOutcome::Error(normalize_error(Some("INSUFFICIENT_MARGIN"), "margin")));

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert!(report.order_attempted);
    assert_eq!(report.order_status, "error");
    assert!(report.reason_codes.contains(&"order_place_failed".to_string()));
    assert_eq!(report.order_lifecycle.unwrap().retryable, Some(false));
    assert_eq!(h.exchange.fetch_calls(), 0);
    assert_eq!(h.audit.event_types(), vec![audit_event::ORDER_ATTEMPT, audit_event::ORDER_RESULT]);
}

#[tokio::test]
async fn test_auto_cancel_disabled_leaves_order_active() {
    let mut config = Config::test();
    config.execution.live_order_auto_cancel = false;
    let h = harness_with(config, buy_inputs());

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.order_status, "active");
    assert!(!report.live_order_auto_cancel);
    assert_eq!(h.exchange.cancel_calls(), 0);

    let cancel = h.audit.find(audit_event::ORDER_CANCEL_RESULT).unwrap();
    assert_eq!(cancel.payload["status"], "skipped_auto_cancel_disabled");
}

// =============================================================================
// Stream health
// =============================================================================

#[tokio::test]
async fn test_retryable_stream_error_is_reconnecting() {
    let h = harness(buy_inputs());
    h.exchange.set_order_stream(StubStream::Items(vec![Err(normalize_error(
        Some("CONNECTION_ERROR"),
        "reset by peer",
    ))]));

    let report = h.orchestrator.run_cycle(1).await.unwrap();

    assert_eq!(report.monitor_summary.status, MonitorStatus::Reconnecting);
    assert_eq!(report.monitor_summary.reconnect_count, 1);
    assert!(report.reason_codes.contains(&"stream_reconnecting".to_string()));
}

#[tokio::test]
async fn test_fatal_stream_error_is_degraded() {
    let h = harness(CycleInputs::no_setup());
    h.exchange.set_account_stream(StubStream::Items(vec![Err(normalize_error(
        Some("AUTH_FAILED"),
        "bad key",
    ))]));

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.monitor_summary.status, MonitorStatus::Degraded);
    assert!(report.reason_codes.contains(&"stream_degraded".to_string()));
}

#[tokio::test]
async fn test_quiet_streams_stay_active() {
    let h = harness(CycleInputs::no_setup());
    h.exchange.set_order_stream(StubStream::Pending);
    h.exchange.set_account_stream(StubStream::Pending);

    let report = h.orchestrator.run_cycle(0).await.unwrap();

    assert_eq!(report.monitor_summary.status, MonitorStatus::Active);
}

// =============================================================================
// Daemon over a real orchestrator
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_daemon_runs_cycles_until_stopped() {
    let h = harness(CycleInputs::no_setup());
    let progress = h.progress.clone();
    let config = Config::test();
    let metrics = RuntimeMetrics::new().unwrap();
    let shutdown = CancellationToken::new();

    let daemon = SupervisingDaemon::new(
        Arc::new(h.orchestrator),
        config.supervisor.clone(),
        metrics.clone(),
        progress.clone(),
        shutdown.clone(),
    );

    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        stopper.cancel();
    });

    let outcome = daemon.run().await;

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.reconnect_count, 0);
    assert_eq!(metrics.run_loop_total(), 3);
    assert_eq!(metrics.run_loop_failures_total(), 0);

    let last = progress.last().unwrap();
    assert_eq!(last.status, "degraded");
    assert_eq!(last.last_error.as_deref(), Some("shutdown_signal"));
}
