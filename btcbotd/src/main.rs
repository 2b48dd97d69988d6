//! btcbot Daemon
//!
//! Live trading loop against GMO Coin with health and metrics endpoints.
//!
//! # Usage
//!
//! ```bash
//! # Dry run: no orders, no real HTTP
//! cargo run -p btcbotd
//!
//! # Live orders
//! GMO_API_KEY=... GMO_API_SECRET=... \
//! BTCBOT_EXECUTE_ORDERS=true BTCBOT_LIVE_HTTP_ENABLED=true cargo run -p btcbotd
//! ```
//!
//! # Environment Variables
//!
//! - `BTCBOT_ENV`: Environment (test, development, production)
//! - `BTCBOT_EXECUTE_ORDERS` / `BTCBOT_LIVE_HTTP_ENABLED`: order gating
//! - `LIVE_LOOP_INTERVAL_SECONDS`: Sleep between cycles (default: 60)
//! - `HEALTH_HOST` / `HEALTH_PORT`: Listener (default: 0.0.0.0:9754)
//! - `ARTIFACTS_DIR` / `LOGS_DIR`: Progress and audit files
//!
//! See `Config` for the full list.

use std::env;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use btcbot_connectors::GmoAdapter;
use btcbot_domain::MonitorStatus;
use btcbotd::orchestrator::audit_event;
use btcbotd::progress::progress_status;
use btcbotd::{
    start_api_server, validate_runtime_environment, ApiState, AuditSink, Config, FileProgressSink,
    JsonFileInputs, JsonlAuditSink, LiveOrchestrator, ProgressRecord, ProgressSink, RuntimeMetrics,
    SupervisingDaemon,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("btcbotd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        exchange = %config.exchange.name,
        symbol = %config.exchange.symbol,
        execute_orders = config.execution.execute_orders,
        live_http_enabled = config.execution.live_http_enabled,
        health_port = config.api.port,
        "btcbot daemon"
    );

    let progress: Arc<dyn ProgressSink> = Arc::new(FileProgressSink::new(&config.paths.artifacts_dir));
    let audit: Arc<dyn AuditSink> = Arc::new(JsonlAuditSink::new(&config.paths.logs_dir, config.audit));

    // Startup validation
    let validation = validate_runtime_environment(&config, |key| env::var(key).ok());
    let validation_json = serde_json::to_value(&validation)?;
    audit
        .append_audit_event(audit_event::STARTUP_VALIDATION, validation_json.clone())
        .await?;

    if let Some(fatal) = validation.fatal_errors.first() {
        error!(errors = ?validation.fatal_errors, "Runtime environment invalid");
        progress
            .emit_progress(
                ProgressRecord::live(progress_status::FAILED, Some(fatal.clone()), MonitorStatus::Degraded, 0)
                    .with_validation(validation_json.clone()),
            )
            .await?;
        validation.ensure_ok()?;
    }
    if let Some(warning) = validation.warnings.first() {
        warn!(warnings = ?validation.warnings, "Runtime environment warnings");
        progress
            .emit_progress(
                ProgressRecord::live(progress_status::RUNNING, Some(warning.clone()), MonitorStatus::Active, 0)
                    .with_validation(validation_json.clone()),
            )
            .await?;
    }

    // Wiring
    let exchange = Arc::new(GmoAdapter::new(config.gmo_config()));
    let inputs = Arc::new(JsonFileInputs::new(&config.paths.cycle_inputs));
    let orchestrator = Arc::new(LiveOrchestrator::new(
        config.clone(),
        exchange,
        inputs,
        audit,
        progress.clone(),
    ));

    let metrics = RuntimeMetrics::new()?;
    let shutdown = CancellationToken::new();
    let server_stop = CancellationToken::new();

    let api_state = ApiState {
        shutdown: shutdown.clone(),
        metrics: metrics.clone(),
    };
    let api_addr = start_api_server(&config.api.host, config.api.port, api_state, server_stop.clone()).await?;
    info!(%api_addr, "Health listener started");

    spawn_signal_listener(shutdown.clone());

    let daemon = SupervisingDaemon::new(orchestrator, config.supervisor.clone(), metrics, progress, shutdown)
        .with_validation(validation_json);
    let outcome = daemon.run().await;

    server_stop.cancel();
    info!(exit_code = outcome.exit_code, "btcbot daemon stopped");
    if outcome.exit_code != 0 {
        std::process::exit(outcome.exit_code);
    }
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                        _ = term.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C");
        }
        shutdown.cancel();
    });
}
