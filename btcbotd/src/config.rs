//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;

use btcbot_connectors::{GmoConfig, PrivateRetryPolicy, DEFAULT_API_BASE_URL, DEFAULT_WS_URL};
use btcbot_domain::{api_key_env, api_secret_env, reason_codes, ProductType, RiskLimits, Symbol};
use btcbot_engine::SizingParams;

use crate::audit::AuditLogPolicy;
use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (test, development, production)
    pub environment: Environment,

    /// Exchange connection
    pub exchange: ExchangeConfig,

    /// Order gating and cycle behaviour
    pub execution: ExecutionConfig,

    /// Risk guard limits
    pub risk: RiskLimits,

    /// Position sizing
    pub sizing: SizingParams,

    /// Supervising loop timing
    pub supervisor: SupervisorConfig,

    /// Health/metrics listener
    pub api: ApiConfig,

    /// Progress and audit file locations
    pub paths: PathsConfig,

    /// Audit log rotation
    pub audit: AuditLogPolicy,
}

/// Exchange connection configuration.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Exchange name, also the credential env-var prefix
    pub name: String,
    pub product_type: ProductType,
    pub symbol: Symbol,
    pub api_base_url: String,
    pub ws_url: String,
    /// Per-request HTTP/WebSocket timeout
    pub request_timeout: Duration,
    /// Attempts per private call (≥ 1)
    pub private_retry_max_attempts: u32,
    /// Base backoff delay in seconds (≥ 0)
    pub private_retry_base_delay_secs: f64,
}

/// Order gating configuration.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Place orders at all
    pub execute_orders: bool,
    /// Talk to the real exchange over HTTP
    pub live_http_enabled: bool,
    /// Cancel orders still active after the confirmation fetch
    pub live_order_auto_cancel: bool,
    /// Decisions below this confidence are treated as hold
    pub min_confidence: f64,
    /// Balance used when the balance query fails
    pub default_available_balance: Decimal,
    /// Bound for reading one item from a stream
    pub stream_probe_timeout: Duration,
}

/// Supervising loop configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Sleep between successful cycles
    pub interval: Duration,
    /// Wait before retrying a failed cycle
    pub reconnect_wait: Duration,
    /// Failed cycles tolerated before giving up
    pub max_reconnect_retries: u32,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// File locations.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// `run_progress.json` lives here
    pub artifacts_dir: PathBuf,
    /// `audit_events.jsonl` lives here
    pub logs_dir: PathBuf,
    /// Strategy output read at the start of each cycle
    pub cycle_inputs: PathBuf,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let environment = Self::load_environment(&env)?;
        let exchange = Self::load_exchange_config(&env)?;
        let execution = Self::load_execution_config(&env)?;
        let risk = Self::load_risk_limits(&env)?;
        let sizing = SizingParams {
            max_position_size: risk.max_position_size,
            position_risk_fraction: env.decimal("BTCBOT_POSITION_RISK_FRACTION", Decimal::new(1, 2))?,
            min_order_qty: env.decimal("BTCBOT_MIN_ORDER_QTY", Decimal::new(1, 3))?,
            qty_step: env.decimal("BTCBOT_QTY_STEP", Decimal::new(1, 3))?,
        };
        let supervisor = SupervisorConfig {
            interval: Duration::from_secs(env.parse("LIVE_LOOP_INTERVAL_SECONDS", 60u64)?),
            reconnect_wait: Duration::from_secs(env.parse("LIVE_RECONNECT_WAIT_SECONDS", 5u64)?),
            max_reconnect_retries: env.parse("LIVE_MAX_RECONNECT_RETRIES", 3u32)?,
        };
        let api = ApiConfig {
            host: env.string("HEALTH_HOST", "0.0.0.0"),
            port: env.parse("HEALTH_PORT", 9754u16)?,
        };
        let paths = PathsConfig {
            artifacts_dir: PathBuf::from(env.string("ARTIFACTS_DIR", "./var/artifacts")),
            logs_dir: PathBuf::from(env.string("LOGS_DIR", "./var/logs")),
            cycle_inputs: PathBuf::from(env.string("CYCLE_INPUTS_PATH", "./var/artifacts/cycle_inputs.json")),
        };
        let defaults = AuditLogPolicy::default();
        let audit = AuditLogPolicy {
            max_bytes: env.parse("AUDIT_LOG_MAX_BYTES", defaults.max_bytes)?,
            retention: env.parse("AUDIT_LOG_RETENTION", defaults.retention)?,
        };

        let config = Self {
            environment,
            exchange,
            execution,
            risk,
            sizing,
            supervisor,
            api,
            paths,
            audit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            environment: Environment::Test,
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            execution: ExecutionConfig {
                execute_orders: true,
                live_http_enabled: true,
                stream_probe_timeout: Duration::from_millis(50),
                ..ExecutionConfig::default()
            },
            supervisor: SupervisorConfig {
                interval: Duration::from_secs(1),
                reconnect_wait: Duration::from_millis(10),
                max_reconnect_retries: 3,
            },
            ..Self::default()
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> DaemonResult<()> {
        if self.exchange.private_retry_max_attempts < 1 {
            return Err(DaemonError::Config(
                "BTCBOT_PRIVATE_RETRY_MAX_ATTEMPTS must be >= 1".to_string(),
            ));
        }
        let delay = self.exchange.private_retry_base_delay_secs;
        if !delay.is_finite() || delay < 0.0 {
            return Err(DaemonError::Config(format!(
                "BTCBOT_PRIVATE_RETRY_BASE_DELAY_SECS must be >= 0, got {}",
                delay
            )));
        }
        if self.sizing.qty_step < Decimal::ZERO {
            return Err(DaemonError::Config("BTCBOT_QTY_STEP must be >= 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.execution.min_confidence) {
            return Err(DaemonError::Config(format!(
                "BTCBOT_MIN_CONFIDENCE must be within [0, 1], got {}",
                self.execution.min_confidence
            )));
        }
        if self.exchange.request_timeout.is_zero() {
            return Err(DaemonError::Config("BTCBOT_REQUEST_TIMEOUT_SECS must be > 0".to_string()));
        }
        self.risk.validate()?;
        Ok(())
    }

    /// Adapter configuration derived from this config.
    pub fn gmo_config(&self) -> GmoConfig {
        GmoConfig {
            exchange: self.exchange.name.clone(),
            product_type: self.exchange.product_type,
            api_base_url: self.exchange.api_base_url.clone(),
            ws_url: self.exchange.ws_url.clone(),
            use_http: self.execution.live_http_enabled,
            retry: PrivateRetryPolicy::from_secs_f64(
                self.exchange.private_retry_max_attempts,
                self.exchange.private_retry_base_delay_secs,
            ),
            request_timeout: self.exchange.request_timeout,
        }
    }

    fn load_environment<F: Fn(&str) -> Option<String>>(env: &EnvReader<F>) -> DaemonResult<Environment> {
        let env_str = env.string("BTCBOT_ENV", "development");

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid BTCBOT_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_exchange_config<F: Fn(&str) -> Option<String>>(
        env: &EnvReader<F>,
    ) -> DaemonResult<ExchangeConfig> {
        let product_type = ProductType::parse(&env.string("BTCBOT_PRODUCT_TYPE", "spot"))?;
        let symbol = Symbol::new(env.string("BTCBOT_SYMBOL", "BTC_JPY"))?;
        let timeout_secs = env.parse("BTCBOT_REQUEST_TIMEOUT_SECS", 10u64)?;

        Ok(ExchangeConfig {
            name: env.string("BTCBOT_EXCHANGE", "gmo").to_lowercase(),
            product_type,
            symbol,
            api_base_url: env.string("BTCBOT_API_BASE_URL", DEFAULT_API_BASE_URL),
            ws_url: env.string("BTCBOT_WS_URL", DEFAULT_WS_URL),
            request_timeout: Duration::from_secs(timeout_secs),
            private_retry_max_attempts: env.parse("BTCBOT_PRIVATE_RETRY_MAX_ATTEMPTS", 3u32)?,
            private_retry_base_delay_secs: env.parse("BTCBOT_PRIVATE_RETRY_BASE_DELAY_SECS", 0.0f64)?,
        })
    }

    fn load_execution_config<F: Fn(&str) -> Option<String>>(
        env: &EnvReader<F>,
    ) -> DaemonResult<ExecutionConfig> {
        let probe_secs = env.parse("BTCBOT_STREAM_PROBE_TIMEOUT_SECS", 5u64)?;

        Ok(ExecutionConfig {
            execute_orders: env.flag("BTCBOT_EXECUTE_ORDERS", false)?,
            live_http_enabled: env.flag("BTCBOT_LIVE_HTTP_ENABLED", false)?,
            live_order_auto_cancel: env.flag("BTCBOT_LIVE_ORDER_AUTO_CANCEL", true)?,
            min_confidence: env.parse("BTCBOT_MIN_CONFIDENCE", 0.55f64)?,
            default_available_balance: env.decimal("BTCBOT_DEFAULT_AVAILABLE_BALANCE", Decimal::new(10_000, 0))?,
            stream_probe_timeout: Duration::from_secs(probe_secs),
        })
    }

    fn load_risk_limits<F: Fn(&str) -> Option<String>>(env: &EnvReader<F>) -> DaemonResult<RiskLimits> {
        let defaults = RiskLimits::default();

        Ok(RiskLimits {
            max_drawdown: env.decimal("BTCBOT_MAX_DRAWDOWN", defaults.max_drawdown)?,
            daily_loss_limit: env.decimal("BTCBOT_DAILY_LOSS_LIMIT", defaults.daily_loss_limit)?,
            max_position_size: env.decimal("BTCBOT_MAX_POSITION_SIZE", defaults.max_position_size)?,
            max_trade_loss: env.decimal("BTCBOT_MAX_TRADE_LOSS", defaults.max_trade_loss)?,
            max_leverage: env.decimal("BTCBOT_MAX_LEVERAGE", defaults.max_leverage)?,
            max_wallet_drift: env.decimal("BTCBOT_MAX_WALLET_DRIFT", defaults.max_wallet_drift)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let risk = RiskLimits::default();
        Self {
            environment: Environment::Development,
            exchange: ExchangeConfig {
                name: "gmo".to_string(),
                product_type: ProductType::Spot,
                symbol: Symbol::default(),
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                ws_url: DEFAULT_WS_URL.to_string(),
                request_timeout: Duration::from_secs(10),
                private_retry_max_attempts: 3,
                private_retry_base_delay_secs: 0.0,
            },
            execution: ExecutionConfig::default(),
            sizing: SizingParams {
                max_position_size: risk.max_position_size,
                ..SizingParams::default()
            },
            risk,
            supervisor: SupervisorConfig {
                interval: Duration::from_secs(60),
                reconnect_wait: Duration::from_secs(5),
                max_reconnect_retries: 3,
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 9754,
            },
            paths: PathsConfig {
                artifacts_dir: PathBuf::from("./var/artifacts"),
                logs_dir: PathBuf::from("./var/logs"),
                cycle_inputs: PathBuf::from("./var/artifacts/cycle_inputs.json"),
            },
            audit: AuditLogPolicy::default(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            execute_orders: false,
            live_http_enabled: false,
            live_order_auto_cancel: true,
            min_confidence: 0.55,
            default_available_balance: Decimal::new(10_000, 0),
            stream_probe_timeout: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Env reading
// =============================================================================

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> DaemonResult<T> {
        match self.raw(key) {
            Some(val) => val
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            None => Ok(default),
        }
    }

    fn decimal(&self, key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match self.raw(key) {
            Some(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> DaemonResult<bool> {
        match self.raw(key) {
            Some(val) => match val.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            },
            None => Ok(default),
        }
    }
}

// =============================================================================
// Runtime environment validation
// =============================================================================

/// Result of checking the process environment before the loop starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeValidation {
    /// Problems that prevent startup (`missing_required_env:<VAR>`)
    pub fatal_errors: Vec<String>,
    /// Problems that only change behaviour
    pub warnings: Vec<String>,
}

impl RuntimeValidation {
    /// Whether startup may proceed.
    pub fn is_ok(&self) -> bool {
        self.fatal_errors.is_empty()
    }

    /// `Err(DaemonError::Environment)` carrying the fatal errors, if any.
    pub fn ensure_ok(&self) -> DaemonResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(DaemonError::Environment(self.fatal_errors.clone()))
        }
    }
}

/// Check that live order placement has what it needs.
///
/// Credentials are required only when orders go out over real HTTP.
pub fn validate_runtime_environment<F>(config: &Config, lookup: F) -> RuntimeValidation
where
    F: Fn(&str) -> Option<String>,
{
    let mut report = RuntimeValidation::default();
    let execution = &config.execution;

    if execution.execute_orders && execution.live_http_enabled {
        for var in [api_key_env(&config.exchange.name), api_secret_env(&config.exchange.name)] {
            let present = lookup(&var).map(|v| !v.trim().is_empty()).unwrap_or(false);
            if !present {
                report.fatal_errors.push(format!("missing_required_env:{}", var));
            }
        }
    }
    if execution.execute_orders && !execution.live_http_enabled {
        report.warnings.push(reason_codes::LIVE_HTTP_DISABLED.to_string());
    }

    report
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults_from_empty_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.exchange.name, "gmo");
        assert_eq!(config.exchange.symbol.as_str(), "BTC_JPY");
        assert_eq!(config.exchange.private_retry_max_attempts, 3);
        assert!(!config.execution.execute_orders);
        assert!(!config.execution.live_http_enabled);
        assert!(config.execution.live_order_auto_cancel);
        assert_eq!(config.risk.max_drawdown, dec!(0.2));
        assert_eq!(config.sizing.max_position_size, config.risk.max_position_size);
        assert_eq!(config.supervisor.interval, Duration::from_secs(60));
        assert_eq!(config.api.port, 9754);
        assert_eq!(config.audit.retention, 5);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BTCBOT_PRODUCT_TYPE", "leverage"),
            ("BTCBOT_EXECUTE_ORDERS", "true"),
            ("BTCBOT_LIVE_HTTP_ENABLED", "1"),
            ("BTCBOT_MAX_DRAWDOWN", "0.3"),
            ("BTCBOT_PRIVATE_RETRY_BASE_DELAY_SECS", "0.25"),
            ("LIVE_MAX_RECONNECT_RETRIES", "7"),
        ]))
        .unwrap();

        assert_eq!(config.exchange.product_type, ProductType::Leverage);
        assert!(config.execution.execute_orders);
        assert!(config.execution.live_http_enabled);
        assert_eq!(config.risk.max_drawdown, dec!(0.3));
        assert_eq!(config.exchange.private_retry_base_delay_secs, 0.25);
        assert_eq!(config.supervisor.max_reconnect_retries, 7);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for pairs in [
            vec![("BTCBOT_ENV", "staging")],
            vec![("BTCBOT_PRIVATE_RETRY_MAX_ATTEMPTS", "0")],
            vec![("BTCBOT_PRIVATE_RETRY_BASE_DELAY_SECS", "-1")],
            vec![("BTCBOT_MIN_CONFIDENCE", "1.5")],
            vec![("BTCBOT_EXECUTE_ORDERS", "maybe")],
            vec![("HEALTH_PORT", "70000")],
        ] {
            let result = Config::from_lookup(lookup(&pairs));
            assert!(matches!(result, Err(DaemonError::Config(_))), "{:?}", pairs);
        }
    }

    #[test]
    fn test_gmo_config_follows_http_switch() {
        let mut config = Config::default();
        assert!(!config.gmo_config().use_http);

        config.execution.live_http_enabled = true;
        let gmo = config.gmo_config();
        assert!(gmo.use_http);
        assert_eq!(gmo.retry.max_attempts(), 3);
    }

    #[test]
    fn test_runtime_validation_requires_credentials_for_live_orders() {
        let mut config = Config::default();
        config.execution.execute_orders = true;
        config.execution.live_http_enabled = true;

        let report = validate_runtime_environment(&config, lookup(&[("GMO_API_KEY", "k")]));
        assert!(!report.is_ok());
        assert_eq!(report.fatal_errors, vec!["missing_required_env:GMO_API_SECRET"]);

        let report = validate_runtime_environment(
            &config,
            lookup(&[("GMO_API_KEY", "k"), ("GMO_API_SECRET", "s")]),
        );
        assert!(report.is_ok());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_fatal_validation_is_an_environment_error() {
        let mut config = Config::default();
        config.execution.execute_orders = true;
        config.execution.live_http_enabled = true;

        let report = validate_runtime_environment(&config, lookup(&[]));
        match report.ensure_ok() {
            Err(DaemonError::Environment(errors)) => assert_eq!(
                errors,
                vec!["missing_required_env:GMO_API_KEY", "missing_required_env:GMO_API_SECRET"]
            ),
            other => panic!("expected environment error, got {:?}", other),
        }

        let report = validate_runtime_environment(
            &config,
            lookup(&[("GMO_API_KEY", "k"), ("GMO_API_SECRET", "s")]),
        );
        assert!(report.ensure_ok().is_ok());
    }

    #[test]
    fn test_runtime_validation_warns_when_http_disabled() {
        let mut config = Config::default();
        config.execution.execute_orders = true;

        let report = validate_runtime_environment(&config, lookup(&[]));
        assert!(report.is_ok());
        assert_eq!(report.warnings, vec!["live_http_disabled"]);
    }

    #[test]
    fn test_runtime_validation_ignores_credentials_when_not_executing() {
        let config = Config::default();
        let report = validate_runtime_environment(&config, lookup(&[]));
        assert_eq!(report, RuntimeValidation::default());
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
