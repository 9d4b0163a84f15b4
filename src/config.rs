//! Configuration types for guardrail

use crate::exchange::Timeframe;
use crate::risk::RiskLimits;
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Decision loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Traded symbol, e.g. "BTC/USDT"
    pub symbol: String,

    /// Seconds between decision iterations
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Fraction of capital risked per trade before the signal's ratio is applied
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: Decimal,

    /// Pause after a failed iteration
    #[serde(default = "default_error_delay_secs")]
    pub error_delay_secs: u64,

    /// Trailing stop distance (fraction of price) armed on every entry
    #[serde(default)]
    pub trailing_stop_pct: Option<Decimal>,

    /// Exit an open position when the signal points the other way
    #[serde(default = "default_true")]
    pub close_on_opposite_signal: bool,
}

fn default_interval_secs() -> u64 {
    60
}
fn default_risk_per_trade() -> Decimal {
    Decimal::new(1, 2) // 0.01 = 1%
}
fn default_error_delay_secs() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

impl BotConfig {
    /// Config for `symbol` with every other field at its default
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval_secs: default_interval_secs(),
            risk_per_trade: default_risk_per_trade(),
            error_delay_secs: default_error_delay_secs(),
            trailing_stop_pct: None,
            close_on_opposite_signal: true,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_secs(self.error_delay_secs)
    }
}

/// Market data feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Candle timeframe
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,

    /// Candles requested per fetch
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,

    /// Order book levels requested per fetch
    #[serde(default = "default_order_book_depth")]
    pub order_book_depth: usize,

    /// Public trades requested per fetch
    #[serde(default = "default_trades_limit")]
    pub trades_limit: usize,

    /// Polling interval for ticker, order book and trades (milliseconds)
    #[serde(default = "default_fast_poll_ms")]
    pub fast_poll_ms: u64,

    /// Backoff after a ticker/order book/trades error (seconds)
    #[serde(default = "default_fast_backoff_secs")]
    pub fast_backoff_secs: u64,

    /// Backoff after a candle error (seconds)
    #[serde(default = "default_candle_backoff_secs")]
    pub candle_backoff_secs: u64,
}

fn default_timeframe() -> Timeframe {
    Timeframe::H1
}
fn default_candle_limit() -> usize {
    100
}
fn default_order_book_depth() -> usize {
    20
}
fn default_trades_limit() -> usize {
    50
}
fn default_fast_poll_ms() -> u64 {
    1_000
}
fn default_fast_backoff_secs() -> u64 {
    5
}
fn default_candle_backoff_secs() -> u64 {
    10
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            timeframe: default_timeframe(),
            candle_limit: default_candle_limit(),
            order_book_depth: default_order_book_depth(),
            trades_limit: default_trades_limit(),
            fast_poll_ms: default_fast_poll_ms(),
            fast_backoff_secs: default_fast_backoff_secs(),
            candle_backoff_secs: default_candle_backoff_secs(),
        }
    }
}

/// Risk budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Starting capital in quote currency
    pub initial_capital: Decimal,
    #[serde(default)]
    pub limits: RiskLimits,
}

/// Execution engine guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Largest single order the engine will submit (units)
    #[serde(default = "default_max_order_size")]
    pub max_order_size: Decimal,

    /// Realized loss (quote currency) after which the engine refuses new exposure for the day
    #[serde(default = "default_engine_daily_loss")]
    pub max_daily_loss: Decimal,

    /// Fill deviation from the last known price that gets flagged
    #[serde(default = "default_max_slippage")]
    pub max_slippage: Decimal,
}

fn default_max_order_size() -> Decimal {
    Decimal::new(1_000, 0)
}
fn default_engine_daily_loss() -> Decimal {
    Decimal::new(1_000, 0)
}
fn default_max_slippage() -> Decimal {
    Decimal::new(5, 3) // 0.005 = 0.5%
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_order_size: default_max_order_size(),
            max_daily_loss: default_engine_daily_loss(),
            max_slippage: default_max_slippage(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.risk.limits.validate()?;
        if config.risk.initial_capital <= Decimal::ZERO {
            anyhow::bail!("risk.initial_capital must be positive");
        }
        Ok(config)
    }
}
