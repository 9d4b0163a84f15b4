//! Integration tests for configuration loading

use guardrail::config::Config;
use guardrail::exchange::Timeframe;
use guardrail::risk::RiskLimits;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

const EXAMPLE: &str = include_str!("../../config.toml.example");

#[test]
fn test_example_config_loads() {
    let config = assert_ok!(Config::parse(EXAMPLE));

    assert_eq!(config.bot.symbol, "BTC/USDT");
    assert_eq!(config.feed.timeframe, Timeframe::M1);
    assert_eq!(config.risk.initial_capital, dec!(10000));
    assert_eq!(config.risk.limits, RiskLimits::default());
    assert_eq!(config.execution.max_order_size, dec!(1));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = Config::parse(
        r#"
        [bot]
        symbol = "ETH/USDT"

        [risk]
        initial_capital = 2500.0
        "#,
    )
    .unwrap();

    assert_eq!(config.bot.interval_secs, 60);
    assert!(config.bot.close_on_opposite_signal);
    assert_eq!(config.risk.limits.max_consecutive_losses, 3);
    assert_eq!(config.feed.candle_limit, 100);
}

#[test]
fn test_invalid_limits_rejected() {
    let err = assert_err!(Config::parse(
        r#"
        [bot]
        symbol = "ETH/USDT"

        [risk]
        initial_capital = 2500.0

        [risk.limits]
        max_daily_loss = -0.1
        "#,
    ));

    assert!(format!("{err:#}").contains("max_daily_loss"));
}
