//! End-to-end position lifecycle through the trading bot

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use guardrail::config::Config;
use guardrail::exchange::{Candle, OrderType, PaperExchange, Side, StreamKind, Timeframe};
use guardrail::orchestrator::{IterationOutcome, TradingBot};
use guardrail::signal::SmaCrossSource;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

const SYMBOL: &str = "BTC/USDT";

/// Flat closes followed by a jump: SMA3 crosses above SMA5 on the last candle
async fn bullish_venue() -> Arc<PaperExchange> {
    let exchange = Arc::new(PaperExchange::new(Timeframe::M1));
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let closes = [100, 100, 100, 100, 100, 100, 110];
    for (i, close) in closes.iter().enumerate() {
        let close = Decimal::from(*close);
        exchange
            .push_candle(
                SYMBOL,
                Candle {
                    timestamp: start + ChronoDuration::minutes(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: dec!(1),
                },
            )
            .await;
    }
    exchange
}

async fn bot_on(exchange: Arc<PaperExchange>) -> Arc<TradingBot> {
    let config = Config::parse(include_str!("../../config.toml.example")).unwrap();
    let source = SmaCrossSource::new(3, 5)
        .unwrap()
        .with_stop_pct(dec!(0.02))
        .with_take_profit(dec!(0.03), dec!(0.5))
        .with_take_profit(dec!(0.06), dec!(0.5));
    let bot = Arc::new(TradingBot::new(&config, exchange, Arc::new(source)));

    bot.feed()
        .subscribe(SYMBOL, StreamKind::Candles, None)
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    bot
}

#[tokio::test]
async fn test_entry_then_stop_out() {
    let exchange = bullish_venue().await;
    let bot = bot_on(exchange.clone()).await;

    let outcome = bot.run_iteration().await.unwrap();
    assert_eq!(
        outcome,
        IterationOutcome::Entered {
            side: Side::Buy,
            amount: dec!(1),
            price: dec!(110),
        }
    );
    assert_eq!(exchange.open_orders().await.len(), 3);

    exchange.set_price(SYMBOL, dec!(107)).await;
    let outcome = bot.run_iteration().await.unwrap();
    assert!(
        matches!(&outcome, IterationOutcome::Rejected(reason) if reason.contains("Trade interval too short")),
        "unexpected outcome {outcome:?}"
    );

    assert!(!bot.engine().has_position(SYMBOL).await);
    assert!(exchange.open_orders().await.is_empty());

    let risk = bot.risk().read().await;
    assert_eq!(risk.capital(), dec!(9997));
    assert_eq!(risk.cooldown().consecutive_losses, 1);
    assert_eq!(risk.total_exposure(), Decimal::ZERO);
    drop(risk);

    bot.stop().await;
}

#[tokio::test]
async fn test_staged_take_profit() {
    let exchange = bullish_venue().await;
    let bot = bot_on(exchange.clone()).await;
    bot.run_iteration().await.unwrap();

    exchange.set_price(SYMBOL, dec!(114)).await;
    let outcome = bot.run_iteration().await.unwrap();
    assert!(matches!(outcome, IterationOutcome::Rejected(_)));

    let position = bot.engine().position(SYMBOL).await.unwrap();
    assert_eq!(position.size, dec!(0.5));
    assert_eq!(bot.risk().read().await.total_exposure(), dec!(57));
    let stops: Vec<_> = exchange
        .open_orders()
        .await
        .into_iter()
        .filter(|o| o.order_type == OrderType::StopLoss)
        .collect();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].amount, dec!(0.5));

    exchange.set_price(SYMBOL, dec!(117)).await;
    bot.run_iteration().await.unwrap();
    assert!(!bot.engine().has_position(SYMBOL).await);

    let stats = bot.get_status().await.statistics;
    assert_eq!(stats.capital.current, dec!(10005.5));
    assert_eq!(stats.trades.wins, 2);
    assert_eq!(stats.positions.open, 0);

    bot.stop().await;
    assert!(exchange.open_orders().await.is_empty());
}
