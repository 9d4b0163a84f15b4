//! Integration tests for the market data feed

use async_trait::async_trait;
use guardrail::config::FeedConfig;
use guardrail::exchange::{PaperExchange, StreamKind, Timeframe};
use guardrail::feed::{FeedMode, FeedObserver, MarketDataFeed, MarketUpdate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const SYMBOL: &str = "BTC/USDT";

#[derive(Default)]
struct LastPrices {
    seen: Mutex<Vec<Decimal>>,
}

#[async_trait]
impl FeedObserver for LastPrices {
    async fn on_update(&self, _symbol: &str, update: &MarketUpdate) -> anyhow::Result<()> {
        if let MarketUpdate::Ticker(ticker) = update {
            self.seen.lock().await.push(ticker.last);
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_paper_venue_is_polled() {
    let exchange = Arc::new(PaperExchange::new(Timeframe::M1));
    exchange.set_price(SYMBOL, dec!(100)).await;

    let feed = MarketDataFeed::new(exchange.clone(), FeedConfig::default());
    let observer = Arc::new(LastPrices::default());

    let mode = feed
        .subscribe(SYMBOL, StreamKind::Ticker, Some(observer.clone()))
        .await;
    assert_eq!(mode, FeedMode::Poll);

    tokio::time::sleep(Duration::from_millis(500)).await;
    exchange.set_price(SYMBOL, dec!(101)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let seen = observer.seen.lock().await.clone();
    assert_eq!(seen.first(), Some(&dec!(100)));
    assert_eq!(seen.last(), Some(&dec!(101)));
    assert_eq!(feed.ticker(SYMBOL).await.unwrap().last, dec!(101));

    feed.stop().await;
    assert_eq!(feed.active_loops().await, 0);
    assert_eq!(feed.ticker(SYMBOL).await.unwrap().last, dec!(101));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_errors_are_retried() {
    let exchange = Arc::new(PaperExchange::new(Timeframe::M1));
    exchange.set_price(SYMBOL, dec!(100)).await;
    exchange.fail_next_fetches(1).await;

    let config = FeedConfig {
        timeframe: Timeframe::M1,
        ..Default::default()
    };
    let feed = MarketDataFeed::new(exchange.clone(), config);
    feed.subscribe(SYMBOL, StreamKind::Candles, None).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(feed.candles(SYMBOL).await.is_empty());

    // candle backoff is 10 seconds
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(feed.candles(SYMBOL).await.len(), 1);

    feed.stop().await;
}
