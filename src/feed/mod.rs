//! Market data feed module
//!
//! One ingestion loop per (symbol, stream kind), streaming when the exchange
//! client supports it and polling otherwise. The latest value of every loop is
//! cached and fanned out to the registered observers.

mod observer;
mod types;

pub use observer::{dispatch_update, FeedError, FeedObserver};
pub use types::{FeedKey, FeedMode, MarketUpdate};

use crate::config::FeedConfig;
use crate::exchange::{
    Candle, ExchangeClient, ExchangeError, MarketTrade, OrderBook, StreamKind, Ticker,
};
use crate::telemetry::{increment, CounterMetric};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinError, JoinHandle};

type ObserverMap = HashMap<FeedKey, Vec<Arc<dyn FeedObserver>>>;

/// Market data ingestion and cache
pub struct MarketDataFeed {
    client: Arc<dyn ExchangeClient>,
    config: FeedConfig,
    cache: Arc<RwLock<HashMap<FeedKey, MarketUpdate>>>,
    observers: Arc<RwLock<ObserverMap>>,
    tasks: Mutex<HashMap<FeedKey, (FeedMode, JoinHandle<()>)>>,
}

impl MarketDataFeed {
    pub fn new(client: Arc<dyn ExchangeClient>, config: FeedConfig) -> Self {
        Self {
            client,
            config,
            cache: Arc::new(RwLock::new(HashMap::new())),
            observers: Arc::new(RwLock::new(HashMap::new())),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start the ingestion loop for (symbol, kind)
    ///
    /// A loop already running for the key is reused and only the observer is
    /// added. Returns the mode the loop runs in.
    pub async fn subscribe(
        &self,
        symbol: &str,
        kind: StreamKind,
        observer: Option<Arc<dyn FeedObserver>>,
    ) -> FeedMode {
        let key = FeedKey::new(symbol, kind);

        if let Some(observer) = observer {
            self.observers
                .write()
                .await
                .entry(key.clone())
                .or_default()
                .push(observer);
        }

        let mut tasks = self.tasks.lock().await;
        if let Some((mode, _)) = tasks.get(&key) {
            tracing::debug!(%symbol, %kind, ?mode, "Feed loop already running");
            return *mode;
        }

        let mode = FeedMode::select(self.client.capabilities(), kind);
        let feed_loop = FeedLoop {
            key: key.clone(),
            client: self.client.clone(),
            config: self.config.clone(),
            cache: self.cache.clone(),
            observers: self.observers.clone(),
        };
        let handle = match mode {
            FeedMode::Stream => tokio::spawn(feed_loop.run_stream()),
            FeedMode::Poll => tokio::spawn(feed_loop.run_poll()),
        };

        tracing::info!(
            exchange = self.client.name(),
            %symbol,
            %kind,
            ?mode,
            "Feed loop started"
        );
        tasks.insert(key, (mode, handle));
        mode
    }

    /// Cancel every loop and wait for it to finish
    ///
    /// Task failures are collected rather than raised. Calling this again with
    /// nothing running returns an empty list.
    pub async fn stop(&self) -> Vec<JoinError> {
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .await
            .drain()
            .map(|(_, (_, handle))| handle)
            .collect();

        if handles.is_empty() {
            return Vec::new();
        }

        for handle in &handles {
            handle.abort();
        }
        let count = handles.len();
        let errors: Vec<JoinError> = join_all(handles)
            .await
            .into_iter()
            .filter_map(Result::err)
            .filter(|e| !e.is_cancelled())
            .collect();

        self.observers.write().await.clear();

        for error in &errors {
            tracing::error!(error = %error, "Feed loop terminated abnormally");
        }
        tracing::info!(loops = count, "Market data feed stopped");
        errors
    }

    /// Candles kept per symbol
    pub fn candle_limit(&self) -> usize {
        self.config.candle_limit
    }

    /// Number of running loops
    pub async fn active_loops(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Mode of the loop for (symbol, kind), if one is running
    pub async fn mode(&self, symbol: &str, kind: StreamKind) -> Option<FeedMode> {
        self.tasks
            .lock()
            .await
            .get(&FeedKey::new(symbol, kind))
            .map(|(mode, _)| *mode)
    }

    /// Latest cached value for (symbol, kind)
    pub async fn latest(&self, symbol: &str, kind: StreamKind) -> Option<MarketUpdate> {
        self.cache
            .read()
            .await
            .get(&FeedKey::new(symbol, kind))
            .cloned()
    }

    pub async fn ticker(&self, symbol: &str) -> Option<Ticker> {
        match self.latest(symbol, StreamKind::Ticker).await {
            Some(MarketUpdate::Ticker(ticker)) => Some(ticker),
            _ => None,
        }
    }

    pub async fn order_book(&self, symbol: &str) -> Option<OrderBook> {
        match self.latest(symbol, StreamKind::OrderBook).await {
            Some(MarketUpdate::OrderBook(book)) => Some(book),
            _ => None,
        }
    }

    pub async fn trades(&self, symbol: &str) -> Vec<MarketTrade> {
        match self.latest(symbol, StreamKind::Trades).await {
            Some(MarketUpdate::Trades(trades)) => trades,
            _ => Vec::new(),
        }
    }

    /// Cached candle window, oldest first; empty before the first fetch
    pub async fn candles(&self, symbol: &str) -> Vec<Candle> {
        match self.latest(symbol, StreamKind::Candles).await {
            Some(MarketUpdate::Candles(candles)) => candles,
            _ => Vec::new(),
        }
    }
}

/// State moved into a spawned ingestion loop
struct FeedLoop {
    key: FeedKey,
    client: Arc<dyn ExchangeClient>,
    config: FeedConfig,
    cache: Arc<RwLock<HashMap<FeedKey, MarketUpdate>>>,
    observers: Arc<RwLock<ObserverMap>>,
}

impl FeedLoop {
    async fn run_stream(self) {
        loop {
            match self.watch().await {
                Ok(update) => self.publish(update).await,
                Err(e) => self.backoff(e).await,
            }
        }
    }

    async fn run_poll(self) {
        let interval = self.poll_interval();
        loop {
            match self.fetch().await {
                Ok(update) => {
                    self.publish(update).await;
                    tokio::time::sleep(interval).await;
                }
                Err(e) => self.backoff(e).await,
            }
        }
    }

    async fn watch(&self) -> Result<MarketUpdate, ExchangeError> {
        let symbol = self.key.symbol.as_str();
        Ok(match self.key.kind {
            StreamKind::Ticker => MarketUpdate::Ticker(self.client.watch_ticker(symbol).await?),
            StreamKind::OrderBook => {
                MarketUpdate::OrderBook(self.client.watch_order_book(symbol).await?)
            }
            StreamKind::Trades => MarketUpdate::Trades(self.client.watch_trades(symbol).await?),
            StreamKind::Candles => MarketUpdate::Candles(
                self.client
                    .watch_ohlcv(symbol, self.config.timeframe)
                    .await?,
            ),
        })
    }

    async fn fetch(&self) -> Result<MarketUpdate, ExchangeError> {
        let symbol = self.key.symbol.as_str();
        Ok(match self.key.kind {
            StreamKind::Ticker => MarketUpdate::Ticker(self.client.fetch_ticker(symbol).await?),
            StreamKind::OrderBook => MarketUpdate::OrderBook(
                self.client
                    .fetch_order_book(symbol, self.config.order_book_depth)
                    .await?,
            ),
            StreamKind::Trades => MarketUpdate::Trades(
                self.client
                    .fetch_trades(symbol, self.config.trades_limit)
                    .await?,
            ),
            StreamKind::Candles => MarketUpdate::Candles(
                self.client
                    .fetch_ohlcv(symbol, self.config.timeframe, self.config.candle_limit)
                    .await?,
            ),
        })
    }

    /// Replace the cache slot, then fan out to observers
    async fn publish(&self, update: MarketUpdate) {
        self.cache
            .write()
            .await
            .insert(self.key.clone(), update.clone());

        let observers = self
            .observers
            .read()
            .await
            .get(&self.key)
            .cloned()
            .unwrap_or_default();

        for error in dispatch_update(&observers, &self.key.symbol, &update).await {
            increment(CounterMetric::ObserverErrors);
            tracing::warn!(
                symbol = %self.key.symbol,
                kind = %self.key.kind,
                error = %error,
                "Feed observer failed"
            );
        }
    }

    async fn backoff(&self, error: ExchangeError) {
        let delay = self.backoff_delay();
        increment(CounterMetric::FeedErrors);
        tracing::warn!(
            symbol = %self.key.symbol,
            kind = %self.key.kind,
            error = %error,
            retry_in_secs = delay.as_secs(),
            "Market data request failed"
        );
        tokio::time::sleep(delay).await;
    }

    fn poll_interval(&self) -> Duration {
        match self.key.kind {
            StreamKind::Candles => self.config.timeframe.poll_interval(),
            _ => Duration::from_millis(self.config.fast_poll_ms),
        }
    }

    fn backoff_delay(&self) -> Duration {
        match self.key.kind {
            StreamKind::Candles => Duration::from_secs(self.config.candle_backoff_secs),
            _ => Duration::from_secs(self.config.fast_backoff_secs),
        }
    }
}
