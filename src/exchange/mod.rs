//! Exchange client module
//!
//! Abstract capability interface to a trading venue plus an in-memory paper venue

mod error;
mod paper;
mod types;

pub use error::ExchangeError;
pub use paper::{PaperExchange, RandomWalk};
pub use types::{
    Candle, MarketTrade, OrderAck, OrderBook, OrderRequest, OrderStatus, OrderType, PriceLevel,
    Side, Ticker, Timeframe,
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of market data stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Ticker,
    OrderBook,
    Trades,
    Candles,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Ticker => "ticker",
            StreamKind::OrderBook => "order_book",
            StreamKind::Trades => "trades",
            StreamKind::Candles => "candles",
        };
        f.write_str(name)
    }
}

/// Push-stream support declared by a client, one flag per stream kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub watch_ticker: bool,
    pub watch_order_book: bool,
    pub watch_trades: bool,
    pub watch_candles: bool,
}

impl Capabilities {
    /// Client only offers one-shot fetches
    pub fn polling_only() -> Self {
        Self::default()
    }

    /// Whether `kind` can be consumed as a push stream
    pub fn streams(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Ticker => self.watch_ticker,
            StreamKind::OrderBook => self.watch_order_book,
            StreamKind::Trades => self.watch_trades,
            StreamKind::Candles => self.watch_candles,
        }
    }
}

/// Trait for exchange client implementations
///
/// `fetch_*` are one-shot requests. `watch_*` suspend until the next push and
/// are only called for kinds flagged in [`capabilities`](Self::capabilities).
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Venue name for logging
    fn name(&self) -> &str;

    /// Streaming support, read once per subscription
    fn capabilities(&self) -> Capabilities {
        Capabilities::polling_only()
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;
    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError>;
    async fn fetch_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<MarketTrade>, ExchangeError>;
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn watch_ticker(&self, _symbol: &str) -> Result<Ticker, ExchangeError> {
        Err(ExchangeError::Unsupported("watch_ticker"))
    }

    async fn watch_order_book(&self, _symbol: &str) -> Result<OrderBook, ExchangeError> {
        Err(ExchangeError::Unsupported("watch_order_book"))
    }

    async fn watch_trades(&self, _symbol: &str) -> Result<Vec<MarketTrade>, ExchangeError> {
        Err(ExchangeError::Unsupported("watch_trades"))
    }

    async fn watch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
    ) -> Result<Vec<Candle>, ExchangeError> {
        Err(ExchangeError::Unsupported("watch_ohlcv"))
    }

    async fn create_market_order(
        &self,
        symbol: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<OrderAck, ExchangeError>;

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, ExchangeError>;

    /// Submit a protective (stop-loss / take-profit) order
    async fn create_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<(), ExchangeError>;
}
