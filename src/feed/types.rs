//! Market data feed types

use crate::exchange::{Candle, Capabilities, MarketTrade, OrderBook, StreamKind, Ticker};
use serde::{Deserialize, Serialize};

/// Cache and loop key: one slot per (symbol, stream kind)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub symbol: String,
    pub kind: StreamKind,
}

impl FeedKey {
    pub fn new(symbol: impl Into<String>, kind: StreamKind) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
        }
    }
}

/// How a loop obtains updates, fixed when the loop is spawned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Await the exchange push stream
    Stream,
    /// Fetch then sleep
    Poll,
}

impl FeedMode {
    /// Pick the mode for `kind` from the client's declared capabilities
    pub fn select(capabilities: Capabilities, kind: StreamKind) -> Self {
        if capabilities.streams(kind) {
            FeedMode::Stream
        } else {
            FeedMode::Poll
        }
    }
}

/// Latest value delivered by a feed loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketUpdate {
    Ticker(Ticker),
    OrderBook(OrderBook),
    Trades(Vec<MarketTrade>),
    /// Candle window, newest last
    Candles(Vec<Candle>),
}

impl MarketUpdate {
    /// Stream kind this update belongs to
    pub fn kind(&self) -> StreamKind {
        match self {
            MarketUpdate::Ticker(_) => StreamKind::Ticker,
            MarketUpdate::OrderBook(_) => StreamKind::OrderBook,
            MarketUpdate::Trades(_) => StreamKind::Trades,
            MarketUpdate::Candles(_) => StreamKind::Candles,
        }
    }
}
