//! Signal generation module
//!
//! Strategies are pluggable signal sources that turn a candle window into a
//! buy/sell/hold decision

mod sma_cross;
mod types;

pub use sma_cross::SmaCrossSource;
pub use types::{Signal, SignalKind, Sizing, TakeProfitLevel};

use crate::exchange::{Candle, Ticker};

/// Trait for strategy implementations
pub trait SignalSource: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &str;

    /// Fewest candles `analyze` needs; shorter windows are skipped by the caller
    fn min_candles(&self) -> usize {
        1
    }

    /// Decide on the candle window (oldest first, newest last)
    fn analyze(&self, candles: &[Candle], ticker: Option<&Ticker>) -> anyhow::Result<Signal>;
}
