//! Execution types

use super::PositionSide;
use crate::exchange::{ExchangeError, OrderType, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Execution engine errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
    #[error("Order size {amount} exceeds engine limit {max}")]
    OrderTooLarge { amount: Decimal, max: Decimal },
    #[error("Engine daily loss limit reached: {realized} (limit -{limit})")]
    DailyLossLimit { realized: Decimal, limit: Decimal },
    #[error("No open position for {0}")]
    NoPosition(String),
    #[error("Order of {amount} would flip the {held} {side} position in {symbol}")]
    WouldFlip {
        symbol: String,
        side: PositionSide,
        held: Decimal,
        amount: Decimal,
    },
    #[error("Invalid protective level: {0}")]
    InvalidLevel(String),
}

/// Why a position (or part of it) was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    /// Opposite-direction signal
    Signal,
    /// Explicit close or reducing market order
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Signal => "signal",
            ExitReason::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Order resting on the exchange and tracked by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveOrder {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Result of a full or partial exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseSummary {
    pub symbol: String,
    pub side: PositionSide,
    /// Units closed by this exit
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub reason: ExitReason,
    /// Units still open afterwards
    pub remaining: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl CloseSummary {
    /// The position no longer exists
    pub fn is_full(&self) -> bool {
        self.remaining.is_zero()
    }
}

/// Engine counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Exits booked (full and partial)
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_pnl: Decimal,
    /// Realized P&L for the current UTC day
    pub daily_realized: Decimal,
    pub orders_submitted: u32,
    pub orders_failed: u32,
    pub open_positions: usize,
    pub active_orders: usize,
}
