//! Risk management types

use crate::exchange::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why admission control refused a trade, one variant per check
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    #[error("In cooldown after consecutive losses, {remaining_secs}s remaining")]
    Cooldown { remaining_secs: i64 },
    #[error("Trade interval too short: {elapsed_secs}s since last trade, minimum {min_secs}s")]
    TradeTooSoon { elapsed_secs: i64, min_secs: u64 },
    #[error("Daily trade limit reached: {count}/{max}")]
    DailyTradeLimit { count: usize, max: u32 },
    #[error("Hourly trade limit reached: {count}/{max}")]
    HourlyTradeLimit { count: usize, max: u32 },
    #[error("Position size {amount} exceeds limit {max}")]
    SizeTooLarge { amount: Decimal, max: Decimal },
    #[error("Position value {value} exceeds limit {max}")]
    ValueTooLarge { value: Decimal, max: Decimal },
    #[error("Total position {exposure} would exceed limit {max}")]
    TotalPositionLimit { exposure: Decimal, max: Decimal },
    #[error("Daily loss limit reached: {pnl} (limit -{limit})")]
    DailyLossLimit { pnl: Decimal, limit: Decimal },
    #[error("Weekly loss limit reached: {pnl} (limit -{limit})")]
    WeeklyLossLimit { pnl: Decimal, limit: Decimal },
    #[error("Insufficient capital: required {required}, available {available}")]
    InsufficientCapital {
        required: Decimal,
        available: Decimal,
    },
}

/// Executed trade as seen by the risk ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub amount: Decimal,
    pub price: Decimal,
    pub stop_loss: Option<Decimal>,
    /// `None` for entries, `Some` for exits
    pub realized_pnl: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    /// Entry fill: counts toward frequency caps only
    pub fn entry(
        symbol: impl Into<String>,
        side: Side,
        amount: Decimal,
        price: Decimal,
        stop_loss: Option<Decimal>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            amount,
            price,
            stop_loss,
            realized_pnl: None,
            timestamp: Utc::now(),
        }
    }

    /// Exit fill carrying the realized P&L
    pub fn exit(
        symbol: impl Into<String>,
        side: Side,
        amount: Decimal,
        price: Decimal,
        pnl: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            amount,
            price,
            stop_loss: None,
            realized_pnl: Some(pnl),
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Snapshot returned by `RiskManager::get_statistics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskStatistics {
    pub capital: CapitalStats,
    pub positions: ExposureStats,
    pub pnl: PnlStats,
    pub trades: TradeStats,
    pub risk: RiskState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalStats {
    pub initial: Decimal,
    pub current: Decimal,
    /// Fractional return since start
    pub total_return: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureStats {
    pub open: usize,
    pub total_exposure: Decimal,
    /// Exposure as a fraction of current capital
    pub exposure_ratio: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlStats {
    pub daily: Decimal,
    pub weekly: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeStats {
    pub total: usize,
    pub last_24h: usize,
    pub last_hour: usize,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub consecutive_losses: u32,
    pub in_cooldown: bool,
    pub cooldown_remaining_secs: Option<i64>,
    /// Exposure over capital, compared against `max_leverage`
    pub leverage: Decimal,
    pub max_leverage: Decimal,
}
