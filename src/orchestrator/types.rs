//! Orchestrator types

use crate::exchange::Side;
use crate::execution::{CloseSummary, ExecutionStats, Position};
use crate::risk::RiskStatistics;
use rust_decimal::Decimal;
use serde::Serialize;

/// What one decision iteration did
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// Nothing to decide on yet, or a degenerate signal
    Skipped(String),
    Hold,
    /// Refused before reaching the exchange
    Rejected(String),
    Entered {
        side: Side,
        amount: Decimal,
        price: Decimal,
    },
    /// Open position closed on an opposite signal
    Exited(CloseSummary),
}

/// Snapshot returned by `TradingBot::get_status`
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub running: bool,
    pub symbol: String,
    pub positions: Vec<Position>,
    pub statistics: RiskStatistics,
    pub execution: ExecutionStats,
}
