//! Risk management module
//!
//! Pre-trade admission checks, position sizing, capital and loss bookkeeping

mod cooldown;
mod limits;
mod manager;
mod types;

pub use cooldown::CooldownState;
pub use limits::{RiskLimits, MAX_WINDOW_SECS};
pub use manager::RiskManager;
pub use types::{
    CapitalStats, ExposureStats, PnlStats, RiskRejection, RiskState, RiskStatistics, TradeRecord,
    TradeStats,
};
