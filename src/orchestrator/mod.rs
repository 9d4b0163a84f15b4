//! Trading bot orchestration
//!
//! Wires the feed, signal source, risk manager and execution engine into a
//! fixed-interval decision loop

mod bot;
mod types;

pub use bot::TradingBot;
pub use types::{BotStatus, IterationOutcome};
