//! Execution engine module
//!
//! Order submission, position bookkeeping and protective exits

mod engine;
mod position;
mod types;

pub use engine::ExecutionEngine;
pub use position::{Position, PositionSide, TrailingStop, Trigger};
pub use types::{ActiveOrder, CloseSummary, ExecutionError, ExecutionStats, ExitReason};
