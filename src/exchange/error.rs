//! Exchange client errors

use thiserror::Error;

/// Errors surfaced by an [`ExchangeClient`](super::ExchangeClient)
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Transport-level failure (timeouts, disconnects, 5xx)
    #[error("Network error: {0}")]
    Network(String),
    /// The exchange refused the request
    #[error("Order rejected: {0}")]
    Rejected(String),
    /// Unknown or already closed order id
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    /// No market data for the symbol yet
    #[error("No market data for {0}")]
    NoMarketData(String),
    /// The client does not implement this capability
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}
