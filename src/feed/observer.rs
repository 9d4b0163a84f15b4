//! Observer dispatch with per-callback isolation

use super::MarketUpdate;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Receives every update of the (symbol, kind) it was subscribed to
#[async_trait]
pub trait FeedObserver: Send + Sync {
    /// Name used in failure logs
    fn name(&self) -> &str {
        "observer"
    }

    async fn on_update(&self, symbol: &str, update: &MarketUpdate) -> anyhow::Result<()>;
}

/// A failed observer callback
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("observer {observer} failed: {message}")]
    ObserverFailed { observer: String, message: String },
    #[error("observer {observer} panicked")]
    ObserverPanicked { observer: String },
}

/// Invoke every observer in order, isolating failures
///
/// An error or panic in one callback never reaches the others; the failures
/// are returned for the caller to log.
pub async fn dispatch_update(
    observers: &[Arc<dyn FeedObserver>],
    symbol: &str,
    update: &MarketUpdate,
) -> Vec<FeedError> {
    let mut errors = Vec::new();

    for observer in observers {
        let outcome = AssertUnwindSafe(observer.on_update(symbol, update))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(FeedError::ObserverFailed {
                observer: observer.name().to_string(),
                message: format!("{e:#}"),
            }),
            Err(_) => errors.push(FeedError::ObserverPanicked {
                observer: observer.name().to_string(),
            }),
        }
    }

    errors
}
