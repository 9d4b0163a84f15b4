//! Signal types

use crate::exchange::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// What the signal source wants done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

/// How large the entry should be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sizing {
    /// Fraction of the per-trade risk budget, sized from the stop distance
    Ratio(Decimal),
    /// Explicit quantity in base units
    Amount(Decimal),
}

/// Staged take-profit target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    pub price: Decimal,
    /// Share of the initial position size closed at this level
    pub close_ratio: Decimal,
    #[serde(default)]
    pub triggered: bool,
    /// Resting exchange order backing this level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

impl TakeProfitLevel {
    pub fn new(price: Decimal, close_ratio: Decimal) -> Self {
        Self {
            price,
            close_ratio,
            triggered: false,
            order_id: None,
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }
}

/// A trading signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier
    pub id: Uuid,
    pub kind: SignalKind,
    /// Price the source observed when it decided
    pub price: Decimal,
    pub sizing: Sizing,
    pub stop_loss: Option<Decimal>,
    /// Ordered nearest first
    pub take_profit_levels: Vec<TakeProfitLevel>,
    pub reason: String,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Signal generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal
    pub fn new(
        kind: SignalKind,
        price: Decimal,
        sizing: Sizing,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            price,
            sizing,
            stop_loss: None,
            take_profit_levels: Vec::new(),
            reason: reason.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn buy(price: Decimal, sizing: Sizing, reason: impl Into<String>) -> Self {
        Self::new(SignalKind::Buy, price, sizing, reason)
    }

    pub fn sell(price: Decimal, sizing: Sizing, reason: impl Into<String>) -> Self {
        Self::new(SignalKind::Sell, price, sizing, reason)
    }

    pub fn hold(price: Decimal, reason: impl Into<String>) -> Self {
        Self::new(
            SignalKind::Hold,
            price,
            Sizing::Ratio(Decimal::ZERO),
            reason,
        )
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: Decimal, close_ratio: Decimal) -> Self {
        self.take_profit_levels
            .push(TakeProfitLevel::new(price, close_ratio));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Order side for buy/sell signals, `None` for hold
    pub fn side(&self) -> Option<Side> {
        match self.kind {
            SignalKind::Buy => Some(Side::Buy),
            SignalKind::Sell => Some(Side::Sell),
            SignalKind::Hold => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signal_builder() {
        let signal = Signal::buy(dec!(100), Sizing::Ratio(dec!(0.5)), "crossover")
            .with_stop_loss(dec!(98))
            .with_take_profit(dec!(103), dec!(0.5))
            .with_take_profit(dec!(106), dec!(0.5))
            .with_metadata("fast", serde_json::json!(5));

        assert_eq!(signal.side(), Some(Side::Buy));
        assert_eq!(signal.stop_loss, Some(dec!(98)));
        assert_eq!(signal.take_profit_levels.len(), 2);
        assert!(!signal.take_profit_levels[0].triggered);
        assert_eq!(signal.metadata["fast"], serde_json::json!(5));
    }

    #[test]
    fn test_hold_has_no_side() {
        let signal = Signal::hold(dec!(100), "flat");
        assert_eq!(signal.kind, SignalKind::Hold);
        assert!(signal.side().is_none());
    }

    #[test]
    fn test_signal_serialization() {
        let signal = Signal::sell(dec!(50), Sizing::Amount(dec!(2)), "test");
        let json = serde_json::to_string(&signal).unwrap();
        assert!(json.contains("\"kind\":\"sell\""));
        let parsed: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sizing, Sizing::Amount(dec!(2)));
    }
}
