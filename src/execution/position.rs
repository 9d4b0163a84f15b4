//! Position state and protective triggers

use crate::exchange::Side;
use crate::signal::TakeProfitLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side opened by an entry order
    pub fn from_entry(side: Side) -> Self {
        match side {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }

    pub fn entry_side(&self) -> Side {
        match self {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }

    /// Order side that reduces this position
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }

    /// P&L of `size` units moved from `entry` to `exit`
    pub fn pnl(&self, entry: Decimal, exit: Decimal, size: Decimal) -> Decimal {
        match self {
            PositionSide::Long => (exit - entry) * size,
            PositionSide::Short => (entry - exit) * size,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("long"),
            PositionSide::Short => f.write_str("short"),
        }
    }
}

/// Stop that follows the best price at a fixed relative distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Fraction of price, e.g. 0.02
    pub distance: Decimal,
    /// Best price seen since arming
    pub extreme: Decimal,
    pub stop_price: Decimal,
}

impl TrailingStop {
    pub fn new(side: PositionSide, price: Decimal, distance: Decimal) -> Self {
        Self {
            distance,
            extreme: price,
            stop_price: Self::level(side, price, distance),
        }
    }

    fn level(side: PositionSide, price: Decimal, distance: Decimal) -> Decimal {
        match side {
            PositionSide::Long => price * (Decimal::ONE - distance),
            PositionSide::Short => price * (Decimal::ONE + distance),
        }
    }

    /// Follow a new best price; the stop never moves against the position
    pub fn update(&mut self, side: PositionSide, price: Decimal) -> bool {
        let better = match side {
            PositionSide::Long => price > self.extreme,
            PositionSide::Short => price < self.extreme,
        };
        if !better {
            return false;
        }

        self.extreme = price;
        let candidate = Self::level(side, price, self.distance);
        let moved = match side {
            PositionSide::Long => candidate > self.stop_price,
            PositionSide::Short => candidate < self.stop_price,
        };
        if moved {
            self.stop_price = candidate;
        }
        moved
    }
}

/// Protective exit due at the current price
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    StopLoss {
        price: Decimal,
    },
    TrailingStop {
        price: Decimal,
    },
    TakeProfit {
        level: usize,
        price: Decimal,
        /// Units to close at this level
        size: Decimal,
    },
}

/// An open position, at most one per symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    /// Size before any take-profit stage; base for close ratios
    pub initial_size: Decimal,
    /// Size-weighted average entry
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    /// Next untriggered take-profit price
    pub take_profit: Option<Decimal>,
    pub take_profit_levels: Vec<TakeProfitLevel>,
    pub trailing_stop: Option<TrailingStop>,
    pub entry_time: DateTime<Utc>,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    /// Booked by partial exits
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        size: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            initial_size: size,
            entry_price: price,
            stop_loss: None,
            take_profit: None,
            take_profit_levels: Vec::new(),
            trailing_stop: None,
            entry_time: at,
            current_price: price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Increase the position, re-averaging the entry price
    pub fn add(&mut self, size: Decimal, price: Decimal) {
        let total = self.size + size;
        if total.is_zero() {
            return;
        }
        self.entry_price = (self.entry_price * self.size + price * size) / total;
        self.size = total;
        self.initial_size += size;
        self.mark(price);
    }

    /// Take `size` units off at `price`; returns the realized P&L
    pub fn reduce(&mut self, size: Decimal, price: Decimal) -> Decimal {
        let size = size.min(self.size);
        let pnl = self.side.pnl(self.entry_price, price, size);
        self.size -= size;
        self.realized_pnl += pnl;
        self.mark(price);
        pnl
    }

    /// Mark to `price` and ratchet the trailing stop
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = self.side.pnl(self.entry_price, price, self.size);
        if let Some(trailing) = self.trailing_stop.as_mut() {
            trailing.update(self.side, price);
        }
    }

    /// Register a staged target, kept ordered nearest first
    pub fn add_take_profit_level(&mut self, level: TakeProfitLevel) {
        self.take_profit_levels.push(level);
        match self.side {
            PositionSide::Long => self
                .take_profit_levels
                .sort_by(|a, b| a.price.cmp(&b.price)),
            PositionSide::Short => self
                .take_profit_levels
                .sort_by(|a, b| b.price.cmp(&a.price)),
        }
        self.refresh_take_profit();
    }

    pub fn mark_level_triggered(&mut self, index: usize) {
        if let Some(level) = self.take_profit_levels.get_mut(index) {
            level.triggered = true;
        }
        self.refresh_take_profit();
    }

    fn refresh_take_profit(&mut self) {
        self.take_profit = self.next_level().map(|(_, level)| level.price);
    }

    fn next_level(&self) -> Option<(usize, &TakeProfitLevel)> {
        self.take_profit_levels
            .iter()
            .enumerate()
            .find(|(_, level)| !level.triggered)
    }

    /// Exit due at `price`, if any
    ///
    /// Stops are evaluated before take-profit and at most one trigger is
    /// returned.
    pub fn evaluate(&self, price: Decimal) -> Option<Trigger> {
        let stop_hit = |stop: Decimal| match self.side {
            PositionSide::Long => price <= stop,
            PositionSide::Short => price >= stop,
        };

        if let Some(stop) = self.stop_loss {
            if stop_hit(stop) {
                return Some(Trigger::StopLoss { price: stop });
            }
        }
        if let Some(trailing) = &self.trailing_stop {
            if stop_hit(trailing.stop_price) {
                return Some(Trigger::TrailingStop {
                    price: trailing.stop_price,
                });
            }
        }

        let (index, level) = self.next_level()?;
        let reached = match self.side {
            PositionSide::Long => price >= level.price,
            PositionSide::Short => price <= level.price,
        };
        if !reached {
            return None;
        }

        // The remainder goes once the triggered ratios reach the whole position
        let closed_ratio: Decimal = self
            .take_profit_levels
            .iter()
            .filter(|l| l.triggered)
            .map(|l| l.close_ratio)
            .sum();
        let size = if closed_ratio + level.close_ratio >= Decimal::ONE {
            self.size
        } else {
            (self.initial_size * level.close_ratio).min(self.size)
        };

        Some(Trigger::TakeProfit {
            level: index,
            price: level.price,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long(size: Decimal, price: Decimal) -> Position {
        Position::new("BTC/USDT", PositionSide::Long, size, price, Utc::now())
    }

    #[test]
    fn test_weighted_average_entry() {
        let mut position = long(dec!(1), dec!(90));
        position.add(dec!(1), dec!(100));
        assert_eq!(position.entry_price, dec!(95));
        assert_eq!(position.size, dec!(2));
        assert_eq!(position.initial_size, dec!(2));
    }

    #[test]
    fn test_reduce_realizes_pnl() {
        let mut position = long(dec!(2), dec!(100));
        let pnl = position.reduce(dec!(0.5), dec!(110));
        assert_eq!(pnl, dec!(5));
        assert_eq!(position.size, dec!(1.5));
        assert_eq!(position.unrealized_pnl, dec!(15));

        let mut short = Position::new("X", PositionSide::Short, dec!(1), dec!(50), Utc::now());
        assert_eq!(short.reduce(dec!(1), dec!(45)), dec!(5));
        assert!(short.size.is_zero());
    }

    #[test]
    fn test_stop_loss_precedes_take_profit() {
        let mut position = long(dec!(1), dec!(100));
        position.stop_loss = Some(dec!(105));
        position.add_take_profit_level(TakeProfitLevel::new(dec!(95), dec!(1)));

        assert_eq!(
            position.evaluate(dec!(100)),
            Some(Trigger::StopLoss { price: dec!(105) })
        );
    }

    #[test]
    fn test_long_and_short_triggers() {
        let mut position = long(dec!(1), dec!(100));
        position.stop_loss = Some(dec!(98));
        position.add_take_profit_level(TakeProfitLevel::new(dec!(104), dec!(1)));

        assert_eq!(position.evaluate(dec!(101)), None);
        assert!(matches!(
            position.evaluate(dec!(98)),
            Some(Trigger::StopLoss { .. })
        ));
        assert!(matches!(
            position.evaluate(dec!(104)),
            Some(Trigger::TakeProfit { size, .. }) if size == dec!(1)
        ));

        let mut short = Position::new("X", PositionSide::Short, dec!(1), dec!(100), Utc::now());
        short.stop_loss = Some(dec!(102));
        short.add_take_profit_level(TakeProfitLevel::new(dec!(96), dec!(1)));
        assert!(matches!(
            short.evaluate(dec!(102.5)),
            Some(Trigger::StopLoss { .. })
        ));
        assert!(matches!(
            short.evaluate(dec!(95)),
            Some(Trigger::TakeProfit { .. })
        ));
        assert_eq!(short.evaluate(dec!(99)), None);
    }

    #[test]
    fn test_staged_take_profit_sizes() {
        let mut position = long(dec!(4), dec!(100));
        // Added out of order; sorted nearest first
        position.add_take_profit_level(TakeProfitLevel::new(dec!(110), dec!(0.5)));
        position.add_take_profit_level(TakeProfitLevel::new(dec!(105), dec!(0.25)));
        assert_eq!(position.take_profit, Some(dec!(105)));

        let first = position.evaluate(dec!(106)).unwrap();
        assert_eq!(
            first,
            Trigger::TakeProfit {
                level: 0,
                price: dec!(105),
                size: dec!(1)
            }
        );

        position.reduce(dec!(1), dec!(106));
        position.mark_level_triggered(0);
        assert_eq!(position.take_profit, Some(dec!(110)));

        // 0.25 + 0.5 leaves a quarter open
        let second = position.evaluate(dec!(111)).unwrap();
        assert!(matches!(second, Trigger::TakeProfit { level: 1, size, .. } if size == dec!(2)));

        position.reduce(dec!(2), dec!(111));
        position.mark_level_triggered(1);
        assert_eq!(position.size, dec!(1));
        assert_eq!(position.take_profit, None);
        assert_eq!(position.evaluate(dec!(120)), None);
    }

    #[test]
    fn test_single_partial_level_keeps_remainder() {
        let mut position = long(dec!(4), dec!(100));
        position.add_take_profit_level(TakeProfitLevel::new(dec!(105), dec!(0.5)));

        assert_eq!(
            position.evaluate(dec!(106)),
            Some(Trigger::TakeProfit {
                level: 0,
                price: dec!(105),
                size: dec!(2)
            })
        );
    }

    #[test]
    fn test_ratios_summing_to_one_close_remainder() {
        let mut position = long(dec!(3), dec!(100));
        position.add_take_profit_level(TakeProfitLevel::new(dec!(105), dec!(0.3)));
        position.add_take_profit_level(TakeProfitLevel::new(dec!(110), dec!(0.7)));

        position.reduce(dec!(0.9), dec!(105));
        position.mark_level_triggered(0);
        // Manual reduction between stages
        position.reduce(dec!(0.05), dec!(106));

        assert!(matches!(
            position.evaluate(dec!(110)),
            Some(Trigger::TakeProfit { level: 1, size, .. }) if size == dec!(2.05)
        ));
    }

    #[test]
    fn test_trailing_stop_only_moves_in_favour() {
        let mut position = long(dec!(1), dec!(100));
        position.trailing_stop = Some(TrailingStop::new(PositionSide::Long, dec!(100), dec!(0.05)));

        position.mark(dec!(120));
        assert_eq!(position.trailing_stop.unwrap().stop_price, dec!(114));

        position.mark(dec!(115));
        assert_eq!(position.trailing_stop.unwrap().stop_price, dec!(114));
        assert_eq!(position.evaluate(dec!(115)), None);

        assert_eq!(
            position.evaluate(dec!(113)),
            Some(Trigger::TrailingStop { price: dec!(114) })
        );
    }

    #[test]
    fn test_short_trailing_stop() {
        let mut trailing = TrailingStop::new(PositionSide::Short, dec!(100), dec!(0.1));
        assert_eq!(trailing.stop_price, dec!(110));
        assert!(trailing.update(PositionSide::Short, dec!(90)));
        assert_eq!(trailing.stop_price, dec!(99));
        assert!(!trailing.update(PositionSide::Short, dec!(95)));
    }
}
