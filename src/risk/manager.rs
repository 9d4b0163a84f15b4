//! Admission control and capital bookkeeping

use super::{
    CapitalStats, CooldownState, ExposureStats, PnlStats, RiskLimits, RiskRejection, RiskState,
    RiskStatistics, TradeRecord, TradeStats,
};
use crate::exchange::Side;
use crate::telemetry::{set_gauge, GaugeMetric};
use chrono::{DateTime, Datelike, Duration, IsoWeek, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Write;

/// Owns capital, trade history, the loss cooldown and the exposure ledger
///
/// All methods are synchronous; callers share it behind a lock.
pub struct RiskManager {
    limits: RiskLimits,
    initial_capital: Decimal,
    current_capital: Decimal,
    trades: Vec<TradeRecord>,
    exposure: HashMap<String, Decimal>,
    cooldown: CooldownState,
    day: NaiveDate,
    week: IsoWeek,
    daily_pnl: Decimal,
    weekly_pnl: Decimal,
    total_pnl: Decimal,
    wins: u32,
    losses: u32,
}

impl RiskManager {
    pub fn new(initial_capital: Decimal, limits: RiskLimits) -> Self {
        let now = Utc::now();
        Self {
            limits,
            initial_capital,
            current_capital: initial_capital,
            trades: Vec::new(),
            exposure: HashMap::new(),
            cooldown: CooldownState::default(),
            day: now.date_naive(),
            week: now.iso_week(),
            daily_pnl: Decimal::ZERO,
            weekly_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            wins: 0,
            losses: 0,
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn capital(&self) -> Decimal {
        self.current_capital
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn cooldown(&self) -> &CooldownState {
        &self.cooldown
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn weekly_pnl(&self) -> Decimal {
        self.weekly_pnl
    }

    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    /// Check whether a trade may be placed now
    pub fn check_trade_allowed(
        &mut self,
        symbol: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Result<(), RiskRejection> {
        self.check_trade_allowed_at(symbol, side, amount, price, Utc::now())
    }

    /// Ordered admission chain; the first failing check decides the rejection
    pub fn check_trade_allowed_at(
        &mut self,
        symbol: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RiskRejection> {
        self.roll_periods(now);

        // 1. Loss cooldown
        if let Some(remaining) = self.cooldown.remaining_at(now, self.limits.cooldown()) {
            return Err(RiskRejection::Cooldown {
                remaining_secs: remaining.num_seconds(),
            });
        }

        if amount <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(RiskRejection::InvalidOrder(format!(
                "amount {amount} at price {price}"
            )));
        }

        // 2. Minimum interval between trades
        if let Some(last) = self.trades.last() {
            let elapsed = now - last.timestamp;
            if elapsed < self.limits.min_trade_interval() {
                return Err(RiskRejection::TradeTooSoon {
                    elapsed_secs: elapsed.num_seconds(),
                    min_secs: self.limits.min_trade_interval_secs,
                });
            }
        }

        // 3. Trade frequency
        let last_24h = self.trades_since(now - Duration::hours(24));
        if last_24h >= self.limits.max_daily_trades as usize {
            return Err(RiskRejection::DailyTradeLimit {
                count: last_24h,
                max: self.limits.max_daily_trades,
            });
        }
        let last_hour = self.trades_since(now - Duration::minutes(60));
        if last_hour >= self.limits.max_hourly_trades as usize {
            return Err(RiskRejection::HourlyTradeLimit {
                count: last_hour,
                max: self.limits.max_hourly_trades,
            });
        }

        // 4. Per-trade size and value
        if amount > self.limits.max_position_size {
            return Err(RiskRejection::SizeTooLarge {
                amount,
                max: self.limits.max_position_size,
            });
        }
        let notional = amount * price;
        if notional > self.limits.max_position_value {
            return Err(RiskRejection::ValueTooLarge {
                value: notional,
                max: self.limits.max_position_value,
            });
        }

        // 5. Total position ratio
        let exposure = self.total_exposure();
        if side == Side::Buy {
            let max_total = self.current_capital * self.limits.max_total_position;
            if exposure + notional > max_total {
                return Err(RiskRejection::TotalPositionLimit {
                    exposure: exposure + notional,
                    max: max_total,
                });
            }
        }

        // 6. Realized loss caps
        let daily_limit = self.current_capital * self.limits.max_daily_loss;
        if self.daily_pnl <= -daily_limit {
            return Err(RiskRejection::DailyLossLimit {
                pnl: self.daily_pnl,
                limit: daily_limit,
            });
        }
        let weekly_limit = self.current_capital * self.limits.max_weekly_loss;
        if self.weekly_pnl <= -weekly_limit {
            return Err(RiskRejection::WeeklyLossLimit {
                pnl: self.weekly_pnl,
                limit: weekly_limit,
            });
        }

        // 7. Free capital
        if side == Side::Buy {
            let available = self.current_capital - exposure;
            if notional > available {
                return Err(RiskRejection::InsufficientCapital {
                    required: notional,
                    available,
                });
            }
        }

        tracing::debug!(%symbol, %side, %amount, %price, "Trade admitted");
        Ok(())
    }

    /// Units to trade so that hitting `stop_loss` loses at most the risk budget
    ///
    /// Returns zero when entry and stop coincide.
    pub fn calculate_position_size(
        &self,
        entry_price: Decimal,
        stop_loss: Decimal,
        risk_percent: Decimal,
    ) -> Decimal {
        let risk_per_unit = (entry_price - stop_loss).abs();
        if risk_per_unit.is_zero() {
            return Decimal::ZERO;
        }

        let risk_amount = self.current_capital * risk_percent.min(self.limits.max_single_loss);
        let mut size = risk_amount / risk_per_unit;

        size = size.min(self.limits.max_position_size);
        if size * entry_price > self.limits.max_position_value {
            size = self.limits.max_position_value / entry_price;
        }

        size.max(Decimal::ZERO)
    }

    /// Stop at the configured distance on the losing side of `entry`
    pub fn default_stop_loss(&self, entry: Decimal, side: Side) -> Decimal {
        let pct = self.limits.default_stop_loss_pct;
        match side {
            Side::Buy => entry * (Decimal::ONE - pct),
            Side::Sell => entry * (Decimal::ONE + pct),
        }
    }

    /// Target at the configured distance on the winning side of `entry`
    pub fn default_take_profit(&self, entry: Decimal, side: Side) -> Decimal {
        let pct = self.limits.default_take_profit_pct;
        match side {
            Side::Buy => entry * (Decimal::ONE + pct),
            Side::Sell => entry * (Decimal::ONE - pct),
        }
    }

    /// Append to the history and book any realized P&L
    pub fn record_trade(&mut self, trade: TradeRecord) {
        self.roll_periods(trade.timestamp);

        if let Some(pnl) = trade.realized_pnl {
            self.daily_pnl += pnl;
            self.weekly_pnl += pnl;
            self.total_pnl += pnl;
            self.current_capital += pnl;

            if pnl < Decimal::ZERO {
                self.losses += 1;
                let threshold = self.limits.max_consecutive_losses;
                if self.cooldown.record_loss(trade.timestamp, threshold) {
                    tracing::warn!(
                        consecutive_losses = self.cooldown.consecutive_losses,
                        cooldown_secs = self.limits.cooldown_after_losses_secs,
                        "Loss streak limit reached, entering cooldown"
                    );
                }
            } else {
                if pnl > Decimal::ZERO {
                    self.wins += 1;
                }
                self.cooldown.record_non_loss();
            }

            tracing::info!(
                symbol = %trade.symbol,
                %pnl,
                capital = %self.current_capital,
                daily_pnl = %self.daily_pnl,
                "Realized P&L recorded"
            );
            set_gauge(GaugeMetric::Capital, to_f64(self.current_capital));
            set_gauge(GaugeMetric::DailyPnl, to_f64(self.daily_pnl));
            set_gauge(GaugeMetric::TotalPnl, to_f64(self.total_pnl));
            set_gauge(
                GaugeMetric::ConsecutiveLosses,
                self.cooldown.consecutive_losses as f64,
            );
        }

        self.trades.push(trade);
    }

    /// Set the notional held in `symbol`; zero or less removes the entry
    pub fn update_exposure(&mut self, symbol: &str, notional: Decimal) {
        if notional <= Decimal::ZERO {
            self.exposure.remove(symbol);
        } else {
            self.exposure.insert(symbol.to_string(), notional);
        }
        set_gauge(GaugeMetric::TotalExposure, to_f64(self.total_exposure()));
    }

    pub fn exposure(&self, symbol: &str) -> Decimal {
        self.exposure.get(symbol).copied().unwrap_or_default()
    }

    pub fn total_exposure(&self) -> Decimal {
        self.exposure.values().copied().sum()
    }

    pub fn get_statistics(&self) -> RiskStatistics {
        self.get_statistics_at(Utc::now())
    }

    pub fn get_statistics_at(&self, now: DateTime<Utc>) -> RiskStatistics {
        let total_exposure = self.total_exposure();
        let ratio = |value: Decimal| {
            if self.current_capital > Decimal::ZERO {
                value / self.current_capital
            } else {
                Decimal::ZERO
            }
        };
        let decided = self.wins + self.losses;
        let win_rate = if decided > 0 {
            Decimal::from(self.wins) / Decimal::from(decided)
        } else {
            Decimal::ZERO
        };

        let cooldown = self.limits.cooldown();
        let cooldown_remaining_secs = self
            .cooldown
            .clone()
            .remaining_at(now, cooldown)
            .map(|d| d.num_seconds());

        RiskStatistics {
            capital: CapitalStats {
                initial: self.initial_capital,
                current: self.current_capital,
                total_return: if self.initial_capital > Decimal::ZERO {
                    (self.current_capital - self.initial_capital) / self.initial_capital
                } else {
                    Decimal::ZERO
                },
            },
            positions: ExposureStats {
                open: self.exposure.len(),
                total_exposure,
                exposure_ratio: ratio(total_exposure),
            },
            pnl: PnlStats {
                daily: self.daily_pnl,
                weekly: self.weekly_pnl,
                total: self.total_pnl,
            },
            trades: TradeStats {
                total: self.trades.len(),
                last_24h: self.trades_since(now - Duration::hours(24)),
                last_hour: self.trades_since(now - Duration::minutes(60)),
                wins: self.wins,
                losses: self.losses,
                win_rate,
            },
            risk: RiskState {
                consecutive_losses: self.cooldown.consecutive_losses,
                in_cooldown: cooldown_remaining_secs.is_some(),
                cooldown_remaining_secs,
                leverage: ratio(total_exposure),
                max_leverage: self.limits.max_leverage,
            },
        }
    }

    /// Human-readable risk and performance summary
    pub fn report(&self) -> String {
        let stats = self.get_statistics();
        let pct = |d: Decimal| (d * Decimal::ONE_HUNDRED).round_dp(2);
        let mut out = String::new();

        let _ = writeln!(out, "=== Risk Report ===");
        let _ = writeln!(
            out,
            "Capital:        {} (initial {}, return {}%)",
            stats.capital.current.round_dp(2),
            stats.capital.initial.round_dp(2),
            pct(stats.capital.total_return)
        );
        let _ = writeln!(
            out,
            "P&L:            daily {} | weekly {} | total {}",
            stats.pnl.daily.round_dp(2),
            stats.pnl.weekly.round_dp(2),
            stats.pnl.total.round_dp(2)
        );
        let _ = writeln!(
            out,
            "Exposure:       {} across {} position(s) ({}% of capital, max leverage {})",
            stats.positions.total_exposure.round_dp(2),
            stats.positions.open,
            pct(stats.positions.exposure_ratio),
            stats.risk.max_leverage
        );
        let _ = writeln!(
            out,
            "Trades:         {} total, {} in 24h, {} in 1h",
            stats.trades.total, stats.trades.last_24h, stats.trades.last_hour
        );
        let _ = writeln!(
            out,
            "Win rate:       {}% ({} wins / {} losses)",
            pct(stats.trades.win_rate),
            stats.trades.wins,
            stats.trades.losses
        );
        let status = match stats.risk.cooldown_remaining_secs {
            Some(secs) => format!("COOLDOWN ({secs}s remaining)"),
            None => "ACTIVE".to_string(),
        };
        let _ = writeln!(
            out,
            "Status:         {} ({} consecutive losses)",
            status, stats.risk.consecutive_losses
        );
        out
    }

    fn trades_since(&self, since: DateTime<Utc>) -> usize {
        self.trades.iter().filter(|t| t.timestamp > since).count()
    }

    /// Reset the daily/weekly P&L when `now` enters a new UTC day or ISO week
    fn roll_periods(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if day != self.day {
            self.day = day;
            self.daily_pnl = Decimal::ZERO;
        }
        let week = now.iso_week();
        if week != self.week {
            self.week = week;
            self.weekly_pnl = Decimal::ZERO;
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "BTC/USDT";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()
    }

    fn roomy_limits() -> RiskLimits {
        RiskLimits {
            max_position_size: dec!(100),
            max_position_value: dec!(100000),
            max_total_position: dec!(1.0),
            ..Default::default()
        }
    }

    fn manager() -> RiskManager {
        let mut risk = RiskManager::new(dec!(10000), roomy_limits());
        risk.roll_periods(t0());
        risk
    }

    fn loss(pnl: Decimal, at: DateTime<Utc>) -> TradeRecord {
        TradeRecord::exit(SYMBOL, Side::Sell, dec!(1), dec!(100), pnl).at(at)
    }

    #[test]
    fn test_position_size_from_stop_distance() {
        let risk = manager();
        // 10000 * 1% / (100 - 98)
        assert_eq!(
            risk.calculate_position_size(dec!(100), dec!(98), dec!(0.01)),
            dec!(50)
        );
    }

    #[test]
    fn test_position_size_clamped_to_size_cap() {
        let limits = RiskLimits {
            max_position_size: dec!(10),
            max_position_value: dec!(100000),
            ..Default::default()
        };
        let risk = RiskManager::new(dec!(10000), limits);
        assert_eq!(
            risk.calculate_position_size(dec!(100), dec!(98), dec!(0.01)),
            dec!(10)
        );
    }

    #[test]
    fn test_position_size_rescaled_to_value_cap() {
        let limits = RiskLimits {
            max_position_size: dec!(100),
            max_position_value: dec!(2000),
            ..Default::default()
        };
        let risk = RiskManager::new(dec!(10000), limits);
        assert_eq!(
            risk.calculate_position_size(dec!(100), dec!(98), dec!(0.01)),
            dec!(20)
        );
    }

    #[test]
    fn test_position_size_risk_capped_by_single_loss() {
        let risk = manager();
        // 10% requested, max_single_loss 2% applies
        assert_eq!(
            risk.calculate_position_size(dec!(100), dec!(90), dec!(0.10)),
            dec!(20)
        );
    }

    #[test]
    fn test_position_size_zero_stop_distance() {
        let risk = manager();
        assert_eq!(
            risk.calculate_position_size(dec!(100), dec!(100), dec!(0.01)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_default_protection_levels() {
        let risk = manager();
        assert_eq!(risk.default_stop_loss(dec!(100), Side::Buy), dec!(98));
        assert_eq!(risk.default_stop_loss(dec!(100), Side::Sell), dec!(102));
        assert_eq!(risk.default_take_profit(dec!(100), Side::Buy), dec!(104));
        assert_eq!(risk.default_take_profit(dec!(100), Side::Sell), dec!(96));
    }

    #[test]
    fn test_allows_reasonable_trade() {
        let mut risk = manager();
        assert!(risk
            .check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), t0())
            .is_ok());
    }

    #[test]
    fn test_rejects_invalid_amount() {
        let mut risk = manager();
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(0), dec!(100), t0());
        assert!(matches!(result, Err(RiskRejection::InvalidOrder(_))));
    }

    #[test]
    fn test_cooldown_after_three_losses() {
        let mut risk = manager();
        for i in 0..3 {
            risk.record_trade(loss(dec!(-10), t0() + Duration::minutes(i)));
        }
        assert!(risk.cooldown().in_cooldown);

        let now = t0() + Duration::minutes(12);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now);
        // Last loss at +2min, cooldown 3600s
        assert_eq!(
            result,
            Err(RiskRejection::Cooldown {
                remaining_secs: 3000
            })
        );
        assert!(result.unwrap_err().to_string().contains("3000s remaining"));
    }

    #[test]
    fn test_cooldown_checked_before_order_shape() {
        let mut risk = manager();
        for i in 0..3 {
            risk.record_trade(loss(dec!(-10), t0() + Duration::minutes(i)));
        }

        let now = t0() + Duration::minutes(12);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(0), dec!(100), now);
        assert!(matches!(result, Err(RiskRejection::Cooldown { .. })));
    }

    #[test]
    fn test_huge_windows_do_not_overflow() {
        let limits = RiskLimits {
            cooldown_after_losses_secs: 100_000_000_000_000_000,
            min_trade_interval_secs: u64::MAX,
            ..roomy_limits()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);
        risk.record_trade(loss(dec!(-10), t0()));
        for i in 1..3 {
            risk.record_trade(loss(dec!(-10), t0() + Duration::minutes(i)));
        }

        let now = t0() + Duration::days(30);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now);
        assert!(matches!(result, Err(RiskRejection::Cooldown { .. })));
        assert!(risk.get_statistics_at(now).risk.in_cooldown);
    }

    #[test]
    fn test_cooldown_expires_and_resets_streak() {
        let mut risk = manager();
        for i in 0..3 {
            risk.record_trade(loss(dec!(-10), t0() + Duration::minutes(i)));
        }

        let later = t0() + Duration::hours(2);
        assert!(risk
            .check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), later)
            .is_ok());
        assert!(!risk.cooldown().in_cooldown);
        assert_eq!(risk.cooldown().consecutive_losses, 0);
    }

    #[test]
    fn test_break_even_trade_clears_cooldown() {
        let mut risk = manager();
        for i in 0..3 {
            risk.record_trade(loss(dec!(-10), t0() + Duration::minutes(i)));
        }
        assert!(risk.cooldown().in_cooldown);

        // A zero-P&L exit counts as a non-loss and lifts the cooldown immediately
        risk.record_trade(loss(Decimal::ZERO, t0() + Duration::minutes(3)));
        assert!(!risk.cooldown().in_cooldown);
        assert_eq!(risk.cooldown().consecutive_losses, 0);

        let now = t0() + Duration::minutes(5);
        assert!(risk
            .check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now)
            .is_ok());
    }

    #[test]
    fn test_entries_do_not_touch_pnl_or_streak() {
        let mut risk = manager();
        risk.record_trade(loss(dec!(-10), t0()));
        risk.record_trade(
            TradeRecord::entry(SYMBOL, Side::Buy, dec!(1), dec!(100), Some(dec!(98)))
                .at(t0() + Duration::minutes(1)),
        );

        assert_eq!(risk.cooldown().consecutive_losses, 1);
        assert_eq!(risk.capital(), dec!(9990));
        assert_eq!(risk.trades().len(), 2);
    }

    #[test]
    fn test_min_trade_interval() {
        let mut risk = manager();
        risk.record_trade(TradeRecord::entry(SYMBOL, Side::Buy, dec!(1), dec!(100), None).at(t0()));

        let result = risk.check_trade_allowed_at(
            SYMBOL,
            Side::Buy,
            dec!(1),
            dec!(100),
            t0() + Duration::seconds(30),
        );
        assert!(matches!(
            result,
            Err(RiskRejection::TradeTooSoon {
                elapsed_secs: 30,
                ..
            })
        ));
    }

    #[test]
    fn test_hourly_trade_cap() {
        let mut risk = manager();
        for i in 0..5 {
            risk.record_trade(
                TradeRecord::entry(SYMBOL, Side::Buy, dec!(1), dec!(100), None)
                    .at(t0() + Duration::minutes(i * 2)),
            );
        }

        let now = t0() + Duration::minutes(30);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now);
        assert!(matches!(
            result,
            Err(RiskRejection::HourlyTradeLimit { count: 5, max: 5 })
        ));

        // Window slides: all five are older than an hour
        let later = t0() + Duration::minutes(70);
        assert!(risk
            .check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), later)
            .is_ok());
    }

    #[test]
    fn test_daily_trade_cap() {
        let limits = RiskLimits {
            max_daily_trades: 3,
            ..roomy_limits()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);
        for i in 0..3 {
            risk.record_trade(
                TradeRecord::entry(SYMBOL, Side::Buy, dec!(1), dec!(100), None)
                    .at(t0() + Duration::hours(i * 2)),
            );
        }

        let now = t0() + Duration::hours(7);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now);
        assert!(matches!(result, Err(RiskRejection::DailyTradeLimit { .. })));
    }

    #[test]
    fn test_size_and_value_caps() {
        let limits = RiskLimits {
            max_position_size: dec!(2),
            max_position_value: dec!(150),
            ..Default::default()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);

        let too_big = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(3), dec!(10), t0());
        assert!(matches!(too_big, Err(RiskRejection::SizeTooLarge { .. })));

        let too_valuable = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(2), dec!(100), t0());
        assert!(matches!(
            too_valuable,
            Err(RiskRejection::ValueTooLarge { .. })
        ));
    }

    #[test]
    fn test_total_position_ratio_applies_to_buys() {
        let limits = RiskLimits {
            max_total_position: dec!(0.5),
            ..roomy_limits()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);
        risk.update_exposure("ETH/USDT", dec!(4000));

        let buy = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(20), dec!(100), t0());
        assert!(matches!(buy, Err(RiskRejection::TotalPositionLimit { .. })));

        let sell = risk.check_trade_allowed_at(SYMBOL, Side::Sell, dec!(20), dec!(100), t0());
        assert!(sell.is_ok());
    }

    #[test]
    fn test_daily_loss_circuit_breaker() {
        let limits = RiskLimits {
            max_consecutive_losses: 10,
            ..roomy_limits()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);
        risk.roll_periods(t0());
        risk.record_trade(loss(dec!(-500), t0()));

        let now = t0() + Duration::minutes(5);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now);
        assert!(matches!(result, Err(RiskRejection::DailyLossLimit { .. })));
    }

    #[test]
    fn test_daily_loss_resets_next_day() {
        let limits = RiskLimits {
            max_consecutive_losses: 10,
            max_weekly_loss: dec!(0.5),
            ..roomy_limits()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);
        risk.roll_periods(t0());
        risk.record_trade(loss(dec!(-500), t0()));

        let tomorrow = t0() + Duration::days(1);
        assert!(risk
            .check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), tomorrow)
            .is_ok());
        assert_eq!(risk.daily_pnl(), Decimal::ZERO);
        // Same ISO week: weekly P&L keeps the loss
        assert_eq!(risk.weekly_pnl(), dec!(-500));
    }

    #[test]
    fn test_weekly_loss_cap() {
        let limits = RiskLimits {
            max_consecutive_losses: 10,
            max_daily_loss: dec!(0.5),
            ..roomy_limits()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);
        risk.roll_periods(t0());
        risk.record_trade(loss(dec!(-600), t0()));
        risk.record_trade(loss(dec!(-500), t0() + Duration::days(1)));

        let now = t0() + Duration::days(1) + Duration::minutes(5);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now);
        assert!(matches!(result, Err(RiskRejection::WeeklyLossLimit { .. })));
    }

    #[test]
    fn test_insufficient_capital() {
        let limits = RiskLimits {
            max_total_position: dec!(2.0),
            ..roomy_limits()
        };
        let mut risk = RiskManager::new(dec!(10000), limits);
        risk.update_exposure("ETH/USDT", dec!(9500));

        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(10), dec!(100), t0());
        assert_eq!(
            result,
            Err(RiskRejection::InsufficientCapital {
                required: dec!(1000),
                available: dec!(500),
            })
        );
    }

    #[test]
    fn test_check_order_cooldown_before_interval() {
        let mut risk = manager();
        for i in 0..3 {
            risk.record_trade(loss(dec!(-10), t0() + Duration::seconds(i)));
        }
        // Both cooldown and min interval fail; cooldown is reported
        let now = t0() + Duration::seconds(5);
        let result = risk.check_trade_allowed_at(SYMBOL, Side::Buy, dec!(1), dec!(100), now);
        assert!(matches!(result, Err(RiskRejection::Cooldown { .. })));
    }

    #[test]
    fn test_capital_tracks_realized_pnl() {
        let mut risk = manager();
        risk.record_trade(loss(dec!(150), t0()));
        risk.record_trade(loss(dec!(-50), t0() + Duration::minutes(1)));
        risk.record_trade(loss(dec!(25.5), t0() + Duration::minutes(2)));

        assert_eq!(risk.capital(), dec!(10125.5));
        assert_eq!(risk.total_pnl(), dec!(125.5));
        assert_eq!(risk.capital(), risk.initial_capital() + risk.total_pnl());
    }

    #[test]
    fn test_exposure_ledger() {
        let mut risk = manager();
        risk.update_exposure(SYMBOL, dec!(500));
        risk.update_exposure("ETH/USDT", dec!(250));
        assert_eq!(risk.total_exposure(), dec!(750));

        risk.update_exposure(SYMBOL, Decimal::ZERO);
        assert_eq!(risk.exposure(SYMBOL), Decimal::ZERO);
        assert_eq!(risk.total_exposure(), dec!(250));
    }

    #[test]
    fn test_statistics_and_report() {
        let mut risk = manager();
        risk.record_trade(loss(dec!(100), t0()));
        risk.record_trade(loss(dec!(-50), t0() + Duration::minutes(1)));
        risk.update_exposure(SYMBOL, dec!(1005));

        let stats = risk.get_statistics_at(t0() + Duration::minutes(2));
        assert_eq!(stats.capital.current, dec!(10050));
        assert_eq!(stats.capital.total_return, dec!(0.005));
        assert_eq!(stats.trades.wins, 1);
        assert_eq!(stats.trades.losses, 1);
        assert_eq!(stats.trades.win_rate, dec!(0.5));
        assert_eq!(stats.positions.exposure_ratio, dec!(0.1));
        assert!(!stats.risk.in_cooldown);

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("pnl").is_some());

        let report = risk.report();
        assert!(report.contains("Risk Report"));
        assert!(report.contains("ACTIVE"));
    }
}
