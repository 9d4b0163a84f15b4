//! Admission limits

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk limits, loaded once from `[risk.limits]` and read-only afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Maximum units per trade
    pub max_position_size: Decimal,
    /// Maximum notional per trade (quote currency)
    pub max_position_value: Decimal,
    /// Maximum total exposure as a fraction of capital
    pub max_total_position: Decimal,
    /// Daily realized loss cap as a fraction of capital
    pub max_daily_loss: Decimal,
    /// Weekly realized loss cap as a fraction of capital
    pub max_weekly_loss: Decimal,
    /// Largest fraction of capital risked on one trade
    pub max_single_loss: Decimal,
    /// Trades allowed in the trailing 24 hours
    pub max_daily_trades: u32,
    /// Trades allowed in the trailing 60 minutes
    pub max_hourly_trades: u32,
    pub min_trade_interval_secs: u64,
    /// Losing trades in a row that trigger the cooldown
    pub max_consecutive_losses: u32,
    pub cooldown_after_losses_secs: u64,
    pub max_leverage: Decimal,
    pub max_slippage: Decimal,
    /// Stop distance used when a signal carries none
    pub default_stop_loss_pct: Decimal,
    /// Target distance used when a signal carries no take-profit levels
    pub default_take_profit_pct: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: dec!(1.0),
            max_position_value: dec!(5000),
            max_total_position: dec!(0.8),
            max_daily_loss: dec!(0.05),
            max_weekly_loss: dec!(0.10),
            max_single_loss: dec!(0.02),
            max_daily_trades: 20,
            max_hourly_trades: 5,
            min_trade_interval_secs: 60,
            max_consecutive_losses: 3,
            cooldown_after_losses_secs: 3600,
            max_leverage: dec!(1.0),
            max_slippage: dec!(0.005),
            default_stop_loss_pct: dec!(0.02),
            default_take_profit_pct: dec!(0.04),
        }
    }
}

/// Longest accepted cooldown or trade interval (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 3600;

impl RiskLimits {
    /// Cooldown after the loss streak, capped at [`MAX_WINDOW_SECS`]
    pub fn cooldown(&self) -> chrono::Duration {
        window(self.cooldown_after_losses_secs)
    }

    /// Minimum spacing between trades, capped at [`MAX_WINDOW_SECS`]
    pub fn min_trade_interval(&self) -> chrono::Duration {
        window(self.min_trade_interval_secs)
    }

    /// Reject caps that would block or disable admission entirely
    pub fn validate(&self) -> anyhow::Result<()> {
        let positive = [
            ("max_position_size", self.max_position_size),
            ("max_position_value", self.max_position_value),
            ("max_total_position", self.max_total_position),
            ("max_daily_loss", self.max_daily_loss),
            ("max_weekly_loss", self.max_weekly_loss),
            ("max_single_loss", self.max_single_loss),
            ("max_leverage", self.max_leverage),
            ("default_stop_loss_pct", self.default_stop_loss_pct),
            ("default_take_profit_pct", self.default_take_profit_pct),
        ];
        for (name, value) in positive {
            if value <= Decimal::ZERO {
                anyhow::bail!("risk.limits.{name} must be positive, got {value}");
            }
        }

        if self.max_daily_trades == 0 || self.max_hourly_trades == 0 {
            anyhow::bail!("risk.limits trade frequency caps must be positive");
        }
        if self.max_consecutive_losses == 0 {
            anyhow::bail!("risk.limits.max_consecutive_losses must be positive");
        }
        if self.default_stop_loss_pct >= Decimal::ONE {
            anyhow::bail!("risk.limits.default_stop_loss_pct must be below 1");
        }
        if self.max_slippage < Decimal::ZERO {
            anyhow::bail!("risk.limits.max_slippage must not be negative");
        }
        let windows = [
            ("cooldown_after_losses_secs", self.cooldown_after_losses_secs),
            ("min_trade_interval_secs", self.min_trade_interval_secs),
        ];
        for (name, secs) in windows {
            if secs > MAX_WINDOW_SECS {
                anyhow::bail!("risk.limits.{name} must be at most {MAX_WINDOW_SECS}, got {secs}");
            }
        }
        Ok(())
    }
}

fn window(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}
