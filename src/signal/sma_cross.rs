//! Moving-average crossover reference strategy

use super::{Signal, SignalSource, Sizing};
use crate::exchange::{Candle, Ticker};
use rust_decimal::Decimal;

/// Buys when the fast SMA crosses above the slow SMA, sells on the reverse
#[derive(Debug, Clone)]
pub struct SmaCrossSource {
    fast: usize,
    slow: usize,
    stop_pct: Option<Decimal>,
    /// (distance from entry, close ratio) per take-profit stage
    take_profits: Vec<(Decimal, Decimal)>,
}

impl SmaCrossSource {
    pub fn new(fast: usize, slow: usize) -> anyhow::Result<Self> {
        if fast == 0 || fast >= slow {
            anyhow::bail!("fast period must be positive and below slow ({fast} / {slow})");
        }
        Ok(Self {
            fast,
            slow,
            stop_pct: None,
            take_profits: Vec::new(),
        })
    }

    /// Attach a stop at `pct` from entry; otherwise the risk default applies
    pub fn with_stop_pct(mut self, pct: Decimal) -> Self {
        self.stop_pct = Some(pct);
        self
    }

    /// Add a take-profit stage `pct` from entry closing `close_ratio` of the position
    pub fn with_take_profit(mut self, pct: Decimal, close_ratio: Decimal) -> Self {
        self.take_profits.push((pct, close_ratio));
        self
    }

    fn entry(&self, buy: bool, price: Decimal, reason: String) -> Signal {
        let sign = if buy { Decimal::ONE } else { -Decimal::ONE };
        let mut signal = if buy {
            Signal::buy(price, Sizing::Ratio(Decimal::ONE), reason)
        } else {
            Signal::sell(price, Sizing::Ratio(Decimal::ONE), reason)
        };

        if let Some(pct) = self.stop_pct {
            signal = signal.with_stop_loss(price * (Decimal::ONE - sign * pct));
        }
        for (pct, ratio) in &self.take_profits {
            signal = signal.with_take_profit(price * (Decimal::ONE + sign * pct), *ratio);
        }
        signal
    }
}

fn sma(closes: &[Decimal]) -> Decimal {
    closes.iter().sum::<Decimal>() / Decimal::from(closes.len())
}

impl SignalSource for SmaCrossSource {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn min_candles(&self) -> usize {
        self.slow + 1
    }

    fn analyze(&self, candles: &[Candle], ticker: Option<&Ticker>) -> anyhow::Result<Signal> {
        if candles.len() < self.min_candles() {
            anyhow::bail!("need {} candles, got {}", self.min_candles(), candles.len());
        }

        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let n = closes.len();
        let fast_now = sma(&closes[n - self.fast..]);
        let slow_now = sma(&closes[n - self.slow..]);
        let fast_prev = sma(&closes[n - 1 - self.fast..n - 1]);
        let slow_prev = sma(&closes[n - 1 - self.slow..n - 1]);

        let price = ticker.map(|t| t.last).unwrap_or(closes[n - 1]);

        let signal = if fast_prev <= slow_prev && fast_now > slow_now {
            self.entry(
                true,
                price,
                format!("SMA{} crossed above SMA{}", self.fast, self.slow),
            )
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            self.entry(
                false,
                price,
                format!("SMA{} crossed below SMA{}", self.fast, self.slow),
            )
        } else {
            Signal::hold(price, "no crossover")
        };

        Ok(signal
            .with_metadata(
                "fast_sma",
                serde_json::json!(fast_now.round_dp(8).to_string()),
            )
            .with_metadata(
                "slow_sma",
                serde_json::json!(slow_now.round_dp(8).to_string()),
            ))
    }
}
