//! Run command implementation

use crate::config::Config;
use crate::exchange::{PaperExchange, RandomWalk};
use crate::orchestrator::TradingBot;
use crate::signal::SmaCrossSource;
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Starting price of the synthetic walk
    #[arg(long, default_value = "100")]
    pub start_price: Decimal,

    /// Max relative move per walk step
    #[arg(long, default_value = "0.002")]
    pub step_pct: f64,

    /// Milliseconds between walk steps
    #[arg(long, default_value = "500")]
    pub step_ms: u64,

    /// Fast SMA period
    #[arg(long, default_value = "5")]
    pub fast: usize,

    /// Slow SMA period
    #[arg(long, default_value = "20")]
    pub slow: usize,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let exchange = Arc::new(PaperExchange::new(config.feed.timeframe));
        let walk = RandomWalk {
            symbol: config.bot.symbol.clone(),
            start_price: self.start_price,
            step_pct: self.step_pct,
            interval: Duration::from_millis(self.step_ms),
        }
        .spawn(exchange.clone());

        let source = Arc::new(SmaCrossSource::new(self.fast, self.slow)?);
        let bot = Arc::new(TradingBot::new(&config, exchange, source));
        bot.start().await?;

        match self.duration_secs {
            Some(secs) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                        tracing::info!(secs, "Run duration elapsed");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupt received");
                    }
                }
            }
            None => {
                tokio::signal::ctrl_c().await?;
                tracing::info!("Interrupt received");
            }
        }

        bot.stop().await;
        walk.abort();

        println!("{}", bot.report().await);
        Ok(())
    }
}
