//! Trading bot: the fixed-interval decision loop

use super::{BotStatus, IterationOutcome};
use crate::config::{BotConfig, Config};
use crate::exchange::{ExchangeClient, Side, StreamKind};
use crate::execution::{CloseSummary, ExecutionEngine, ExitReason};
use crate::feed::{FeedObserver, MarketDataFeed, MarketUpdate};
use crate::risk::{RiskManager, TradeRecord};
use crate::signal::{Signal, SignalSource, Sizing};
use crate::telemetry::{increment, record_latency, CounterMetric, LatencyMetric};
use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Order sizes are truncated to this many decimal places
const SIZE_DECIMALS: u32 = 8;

/// Feeds every ticker into the engine so protective exits fire between iterations
struct PositionMarker {
    engine: Arc<ExecutionEngine>,
}

#[async_trait]
impl FeedObserver for PositionMarker {
    fn name(&self) -> &str {
        "position_marker"
    }

    async fn on_update(&self, symbol: &str, update: &MarketUpdate) -> anyhow::Result<()> {
        if let MarketUpdate::Ticker(ticker) = update {
            self.engine.on_price(symbol, ticker.last).await?;
        }
        Ok(())
    }
}

/// Single-symbol trading bot
pub struct TradingBot {
    config: BotConfig,
    feed: Arc<MarketDataFeed>,
    risk: Arc<RwLock<RiskManager>>,
    engine: Arc<ExecutionEngine>,
    source: Arc<dyn SignalSource>,
    closes: Mutex<broadcast::Receiver<CloseSummary>>,
    task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl TradingBot {
    pub fn new(
        config: &Config,
        client: Arc<dyn ExchangeClient>,
        source: Arc<dyn SignalSource>,
    ) -> Self {
        let feed = Arc::new(MarketDataFeed::new(client.clone(), config.feed.clone()));
        let risk = RiskManager::new(config.risk.initial_capital, config.risk.limits.clone());
        let engine = Arc::new(ExecutionEngine::new(client, config.execution.clone()));
        let closes = engine.subscribe_closes();

        Self {
            config: config.bot.clone(),
            feed,
            risk: Arc::new(RwLock::new(risk)),
            engine,
            source,
            closes: Mutex::new(closes),
            task: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn feed(&self) -> &Arc<MarketDataFeed> {
        &self.feed
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn risk(&self) -> &Arc<RwLock<RiskManager>> {
        &self.risk
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe the market data and spawn the decision loop
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let candle_limit = self.feed.candle_limit();
        if self.source.min_candles() > candle_limit {
            anyhow::bail!(
                "signal source {} needs {} candles but the feed keeps {}",
                self.source.name(),
                self.source.min_candles(),
                candle_limit
            );
        }
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!(symbol = %self.config.symbol, "Trading bot already running");
            return Ok(());
        }

        let symbol = self.config.symbol.as_str();
        let marker: Arc<dyn FeedObserver> = Arc::new(PositionMarker {
            engine: self.engine.clone(),
        });
        self.feed
            .subscribe(symbol, StreamKind::Ticker, Some(marker))
            .await;
        self.feed.subscribe(symbol, StreamKind::Candles, None).await;

        let bot = Arc::clone(self);
        let handle = tokio::spawn(async move { bot.run_loop().await });
        *self.task.lock().await = Some(handle);

        tracing::info!(
            %symbol,
            strategy = self.source.name(),
            interval_secs = self.config.interval_secs,
            "Trading bot started"
        );
        Ok(())
    }

    /// Cancel the loop, stop the feed and cancel open orders
    ///
    /// Safe to call repeatedly and without a prior `start`.
    pub async fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Decision loop terminated abnormally");
                }
            }
        }

        self.feed.stop().await;
        self.engine.close().await;
        self.sync_closes().await;

        if was_running {
            tracing::info!(symbol = %self.config.symbol, "Trading bot stopped");
        }
    }

    async fn run_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Wakes the loop on exits fired between iterations; the events
        // themselves are drained from the shared receiver
        let mut exits = self.engine.subscribe_closes();
        let mut exits_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_iteration().await {
                        Ok(outcome) => log_outcome(&self.config.symbol, &outcome),
                        Err(e) => {
                            increment(CounterMetric::IterationErrors);
                            tracing::error!(
                                symbol = %self.config.symbol,
                                error = %format!("{e:#}"),
                                retry_in_secs = self.config.error_delay_secs,
                                "Iteration failed"
                            );
                            tokio::time::sleep(self.config.error_delay()).await;
                        }
                    }
                }
                event = exits.recv(), if exits_open => match event {
                    Ok(_) | Err(RecvError::Lagged(_)) => self.sync_closes().await,
                    Err(RecvError::Closed) => exits_open = false,
                },
            }
        }
    }

    /// One decision step: refresh positions, ask the signal source, act
    pub async fn run_iteration(&self) -> anyhow::Result<IterationOutcome> {
        let symbol = self.config.symbol.as_str();

        self.engine.update_positions().await;
        self.sync_closes().await;

        let candles = self.feed.candles(symbol).await;
        let needed = self.source.min_candles();
        if candles.len() < needed {
            return Ok(IterationOutcome::Skipped(format!(
                "waiting for candles ({}/{needed})",
                candles.len()
            )));
        }

        let ticker = self.feed.ticker(symbol).await;
        let started = Instant::now();
        let signal = self
            .source
            .analyze(&candles, ticker.as_ref())
            .with_context(|| format!("signal source {} failed", self.source.name()))?;
        record_latency(LatencyMetric::SignalGeneration, started.elapsed());

        let Some(side) = signal.side() else {
            return Ok(IterationOutcome::Hold);
        };
        tracing::debug!(%symbol, %side, price = %signal.price, reason = %signal.reason, "Signal received");

        if let Some(position) = self.engine.position(symbol).await {
            if position.side.entry_side() == side {
                return Ok(IterationOutcome::Rejected(format!(
                    "{} position already open for {symbol}",
                    position.side
                )));
            }
            if !self.config.close_on_opposite_signal {
                return Ok(IterationOutcome::Rejected(format!(
                    "opposite {} position open for {symbol}",
                    position.side
                )));
            }

            let summary = self
                .engine
                .close_position(symbol, ExitReason::Signal)
                .await?;
            self.sync_closes().await;
            return Ok(IterationOutcome::Exited(summary));
        }

        self.enter(symbol, side, &signal).await
    }

    async fn enter(
        &self,
        symbol: &str,
        side: Side,
        signal: &Signal,
    ) -> anyhow::Result<IterationOutcome> {
        let price = signal.price;
        if price <= Decimal::ZERO {
            tracing::warn!(%symbol, %price, "Signal without a usable price, skipping");
            return Ok(IterationOutcome::Skipped(format!(
                "invalid signal price {price}"
            )));
        }

        let (stop, size) = {
            let risk = self.risk.read().await;
            let stop = signal
                .stop_loss
                .unwrap_or_else(|| risk.default_stop_loss(price, side));
            let size = match signal.sizing {
                Sizing::Amount(amount) => amount,
                Sizing::Ratio(ratio) => {
                    risk.calculate_position_size(price, stop, self.config.risk_per_trade * ratio)
                }
            };
            (
                stop,
                size.round_dp_with_strategy(SIZE_DECIMALS, RoundingStrategy::ToZero),
            )
        };

        let stop_misplaced = match side {
            Side::Buy => stop >= price,
            Side::Sell => stop <= price,
        };
        if stop_misplaced {
            tracing::warn!(%symbol, %side, %stop, %price, "Stop on the wrong side of entry, skipping");
            return Ok(IterationOutcome::Skipped(format!(
                "stop {stop} on the wrong side of {price}"
            )));
        }
        if size <= Decimal::ZERO {
            tracing::warn!(%symbol, %side, %price, %stop, "Computed position size is zero, skipping");
            return Ok(IterationOutcome::Skipped("zero position size".to_string()));
        }

        let admission = self
            .risk
            .write()
            .await
            .check_trade_allowed(symbol, side, size, price);
        if let Err(rejection) = admission {
            increment(CounterMetric::TradesRejected);
            tracing::info!(%symbol, %side, %size, reason = %rejection, "Trade rejected");
            return Ok(IterationOutcome::Rejected(rejection.to_string()));
        }

        let ack = self.engine.execute_market_order(symbol, side, size).await?;
        let filled = if ack.filled > Decimal::ZERO {
            ack.filled
        } else {
            size
        };
        {
            let mut risk = self.risk.write().await;
            risk.record_trade(TradeRecord::entry(
                symbol,
                side,
                filled,
                ack.price,
                Some(stop),
            ));
            risk.update_exposure(symbol, filled * ack.price);
        }

        self.protect(symbol, side, ack.price, stop, signal).await;

        tracing::info!(
            %symbol,
            %side,
            amount = %filled,
            price = %ack.price,
            %stop,
            reason = %signal.reason,
            "Position entered"
        );
        Ok(IterationOutcome::Entered {
            side,
            amount: filled,
            price: ack.price,
        })
    }

    /// Attach stop, targets and trailing stop; failures leave the position open
    async fn protect(
        &self,
        symbol: &str,
        side: Side,
        entry: Decimal,
        stop: Decimal,
        signal: &Signal,
    ) {
        if let Err(e) = self.engine.set_stop_loss(symbol, stop).await {
            tracing::error!(%symbol, %stop, error = %e, "Failed to place stop loss");
        }

        let levels: Vec<(Decimal, Decimal)> = if signal.take_profit_levels.is_empty() {
            let target = self.risk.read().await.default_take_profit(entry, side);
            vec![(target, Decimal::ONE)]
        } else {
            signal
                .take_profit_levels
                .iter()
                .filter(|level| !level.triggered)
                .map(|level| (level.price, level.close_ratio))
                .collect()
        };
        for (target, ratio) in levels {
            if let Err(e) = self.engine.set_take_profit(symbol, target, ratio).await {
                tracing::warn!(%symbol, %target, error = %e, "Failed to place take profit");
            }
        }

        if let Some(distance) = self.config.trailing_stop_pct {
            if let Err(e) = self.engine.set_trailing_stop(symbol, distance).await {
                tracing::warn!(%symbol, %distance, error = %e, "Failed to arm trailing stop");
            }
        }
    }

    /// Record every close event already queued
    async fn sync_closes(&self) {
        let pending = {
            let mut closes = self.closes.lock().await;
            let mut pending = Vec::new();
            loop {
                match closes.try_recv() {
                    Ok(summary) => pending.push(summary),
                    Err(TryRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Close events dropped before recording");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            pending
        };

        for summary in &pending {
            self.record_close(summary).await;
        }
    }

    async fn record_close(&self, summary: &CloseSummary) {
        let mut risk = self.risk.write().await;
        risk.record_trade(
            TradeRecord::exit(
                &summary.symbol,
                summary.side.exit_side(),
                summary.amount,
                summary.exit_price,
                summary.realized_pnl,
            )
            .at(summary.timestamp),
        );
        risk.update_exposure(&summary.symbol, summary.remaining * summary.exit_price);
    }

    pub async fn get_status(&self) -> BotStatus {
        BotStatus {
            running: self.is_running(),
            symbol: self.config.symbol.clone(),
            positions: self.engine.positions().await,
            statistics: self.risk.read().await.get_statistics(),
            execution: self.engine.statistics().await,
        }
    }

    /// Risk report followed by execution counters and open positions
    pub async fn report(&self) -> String {
        let mut out = self.risk.read().await.report();
        let execution = self.engine.statistics().await;

        let _ = writeln!(out, "=== Execution ===");
        let _ = writeln!(
            out,
            "Orders:         {} submitted, {} failed, {} active",
            execution.orders_submitted, execution.orders_failed, execution.active_orders
        );
        let _ = writeln!(
            out,
            "Exits:          {} ({} wins / {} losses), realized {}",
            execution.total_trades,
            execution.winning_trades,
            execution.losing_trades,
            execution.total_pnl.round_dp(2)
        );
        for position in self.engine.positions().await {
            let _ = writeln!(
                out,
                "Position:       {} {} {} @ {} (unrealized {})",
                position.symbol,
                position.side,
                position.size,
                position.entry_price.round_dp(2),
                position.unrealized_pnl.round_dp(2)
            );
        }
        out
    }
}

fn log_outcome(symbol: &str, outcome: &IterationOutcome) {
    match outcome {
        IterationOutcome::Skipped(reason) => tracing::debug!(%symbol, %reason, "Iteration skipped"),
        IterationOutcome::Hold => tracing::debug!(%symbol, "Holding"),
        IterationOutcome::Rejected(reason) => {
            tracing::info!(%symbol, %reason, "Signal not acted on")
        }
        IterationOutcome::Entered {
            side,
            amount,
            price,
        } => {
            tracing::debug!(%symbol, %side, %amount, %price, "Iteration entered a position")
        }
        IterationOutcome::Exited(summary) => {
            tracing::debug!(%symbol, pnl = %summary.realized_pnl, "Iteration exited a position")
        }
    }
}
