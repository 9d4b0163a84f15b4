//! Order execution and position lifecycle

use super::{
    ActiveOrder, CloseSummary, ExecutionError, ExecutionStats, ExitReason, Position, PositionSide,
    TrailingStop, Trigger,
};
use crate::config::ExecutionConfig;
use crate::exchange::{ExchangeClient, ExchangeError, OrderAck, OrderRequest, OrderType, Side};
use crate::signal::TakeProfitLevel;
use crate::telemetry::{
    increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};

const CLOSE_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct EngineState {
    positions: HashMap<String, Position>,
    active_orders: HashMap<String, ActiveOrder>,
    last_prices: HashMap<String, Decimal>,
    stats: ExecutionStats,
    day: Option<NaiveDate>,
}

impl EngineState {
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.stats.daily_realized = Decimal::ZERO;
        }
    }

    fn book(&mut self, pnl: Decimal) {
        self.roll_day(Utc::now());
        self.stats.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.stats.winning_trades += 1;
        } else if pnl < Decimal::ZERO {
            self.stats.losing_trades += 1;
        }
        self.stats.total_pnl += pnl;
        self.stats.daily_realized += pnl;
    }

    fn track(&mut self, ack: &OrderAck) {
        self.active_orders.insert(
            ack.id.clone(),
            ActiveOrder {
                id: ack.id.clone(),
                symbol: ack.symbol.clone(),
                side: ack.side,
                order_type: ack.order_type,
                amount: ack.amount,
                price: ack.price,
                created_at: ack.timestamp,
            },
        );
    }
}

/// Submits orders, owns positions and their protective orders
///
/// Every operation holds the state lock from validation through the exchange
/// call to the position update, so concurrent callers never interleave on a
/// position.
pub struct ExecutionEngine {
    client: Arc<dyn ExchangeClient>,
    config: ExecutionConfig,
    state: Mutex<EngineState>,
    closes: broadcast::Sender<CloseSummary>,
}

impl ExecutionEngine {
    pub fn new(client: Arc<dyn ExchangeClient>, config: ExecutionConfig) -> Self {
        let (closes, _) = broadcast::channel(CLOSE_CHANNEL_CAPACITY);
        Self {
            client,
            config,
            state: Mutex::new(EngineState::default()),
            closes,
        }
    }

    /// Receive every full or partial exit
    pub fn subscribe_closes(&self) -> broadcast::Receiver<CloseSummary> {
        self.closes.subscribe()
    }

    /// Submit a market order and apply the fill to the symbol's position
    ///
    /// Same-side fills grow the position at a weighted-average entry;
    /// opposite-side fills reduce it and book the realized P&L. Orders larger
    /// than the held size on the opposite side are refused.
    pub async fn execute_market_order(
        &self,
        symbol: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<OrderAck, ExecutionError> {
        let mut state = self.state.lock().await;

        if let Err(e) = self.guard(&mut state, symbol, side, amount) {
            state.stats.orders_failed += 1;
            increment(CounterMetric::OrdersFailed);
            tracing::warn!(%symbol, %side, %amount, error = %e, "Order refused by engine guard");
            return Err(e);
        }

        let ack = self.submit_market(&mut state, symbol, side, amount).await?;
        let filled = filled_amount(&ack, amount);
        let price = ack.price;

        let held = state.positions.get(symbol).map(|p| p.side);
        match held {
            None => {
                let position = Position::new(
                    symbol,
                    PositionSide::from_entry(side),
                    filled,
                    price,
                    ack.timestamp,
                );
                tracing::info!(%symbol, side = %position.side, size = %filled, %price, "Position opened");
                state.positions.insert(symbol.to_string(), position);
            }
            Some(held) if held.entry_side() == side => {
                if let Some(position) = state.positions.get_mut(symbol) {
                    position.add(filled, price);
                    tracing::info!(
                        %symbol,
                        size = %position.size,
                        entry = %position.entry_price,
                        "Position increased"
                    );
                }
                self.resize_protective(&mut state, symbol).await;
            }
            Some(_) => {
                if let Some(summary) =
                    self.book_exit(&mut state, symbol, filled, price, ExitReason::Manual)
                {
                    if summary.is_full() {
                        self.cancel_protective(&mut state, symbol).await;
                    } else {
                        self.resize_protective(&mut state, symbol).await;
                    }
                    self.publish(&state, &summary);
                }
            }
        }

        set_gauge(GaugeMetric::OpenPositions, state.positions.len() as f64);
        Ok(ack)
    }

    /// Submit a resting limit order and track it until cancelled
    pub async fn execute_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, ExecutionError> {
        if amount <= Decimal::ZERO {
            return Err(ExecutionError::InvalidAmount(amount));
        }
        if amount > self.config.max_order_size {
            return Err(ExecutionError::OrderTooLarge {
                amount,
                max: self.config.max_order_size,
            });
        }
        if price <= Decimal::ZERO {
            return Err(ExecutionError::InvalidLevel(format!("limit price {price}")));
        }

        let mut state = self.state.lock().await;
        let result = self
            .client
            .create_limit_order(symbol, side, amount, price)
            .await;
        let ack = self.note_submission(&mut state, symbol, result)?;
        state.track(&ack);

        tracing::info!(order_id = %ack.id, %symbol, %side, %amount, %price, "Limit order placed");
        Ok(ack)
    }

    /// Place (or replace) the exchange stop for the whole position
    pub async fn set_stop_loss(
        &self,
        symbol: &str,
        price: Decimal,
    ) -> Result<OrderAck, ExecutionError> {
        if price <= Decimal::ZERO {
            return Err(ExecutionError::InvalidLevel(format!("stop price {price}")));
        }

        let mut state = self.state.lock().await;
        let (side, size) = position_info(&state, symbol)?;

        self.cancel_where(&mut state, |o| {
            o.symbol == symbol && o.order_type == OrderType::StopLoss
        })
        .await;

        let request = OrderRequest::stop_loss(symbol, side.exit_side(), size, price);
        let result = self.client.create_order(&request).await;
        let ack = self.note_submission(&mut state, symbol, result)?;
        state.track(&ack);

        if let Some(position) = state.positions.get_mut(symbol) {
            position.stop_loss = Some(price);
        }
        tracing::info!(%symbol, stop = %price, order_id = %ack.id, "Stop loss set");
        Ok(ack)
    }

    /// Add a take-profit stage closing `close_ratio` of the initial size
    pub async fn set_take_profit(
        &self,
        symbol: &str,
        price: Decimal,
        close_ratio: Decimal,
    ) -> Result<OrderAck, ExecutionError> {
        if price <= Decimal::ZERO {
            return Err(ExecutionError::InvalidLevel(format!(
                "target price {price}"
            )));
        }
        if close_ratio <= Decimal::ZERO || close_ratio > Decimal::ONE {
            return Err(ExecutionError::InvalidLevel(format!(
                "close ratio {close_ratio}"
            )));
        }

        let mut state = self.state.lock().await;
        let (side, size) = position_info(&state, symbol)?;
        let initial = state
            .positions
            .get(symbol)
            .map(|p| p.initial_size)
            .unwrap_or(size);
        let amount = (initial * close_ratio).min(size);

        let request = OrderRequest::take_profit(symbol, side.exit_side(), amount, price);
        let result = self.client.create_order(&request).await;
        let ack = self.note_submission(&mut state, symbol, result)?;
        state.track(&ack);

        if let Some(position) = state.positions.get_mut(symbol) {
            position.add_take_profit_level(
                TakeProfitLevel::new(price, close_ratio).with_order_id(ack.id.clone()),
            );
        }
        tracing::info!(%symbol, target = %price, %close_ratio, order_id = %ack.id, "Take profit set");
        Ok(ack)
    }

    /// Arm an engine-side trailing stop `distance` (fraction) from the current price
    ///
    /// Returns the initial stop price.
    pub async fn set_trailing_stop(
        &self,
        symbol: &str,
        distance: Decimal,
    ) -> Result<Decimal, ExecutionError> {
        if distance <= Decimal::ZERO || distance >= Decimal::ONE {
            return Err(ExecutionError::InvalidLevel(format!(
                "trailing distance {distance}"
            )));
        }

        let mut state = self.state.lock().await;
        let position = state
            .positions
            .get_mut(symbol)
            .ok_or_else(|| ExecutionError::NoPosition(symbol.to_string()))?;

        let trailing = TrailingStop::new(position.side, position.current_price, distance);
        position.trailing_stop = Some(trailing);

        tracing::info!(%symbol, %distance, stop = %trailing.stop_price, "Trailing stop armed");
        Ok(trailing.stop_price)
    }

    /// Close the full position at market
    pub async fn close_position(
        &self,
        symbol: &str,
        reason: ExitReason,
    ) -> Result<CloseSummary, ExecutionError> {
        let mut state = self.state.lock().await;
        self.exit(&mut state, symbol, None, reason).await
    }

    /// Refresh every open position from the exchange ticker and fire due triggers
    ///
    /// A symbol whose price cannot be fetched is skipped until the next call.
    pub async fn update_positions(&self) -> Vec<CloseSummary> {
        let symbols: Vec<String> = self.state.lock().await.positions.keys().cloned().collect();
        let mut closes = Vec::new();

        for symbol in symbols {
            let ticker = match self.client.fetch_ticker(&symbol).await {
                Ok(ticker) => ticker,
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "Failed to refresh position price");
                    continue;
                }
            };
            match self.on_price(&symbol, ticker.last).await {
                Ok(Some(summary)) => closes.push(summary),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(%symbol, error = %e, "Protective exit failed");
                }
            }
        }

        closes
    }

    /// Mark the position to `price` and fire at most one protective exit
    pub async fn on_price(
        &self,
        symbol: &str,
        price: Decimal,
    ) -> Result<Option<CloseSummary>, ExecutionError> {
        let mut state = self.state.lock().await;
        state.last_prices.insert(symbol.to_string(), price);

        let trigger = match state.positions.get_mut(symbol) {
            Some(position) => {
                position.mark(price);
                position.evaluate(price)
            }
            None => return Ok(None),
        };

        match trigger {
            Some(trigger) => self.fire(&mut state, symbol, trigger).await.map(Some),
            None => Ok(None),
        }
    }

    /// Cancel every tracked order; failures are logged and the orders forgotten
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let orders: Vec<ActiveOrder> = state.active_orders.drain().map(|(_, o)| o).collect();
        if orders.is_empty() {
            return;
        }

        let mut failed = 0usize;
        for order in &orders {
            if let Err(e) = self.client.cancel_order(&order.id, &order.symbol).await {
                failed += 1;
                tracing::warn!(
                    order_id = %order.id,
                    symbol = %order.symbol,
                    error = %e,
                    "Failed to cancel order on shutdown"
                );
            }
        }

        tracing::info!(
            cancelled = orders.len() - failed,
            failed,
            "Execution engine closed"
        );
    }

    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.state.lock().await.positions.get(symbol).cloned()
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.state
            .lock()
            .await
            .positions
            .values()
            .cloned()
            .collect()
    }

    pub async fn has_position(&self, symbol: &str) -> bool {
        self.state.lock().await.positions.contains_key(symbol)
    }

    pub async fn active_order_count(&self) -> usize {
        self.state.lock().await.active_orders.len()
    }

    pub async fn active_orders(&self) -> Vec<ActiveOrder> {
        self.state
            .lock()
            .await
            .active_orders
            .values()
            .cloned()
            .collect()
    }

    pub async fn statistics(&self) -> ExecutionStats {
        let state = self.state.lock().await;
        ExecutionStats {
            open_positions: state.positions.len(),
            active_orders: state.active_orders.len(),
            ..state.stats.clone()
        }
    }

    fn guard(
        &self,
        state: &mut EngineState,
        symbol: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<(), ExecutionError> {
        if amount <= Decimal::ZERO {
            return Err(ExecutionError::InvalidAmount(amount));
        }
        if amount > self.config.max_order_size {
            return Err(ExecutionError::OrderTooLarge {
                amount,
                max: self.config.max_order_size,
            });
        }

        if let Some(position) = state.positions.get(symbol) {
            if position.side.exit_side() == side {
                if amount > position.size {
                    return Err(ExecutionError::WouldFlip {
                        symbol: symbol.to_string(),
                        side: position.side,
                        held: position.size,
                        amount,
                    });
                }
                // Reductions are always allowed
                return Ok(());
            }
        }

        state.roll_day(Utc::now());
        if state.stats.daily_realized <= -self.config.max_daily_loss {
            return Err(ExecutionError::DailyLossLimit {
                realized: state.stats.daily_realized,
                limit: self.config.max_daily_loss,
            });
        }
        Ok(())
    }

    async fn submit_market(
        &self,
        state: &mut EngineState,
        symbol: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<OrderAck, ExecutionError> {
        let start = Instant::now();
        let result = self.client.create_market_order(symbol, side, amount).await;
        record_latency(LatencyMetric::OrderSubmission, start.elapsed());

        let ack = self.note_submission(state, symbol, result)?;
        self.check_slippage(state, symbol, &ack);
        state.last_prices.insert(symbol.to_string(), ack.price);
        Ok(ack)
    }

    fn note_submission(
        &self,
        state: &mut EngineState,
        symbol: &str,
        result: Result<OrderAck, ExchangeError>,
    ) -> Result<OrderAck, ExecutionError> {
        match result {
            Ok(ack) => {
                state.stats.orders_submitted += 1;
                increment(CounterMetric::OrdersSubmitted);
                Ok(ack)
            }
            Err(e) => {
                state.stats.orders_failed += 1;
                increment(CounterMetric::OrdersFailed);
                tracing::error!(%symbol, error = %e, "Order submission failed");
                Err(e.into())
            }
        }
    }

    fn check_slippage(&self, state: &EngineState, symbol: &str, ack: &OrderAck) {
        let Some(reference) = state.last_prices.get(symbol).copied() else {
            return;
        };
        if reference <= Decimal::ZERO {
            return;
        }
        let slippage = (ack.price - reference).abs() / reference;
        if slippage > self.config.max_slippage {
            tracing::warn!(
                %symbol,
                %reference,
                fill = %ack.price,
                slippage = %slippage.round_dp(6),
                max = %self.config.max_slippage,
                "Fill slippage above limit"
            );
        }
    }

    async fn fire(
        &self,
        state: &mut EngineState,
        symbol: &str,
        trigger: Trigger,
    ) -> Result<CloseSummary, ExecutionError> {
        match trigger {
            Trigger::StopLoss { price } => {
                tracing::warn!(%symbol, stop = %price, "Stop loss triggered");
                self.cancel_where(state, |o| {
                    o.symbol == symbol && o.order_type == OrderType::StopLoss
                })
                .await;
                self.exit(state, symbol, None, ExitReason::StopLoss).await
            }
            Trigger::TrailingStop { price } => {
                tracing::warn!(%symbol, stop = %price, "Trailing stop triggered");
                self.exit(state, symbol, None, ExitReason::TrailingStop)
                    .await
            }
            Trigger::TakeProfit { level, price, size } => {
                tracing::info!(%symbol, target = %price, %size, "Take profit triggered");
                let order_id = state
                    .positions
                    .get(symbol)
                    .and_then(|p| p.take_profit_levels.get(level))
                    .and_then(|l| l.order_id.clone());
                if let Some(order_id) = order_id {
                    self.cancel_where(state, |o| o.id == order_id).await;
                }
                let summary = self
                    .exit(state, symbol, Some(size), ExitReason::TakeProfit)
                    .await?;
                if let Some(position) = state.positions.get_mut(symbol) {
                    position.mark_level_triggered(level);
                }
                Ok(summary)
            }
        }
    }

    /// Market exit of `amount` (whole position when `None`)
    async fn exit(
        &self,
        state: &mut EngineState,
        symbol: &str,
        amount: Option<Decimal>,
        reason: ExitReason,
    ) -> Result<CloseSummary, ExecutionError> {
        let (side, size) = position_info(state, symbol)?;
        let amount = amount.unwrap_or(size).min(size);

        let ack = self
            .submit_market(state, symbol, side.exit_side(), amount)
            .await?;
        let filled = filled_amount(&ack, amount).min(size);

        let summary = self
            .book_exit(state, symbol, filled, ack.price, reason)
            .ok_or_else(|| ExecutionError::NoPosition(symbol.to_string()))?;
        if summary.is_full() {
            self.cancel_protective(state, symbol).await;
        } else {
            self.resize_protective(state, symbol).await;
        }
        self.publish(state, &summary);
        Ok(summary)
    }

    fn book_exit(
        &self,
        state: &mut EngineState,
        symbol: &str,
        amount: Decimal,
        price: Decimal,
        reason: ExitReason,
    ) -> Option<CloseSummary> {
        let position = state.positions.get_mut(symbol)?;
        let side = position.side;
        let entry_price = position.entry_price;
        let before = position.size;
        let pnl = position.reduce(amount, price);
        let remaining = position.size;

        if remaining.is_zero() {
            state.positions.remove(symbol);
        }
        state.book(pnl);

        Some(CloseSummary {
            symbol: symbol.to_string(),
            side,
            amount: before - remaining,
            entry_price,
            exit_price: price,
            realized_pnl: pnl,
            reason,
            remaining,
            timestamp: Utc::now(),
        })
    }

    async fn cancel_protective(&self, state: &mut EngineState, symbol: &str) {
        self.cancel_where(state, |o| {
            o.symbol == symbol
                && matches!(o.order_type, OrderType::StopLoss | OrderType::TakeProfit)
        })
        .await;
    }

    /// Re-place resting protective orders that no longer match the held size
    ///
    /// Stops always cover the whole position; targets are only shrunk.
    async fn resize_protective(&self, state: &mut EngineState, symbol: &str) {
        let Ok((side, size)) = position_info(state, symbol) else {
            return;
        };
        let stale: Vec<ActiveOrder> = state
            .active_orders
            .values()
            .filter(|o| o.symbol == symbol)
            .filter(|o| match o.order_type {
                OrderType::StopLoss => o.amount != size,
                OrderType::TakeProfit => o.amount > size,
                _ => false,
            })
            .cloned()
            .collect();

        for order in stale {
            self.cancel_where(state, |o| o.id == order.id).await;

            let request = if order.order_type == OrderType::StopLoss {
                OrderRequest::stop_loss(symbol, side.exit_side(), size, order.price)
            } else {
                OrderRequest::take_profit(symbol, side.exit_side(), size, order.price)
            };
            let result = self.client.create_order(&request).await;
            let ack = match self.note_submission(state, symbol, result) {
                Ok(ack) => ack,
                Err(e) => {
                    tracing::error!(
                        %symbol,
                        order_type = ?order.order_type,
                        price = %order.price,
                        error = %e,
                        "Failed to re-place protective order"
                    );
                    continue;
                }
            };
            state.track(&ack);

            if let Some(position) = state.positions.get_mut(symbol) {
                for level in &mut position.take_profit_levels {
                    if level.order_id.as_deref() == Some(order.id.as_str()) {
                        level.order_id = Some(ack.id.clone());
                    }
                }
            }
            tracing::info!(
                %symbol,
                order_type = ?order.order_type,
                old_amount = %order.amount,
                amount = %size,
                order_id = %ack.id,
                "Protective order resized"
            );
        }
    }

    /// Best-effort cancel of matching tracked orders
    async fn cancel_where<F>(&self, state: &mut EngineState, predicate: F)
    where
        F: Fn(&ActiveOrder) -> bool,
    {
        let ids: Vec<String> = state
            .active_orders
            .values()
            .filter(|o| predicate(*o))
            .map(|o| o.id.clone())
            .collect();

        for id in ids {
            let Some(order) = state.active_orders.remove(&id) else {
                continue;
            };
            match self.client.cancel_order(&order.id, &order.symbol).await {
                Ok(()) => {
                    tracing::debug!(order_id = %order.id, order_type = ?order.order_type, "Order cancelled")
                }
                Err(e) => tracing::warn!(
                    order_id = %order.id,
                    symbol = %order.symbol,
                    error = %e,
                    "Failed to cancel order"
                ),
            }
        }
    }

    fn publish(&self, state: &EngineState, summary: &CloseSummary) {
        increment(CounterMetric::PositionsClosed);
        set_gauge(GaugeMetric::OpenPositions, state.positions.len() as f64);
        tracing::info!(
            symbol = %summary.symbol,
            reason = %summary.reason,
            amount = %summary.amount,
            entry = %summary.entry_price,
            exit = %summary.exit_price,
            pnl = %summary.realized_pnl,
            remaining = %summary.remaining,
            "Position closed"
        );
        // No receivers is fine
        let _ = self.closes.send(summary.clone());
    }
}

fn position_info(
    state: &EngineState,
    symbol: &str,
) -> Result<(PositionSide, Decimal), ExecutionError> {
    state
        .positions
        .get(symbol)
        .map(|p| (p.side, p.size))
        .ok_or_else(|| ExecutionError::NoPosition(symbol.to_string()))
}

fn filled_amount(ack: &OrderAck, requested: Decimal) -> Decimal {
    if ack.filled > Decimal::ZERO {
        ack.filled
    } else {
        requested
    }
}
