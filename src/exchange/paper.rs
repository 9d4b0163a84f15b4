//! Paper trading venue with simulated fills

use super::{
    Candle, ExchangeClient, ExchangeError, MarketTrade, OrderAck, OrderBook, OrderRequest,
    OrderStatus, OrderType, PriceLevel, Side, Ticker, Timeframe,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

const MAX_CANDLES: usize = 500;
const MAX_TRADES: usize = 200;
/// Settled orders kept for inspection; open orders are never dropped
const MAX_SETTLED_ORDERS: usize = 500;
const SPREAD: Decimal = dec!(0.0005);

#[derive(Default)]
struct PaperState {
    prices: HashMap<String, Decimal>,
    candles: HashMap<String, Vec<Candle>>,
    trades: HashMap<String, Vec<MarketTrade>>,
    orders: HashMap<String, OrderAck>,
    reject_orders: u32,
    fail_fetches: u32,
    fail_cancels: bool,
}

impl PaperState {
    fn take_fetch_failure(&mut self) -> Result<(), ExchangeError> {
        if self.fail_fetches > 0 {
            self.fail_fetches -= 1;
            return Err(ExchangeError::Network(
                "simulated fetch failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Store an order, dropping the oldest settled ones past the cap
    fn record_order(&mut self, ack: &OrderAck) {
        self.orders.insert(ack.id.clone(), ack.clone());

        let mut settled: Vec<(DateTime<Utc>, String)> = self
            .orders
            .values()
            .filter(|o| o.status != OrderStatus::Open)
            .map(|o| (o.timestamp, o.id.clone()))
            .collect();
        if settled.len() <= MAX_SETTLED_ORDERS {
            return;
        }
        settled.sort();
        let excess = settled.len() - MAX_SETTLED_ORDERS;
        for (_, id) in settled.into_iter().take(excess) {
            self.orders.remove(&id);
        }
    }

    fn take_order_rejection(&mut self) -> Result<(), ExchangeError> {
        if self.reject_orders > 0 {
            self.reject_orders -= 1;
            return Err(ExchangeError::Rejected("simulated rejection".to_string()));
        }
        Ok(())
    }
}

/// In-memory exchange: market orders fill at the last set price, limit and
/// protective orders rest until cancelled
pub struct PaperExchange {
    timeframe: Timeframe,
    state: Arc<RwLock<PaperState>>,
}

impl PaperExchange {
    /// Create a new paper venue building candles of the given timeframe
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            state: Arc::new(RwLock::new(PaperState::default())),
        }
    }

    /// Set the last traded price now
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.set_price_at(symbol, price, Utc::now()).await;
    }

    /// Set the last traded price and fold it into the candle for `at`
    pub async fn set_price_at(&self, symbol: &str, price: Decimal, at: DateTime<Utc>) {
        let bucket_secs = self.timeframe.duration().as_secs() as i64;
        let open_secs = at.timestamp() - at.timestamp().rem_euclid(bucket_secs);
        let open_time = Utc.timestamp_opt(open_secs, 0).single().unwrap_or(at);

        let mut state = self.state.write().await;
        state.prices.insert(symbol.to_string(), price);

        let candles = state.candles.entry(symbol.to_string()).or_default();
        match candles.last_mut() {
            Some(last) if last.timestamp == open_time => {
                last.high = last.high.max(price);
                last.low = last.low.min(price);
                last.close = price;
            }
            _ => {
                candles.push(Candle {
                    timestamp: open_time,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: Decimal::ZERO,
                });
                if candles.len() > MAX_CANDLES {
                    candles.remove(0);
                }
            }
        }
    }

    /// Append a complete candle and move the last price to its close
    pub async fn push_candle(&self, symbol: &str, candle: Candle) {
        let mut state = self.state.write().await;
        state.prices.insert(symbol.to_string(), candle.close);
        let candles = state.candles.entry(symbol.to_string()).or_default();
        candles.push(candle);
        if candles.len() > MAX_CANDLES {
            candles.remove(0);
        }
    }

    /// Reject the next `n` order submissions
    pub async fn reject_next_orders(&self, n: u32) {
        self.state.write().await.reject_orders = n;
    }

    /// Fail the next `n` market data fetches with a network error
    pub async fn fail_next_fetches(&self, n: u32) {
        self.state.write().await.fail_fetches = n;
    }

    /// Make every cancel request fail
    pub async fn fail_cancels(&self, fail: bool) {
        self.state.write().await.fail_cancels = fail;
    }

    /// Orders still resting on the venue
    pub async fn open_orders(&self) -> Vec<OrderAck> {
        self.state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .cloned()
            .collect()
    }

    fn quote(&self, last: Decimal) -> (Decimal, Decimal) {
        let half = last * SPREAD / dec!(2);
        (last - half, last + half)
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        self.state
            .read()
            .await
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::NoMarketData(symbol.to_string()))
    }

    async fn rest_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        amount: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!("invalid amount {amount}")));
        }

        let mut state = self.state.write().await;
        state.take_order_rejection()?;

        let ack = OrderAck {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            order_type,
            amount,
            filled: Decimal::ZERO,
            price,
            status: OrderStatus::Open,
            timestamp: Utc::now(),
        };
        state.record_order(&ack);

        tracing::debug!(order_id = %ack.id, ?order_type, %symbol, "Paper order resting");
        Ok(ack)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.state.write().await.take_fetch_failure()?;
        let last = self.last_price(symbol).await?;
        let (bid, ask) = self.quote(last);
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            bid: Some(bid),
            ask: Some(ask),
            timestamp: Utc::now(),
        })
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError> {
        self.state.write().await.take_fetch_failure()?;
        let last = self.last_price(symbol).await?;
        let (bid, ask) = self.quote(last);
        let tick = (last * SPREAD).max(dec!(0.01));

        let level = |base: Decimal, i: usize, sign: Decimal| PriceLevel {
            price: base + sign * tick * Decimal::from(i),
            size: Decimal::from(i + 1),
        };

        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids: (0..depth).map(|i| level(bid, i, dec!(-1))).collect(),
            asks: (0..depth).map(|i| level(ask, i, dec!(1))).collect(),
            timestamp: Utc::now(),
        })
    }

    async fn fetch_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<MarketTrade>, ExchangeError> {
        let mut state = self.state.write().await;
        state.take_fetch_failure()?;
        let trades = state.trades.get(symbol).cloned().unwrap_or_default();
        let skip = trades.len().saturating_sub(limit);
        Ok(trades.into_iter().skip(skip).collect())
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        if timeframe != self.timeframe {
            return Err(ExchangeError::Unsupported(
                "paper venue serves a single timeframe",
            ));
        }
        let mut state = self.state.write().await;
        state.take_fetch_failure()?;
        let candles = state.candles.get(symbol).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn create_market_order(
        &self,
        symbol: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!("invalid amount {amount}")));
        }
        let price = self.last_price(symbol).await?;

        let mut state = self.state.write().await;
        state.take_order_rejection()?;

        // Simulate immediate fill at the last price
        let now = Utc::now();
        let ack = OrderAck {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            amount,
            filled: amount,
            price,
            status: OrderStatus::Filled,
            timestamp: now,
        };
        state.record_order(&ack);

        let prints = state.trades.entry(symbol.to_string()).or_default();
        prints.push(MarketTrade {
            symbol: symbol.to_string(),
            side,
            price,
            amount,
            timestamp: now,
        });
        if prints.len() > MAX_TRADES {
            prints.remove(0);
        }

        tracing::info!(order_id = %ack.id, %symbol, %side, %amount, %price, "Paper order filled");
        Ok(ack)
    }

    async fn create_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        self.rest_order(symbol, side, OrderType::Limit, amount, price)
            .await
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let price = match (request.order_type, request.price) {
            (OrderType::Market, _) => {
                return self
                    .create_market_order(&request.symbol, request.side, request.amount)
                    .await
            }
            (_, Some(price)) => price,
            (_, None) => return Err(ExchangeError::Rejected("missing trigger price".to_string())),
        };
        self.rest_order(
            &request.symbol,
            request.side,
            request.order_type,
            request.amount,
            price,
        )
        .await
    }

    async fn cancel_order(&self, order_id: &str, _symbol: &str) -> Result<(), ExchangeError> {
        let mut state = self.state.write().await;
        if state.fail_cancels {
            return Err(ExchangeError::Network(
                "simulated cancel failure".to_string(),
            ));
        }
        match state.orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatus::Open => {
                order.status = OrderStatus::Cancelled;
                tracing::info!(%order_id, "Paper order cancelled");
                Ok(())
            }
            _ => Err(ExchangeError::OrderNotFound(order_id.to_string())),
        }
    }
}

/// Synthetic price driver for paper runs: a Gaussian-ish random walk
#[derive(Debug, Clone)]
pub struct RandomWalk {
    pub symbol: String,
    pub start_price: Decimal,
    /// Max relative move per step
    pub step_pct: f64,
    pub interval: Duration,
}

impl RandomWalk {
    /// Spawn the walk, publishing every step to the paper venue
    pub fn spawn(self, exchange: Arc<PaperExchange>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut price = self.start_price;
            exchange.set_price(&self.symbol, price).await;

            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                let step: f64 = rng.gen_range(-self.step_pct..=self.step_pct)
                    + rng.gen_range(-self.step_pct..=self.step_pct) / 2.0;
                let factor = Decimal::from_f64(1.0 + step).unwrap_or(Decimal::ONE);
                price = (price * factor).round_dp(2).max(dec!(0.01));
                exchange.set_price(&self.symbol, price).await;
            }
        })
    }
}
