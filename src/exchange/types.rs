//! Exchange data types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy the base asset
    Buy,
    /// Sell the base asset
    Sell,
}

impl Side {
    /// The side that offsets this one
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market order (immediate execution)
    Market,
    /// Limit order (price specified)
    Limit,
    /// Protective stop, triggers when price moves against the position
    StopLoss,
    /// Protective target, triggers when price moves in favour of the position
    TakeProfit,
}

/// Exchange-side order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Resting on the book or waiting for its trigger
    Open,
    /// Fully executed
    Filled,
    /// Cancelled before execution
    Cancelled,
}

/// Generic order request, used for protective orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: Decimal,
    /// Limit or trigger price
    pub price: Option<Decimal>,
}

impl OrderRequest {
    /// Stop-loss order closing `amount` on `side` once `trigger` trades
    pub fn stop_loss(
        symbol: impl Into<String>,
        side: Side,
        amount: Decimal,
        trigger: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::StopLoss,
            amount,
            price: Some(trigger),
        }
    }

    /// Take-profit order closing `amount` on `side` once `trigger` trades
    pub fn take_profit(
        symbol: impl Into<String>,
        side: Side,
        amount: Decimal,
        trigger: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::TakeProfit,
            amount,
            price: Some(trigger),
        }
    }
}

/// Acknowledgement returned by the exchange for a submitted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange order identifier
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Requested amount
    pub amount: Decimal,
    /// Executed amount
    pub filled: Decimal,
    /// Average fill price for filled orders, limit/trigger price otherwise
    pub price: Decimal,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

/// Best bid/ask and last trade snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// A price level in the order book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: Decimal,
    /// Total size available
    pub size: Decimal,
}

/// Order book snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    /// Bids, best first
    pub bids: Vec<PriceLevel>,
    /// Asks, best first
    pub asks: Vec<PriceLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// Best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }
}

/// A public trade printed on the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTrade {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// OHLCV candle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Candle timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Length of one candle
    pub fn duration(self) -> Duration {
        let secs = match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        };
        Duration::from_secs(secs)
    }

    /// How often a polling feed refreshes candles of this timeframe
    pub fn poll_interval(self) -> Duration {
        let secs = match self {
            Timeframe::M1 => 10,
            Timeframe::M5 => 30,
            Timeframe::M15 => 60,
            Timeframe::M30 => 120,
            Timeframe::H1 => 300,
            Timeframe::H4 | Timeframe::D1 => 600,
        };
        Duration::from_secs(secs)
    }

    /// Exchange notation, e.g. `"15m"`
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_candle_poll_interval_scales_with_timeframe() {
        assert_eq!(Timeframe::M1.poll_interval(), Duration::from_secs(10));
        assert_eq!(Timeframe::H1.poll_interval(), Duration::from_secs(300));
        assert_eq!(Timeframe::D1.poll_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert!("2w".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::H4.to_string(), "4h");
    }

    #[test]
    fn test_timeframe_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            tf: Timeframe,
        }
        let w: Wrapper = toml::from_str(r#"tf = "1d""#).unwrap();
        assert_eq!(w.tf, Timeframe::D1);
    }

    #[test]
    fn test_order_book_best_prices() {
        let book = OrderBook {
            symbol: "BTC/USDT".to_string(),
            bids: vec![PriceLevel {
                price: dec!(99),
                size: dec!(1),
            }],
            asks: vec![],
            timestamp: Utc::now(),
        };
        assert_eq!(book.best_bid(), Some(dec!(99)));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_protective_request_builders() {
        let sl = OrderRequest::stop_loss("ETH/USDT", Side::Sell, dec!(2), dec!(1900));
        assert_eq!(sl.order_type, OrderType::StopLoss);
        assert_eq!(sl.price, Some(dec!(1900)));

        let tp = OrderRequest::take_profit("ETH/USDT", Side::Sell, dec!(1), dec!(2200));
        assert_eq!(tp.order_type, OrderType::TakeProfit);
        assert_eq!(tp.amount, dec!(1));
    }
}
