use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// OHLCV candlestick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single executed trade on the market tape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeTick {
    pub price: f64,
    pub volume: f64,
    pub side: OrderSide,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBookLevel {
    pub price: f64,
    pub volume: f64,
}

/// Top of the order book, best levels first
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Spread as a percentage of the best ask
    pub fn spread_pct(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > 0.0 => Some((ask - bid) / ask * 100.0),
            _ => None,
        }
    }

    /// Total bid volume over total ask volume
    pub fn bid_ask_ratio(&self) -> Option<f64> {
        let bid_volume: f64 = self.bids.iter().map(|l| l.volume).sum();
        let ask_volume: f64 = self.asks.iter().map(|l| l.volume).sum();
        if ask_volume > 0.0 {
            Some(bid_volume / ask_volume)
        } else {
            None
        }
    }
}

/// Everything the decision oracle sees about a market at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub recent_trades: Vec<TradeTick>,
    #[serde(default)]
    pub order_book: OrderBook,
    #[serde(default)]
    pub candles: Vec<Candle>,
    /// Precomputed indicator values keyed by name (e.g. "rsi_14")
    #[serde(default)]
    pub indicators: BTreeMap<String, f64>,
}

impl MarketSnapshot {
    /// Bare snapshot carrying only a price
    pub fn at_price(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
            recent_trades: Vec::new(),
            order_book: OrderBook::default(),
            candles: Vec::new(),
            indicators: BTreeMap::new(),
        }
    }

    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Bid,
    Ask,
}

/// Exchange-side order state as reported by order queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Wait,
    Done,
    Cancel,
    Error,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Wait => "wait",
            OrderState::Done => "done",
            OrderState::Cancel => "cancel",
            OrderState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Market order to submit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderRequest {
    /// Market buy spending `funds` of the quote currency
    BuyWithQuote { market: String, funds: f64 },
    /// Market sell of `volume` base units
    SellVolume { market: String, volume: f64 },
}

impl OrderRequest {
    pub fn market(&self) -> &str {
        match self {
            OrderRequest::BuyWithQuote { market, .. } | OrderRequest::SellVolume { market, .. } => {
                market
            }
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            OrderRequest::BuyWithQuote { .. } => OrderSide::Bid,
            OrderRequest::SellVolume { .. } => OrderSide::Ask,
        }
    }
}

/// Acknowledgement of an accepted order submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderHandle {
    pub order_id: String,
    pub market: String,
    pub side: OrderSide,
    pub created_at: DateTime<Utc>,
}

/// Order as reported by an order-status query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeOrder {
    pub order_id: String,
    pub market: String,
    pub side: OrderSide,
    pub state: OrderState,
    /// Volume-weighted fill price, known once anything executed
    pub average_price: Option<f64>,
    pub executed_volume: f64,
    pub paid_fee: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub currency: String,
    pub free: f64,
    pub locked: f64,
}

/// Exchange market name, e.g. `KRW-BTC`
pub fn market_name(quote_currency: &str, symbol: &str) -> String {
    format!("{}-{}", quote_currency, symbol)
}
