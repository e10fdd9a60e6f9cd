use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::MarketSnapshotProvider;
use crate::error::{Error, Result};
use crate::models::{Candle, MarketSnapshot, OrderBook, OrderBookLevel, OrderSide, TradeTick};

const MAX_CANDLES: usize = 60;
const MAX_TRADES: usize = 20;
const BOOK_DEPTH: usize = 5;
const TICK_SECONDS: i64 = 1;

/// Price history of one symbol
struct Tape {
    price: f64,
    candles: VecDeque<Candle>,
    trades: VecDeque<TradeTick>,
    clock: DateTime<Utc>,
}

struct FeedState {
    rng: StdRng,
    tapes: HashMap<String, Tape>,
}

/// Seeded random-walk market data for paper trading
///
/// Every snapshot request advances the symbol's walk by one tick and
/// appends one candle, so repeated polling sees a moving market.
pub struct SyntheticFeed {
    start_price: f64,
    volatility: f64,
    base_volume: f64,
    state: Mutex<FeedState>,
}

impl SyntheticFeed {
    /// # Arguments
    /// * `start_price` - Initial price for every symbol
    /// * `volatility` - Max per-tick move as a fraction (e.g. 0.0008 = ±0.08%)
    /// * `seed` - RNG seed; random when None
    pub fn new(start_price: f64, volatility: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            start_price,
            volatility: volatility.abs(),
            base_volume: 0.5,
            state: Mutex::new(FeedState {
                rng,
                tapes: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_tape(&self) -> Tape {
        Tape {
            price: self.start_price,
            candles: VecDeque::new(),
            trades: VecDeque::new(),
            clock: Utc::now(),
        }
    }

    /// Latest price without advancing the walk
    pub fn last_price(&self, symbol: &str) -> f64 {
        self.lock()
            .tapes
            .get(symbol)
            .map(|t| t.price)
            .unwrap_or(self.start_price)
    }

    /// Pin a symbol's price; the walk continues from here
    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.lock();
        let tape = state
            .tapes
            .entry(symbol.to_string())
            .or_insert_with(|| self.new_tape());
        tape.price = price;
    }

    fn advance(&self, symbol: &str) -> MarketSnapshot {
        let mut guard = self.lock();
        let FeedState { rng, tapes } = &mut *guard;
        let tape = tapes
            .entry(symbol.to_string())
            .or_insert_with(|| self.new_tape());

        let open = tape.price;
        let change = if self.volatility > 0.0 {
            rng.gen_range(-self.volatility..self.volatility)
        } else {
            0.0
        };
        let close = (open * (1.0 + change)).max(f64::MIN_POSITIVE);
        let wick = self.volatility * 0.5;
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..=wick));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..=wick));
        let volume = self.base_volume * rng.gen_range(0.7..1.3); // Vary volume ±30%

        tape.clock = tape.clock + Duration::seconds(TICK_SECONDS);
        tape.price = close;
        tape.candles.push_back(Candle {
            timestamp: tape.clock,
            open,
            high,
            low,
            close,
            volume,
        });
        while tape.candles.len() > MAX_CANDLES {
            tape.candles.pop_front();
        }

        tape.trades.push_back(TradeTick {
            price: close,
            volume: volume * 0.1,
            side: if close >= open { OrderSide::Bid } else { OrderSide::Ask },
            timestamp: tape.clock,
        });
        while tape.trades.len() > MAX_TRADES {
            tape.trades.pop_front();
        }

        // Spread of one basis point per level
        let step = close * 0.0001;
        let mut order_book = OrderBook::default();
        for level in 1..=BOOK_DEPTH {
            order_book.bids.push(OrderBookLevel {
                price: close - step * level as f64,
                volume: self.base_volume * rng.gen_range(0.5..1.5),
            });
            order_book.asks.push(OrderBookLevel {
                price: close + step * level as f64,
                volume: self.base_volume * rng.gen_range(0.5..1.5),
            });
        }

        let candles: Vec<Candle> = tape.candles.iter().cloned().collect();
        let mut indicators = BTreeMap::new();
        for period in [5, 20] {
            if candles.len() >= period {
                let sma = candles[candles.len() - period..]
                    .iter()
                    .map(|c| c.close)
                    .sum::<f64>()
                    / period as f64;
                indicators.insert(format!("sma_{}", period), sma);
            }
        }

        MarketSnapshot {
            symbol: symbol.to_string(),
            price: close,
            timestamp: tape.clock,
            recent_trades: tape.trades.iter().cloned().collect(),
            order_book,
            candles,
            indicators,
        }
    }
}

#[async_trait]
impl MarketSnapshotProvider for SyntheticFeed {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        if symbol.is_empty() {
            return Err(Error::DataUnavailable("empty symbol".to_string()));
        }
        Ok(self.advance(symbol))
    }
}
