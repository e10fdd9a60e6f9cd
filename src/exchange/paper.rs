use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{ExchangeClient, SyntheticFeed};
use crate::config::PaperSettings;
use crate::error::{Error, Result};
use crate::models::{Balance, ExchangeOrder, OrderHandle, OrderRequest, OrderState};

struct PaperOrder {
    request: OrderRequest,
    order: ExchangeOrder,
    /// Queries still answered with `wait`
    polls_remaining: u32,
}

struct PaperState {
    balances: HashMap<String, f64>,
    orders: HashMap<String, PaperOrder>,
}

/// Simulated exchange filling market orders at the synthetic feed's price
///
/// Funds are reserved when an order is placed and the fill happens on the
/// first status query after `fill_delay_polls` pending answers.
pub struct PaperExchange {
    feed: Arc<SyntheticFeed>,
    quote_currency: String,
    fee_rate: f64,
    fill_delay_polls: u32,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(
        feed: Arc<SyntheticFeed>,
        quote_currency: String,
        initial_quote_balance: f64,
        fee_rate: f64,
        fill_delay_polls: u32,
    ) -> Self {
        let mut balances = HashMap::new();
        balances.insert(quote_currency.clone(), initial_quote_balance);

        Self {
            feed,
            quote_currency,
            fee_rate,
            fill_delay_polls,
            state: Mutex::new(PaperState {
                balances,
                orders: HashMap::new(),
            }),
        }
    }

    pub fn from_settings(feed: Arc<SyntheticFeed>, quote_currency: String, settings: &PaperSettings) -> Self {
        Self::new(
            feed,
            quote_currency,
            settings.initial_quote_balance,
            settings.fee_rate,
            settings.fill_delay_polls,
        )
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Base symbol of a `{quote}-{symbol}` market
    fn symbol_of<'a>(&self, market: &'a str) -> Result<&'a str> {
        market
            .strip_prefix(&self.quote_currency)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::OrderRejected(format!("unknown market {}", market)))
    }

    /// Total quote value of all balances at current feed prices
    pub fn equity(&self) -> f64 {
        let state = self.lock();
        state
            .balances
            .iter()
            .map(|(currency, amount)| {
                if *currency == self.quote_currency {
                    *amount
                } else {
                    amount * self.feed.last_price(currency)
                }
            })
            .sum()
    }

    fn fill(&self, state: &mut PaperState, order_id: &str) -> Result<()> {
        let paper = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| Error::Exchange(format!("order {} not found", order_id)))?;
        let symbol = self.symbol_of(&paper.order.market)?.to_string();
        let price = self.feed.last_price(&symbol);

        let (credit_currency, credit, volume, fee) = match &paper.request {
            OrderRequest::BuyWithQuote { funds, .. } => {
                let fee = funds * self.fee_rate;
                let volume = (funds - fee) / price;
                (symbol.clone(), volume, volume, fee)
            }
            OrderRequest::SellVolume { volume, .. } => {
                let proceeds = volume * price;
                let fee = proceeds * self.fee_rate;
                (self.quote_currency.clone(), proceeds - fee, *volume, fee)
            }
        };

        paper.order.state = OrderState::Done;
        paper.order.average_price = Some(price);
        paper.order.executed_volume = volume;
        paper.order.paid_fee = fee;

        *state.balances.entry(credit_currency).or_insert(0.0) += credit;
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let symbol = self.symbol_of(request.market())?.to_string();
        let (debit_currency, amount) = match request {
            OrderRequest::BuyWithQuote { funds, .. } => (self.quote_currency.clone(), *funds),
            OrderRequest::SellVolume { volume, .. } => (symbol, *volume),
        };
        if !(amount > 0.0) {
            return Err(Error::OrderRejected(format!("non-positive amount {}", amount)));
        }

        let mut state = self.lock();
        let free = state.balances.entry(debit_currency.clone()).or_insert(0.0);
        if *free < amount {
            return Err(Error::OrderRejected(format!(
                "insufficient {}: {} < {}",
                debit_currency, free, amount
            )));
        }
        *free -= amount;

        let handle = OrderHandle {
            order_id: Uuid::new_v4().to_string(),
            market: request.market().to_string(),
            side: request.side(),
            created_at: Utc::now(),
        };
        state.orders.insert(
            handle.order_id.clone(),
            PaperOrder {
                request: request.clone(),
                order: ExchangeOrder {
                    order_id: handle.order_id.clone(),
                    market: handle.market.clone(),
                    side: handle.side,
                    state: OrderState::Wait,
                    average_price: None,
                    executed_volume: 0.0,
                    paid_fee: 0.0,
                    created_at: handle.created_at,
                },
                polls_remaining: self.fill_delay_polls,
            },
        );

        Ok(handle)
    }

    async fn get_order(&self, order_id: &str) -> Result<ExchangeOrder> {
        let mut state = self.lock();
        let paper = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| Error::Exchange(format!("order {} not found", order_id)))?;

        if paper.order.state == OrderState::Wait {
            if paper.polls_remaining > 0 {
                paper.polls_remaining -= 1;
            } else {
                self.fill(&mut state, order_id)?;
            }
        }

        state
            .orders
            .get(order_id)
            .map(|p| p.order.clone())
            .ok_or_else(|| Error::Exchange(format!("order {} not found", order_id)))
    }

    async fn get_balance(&self, currency: &str) -> Result<Balance> {
        let state = self.lock();
        Ok(Balance {
            currency: currency.to_string(),
            free: state.balances.get(currency).copied().unwrap_or(0.0),
            locked: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(fill_delay_polls: u32) -> (Arc<SyntheticFeed>, PaperExchange) {
        let feed = Arc::new(SyntheticFeed::new(100_000_000.0, 0.0, Some(1)));
        let exchange = PaperExchange::new(
            feed.clone(),
            "KRW".to_string(),
            1_000_000.0,
            0.0005,
            fill_delay_polls,
        );
        (feed, exchange)
    }

    #[tokio::test]
    async fn test_buy_fills_after_delay() {
        let (_feed, exchange) = exchange(2);
        let handle = exchange
            .place_order(&OrderRequest::BuyWithQuote {
                market: "KRW-BTC".to_string(),
                funds: 200_000.0,
            })
            .await
            .unwrap();

        assert_eq!(exchange.get_order(&handle.order_id).await.unwrap().state, OrderState::Wait);
        assert_eq!(exchange.get_order(&handle.order_id).await.unwrap().state, OrderState::Wait);
        let filled = exchange.get_order(&handle.order_id).await.unwrap();

        assert_eq!(filled.state, OrderState::Done);
        assert_eq!(filled.paid_fee, 100.0);
        assert!((filled.executed_volume - 0.001999).abs() < 1e-12);
        assert_eq!(exchange.get_balance("KRW").await.unwrap().free, 800_000.0);
        assert_eq!(
            exchange.get_balance("BTC").await.unwrap().free,
            filled.executed_volume
        );
    }

    #[tokio::test]
    async fn test_sell_credits_quote_minus_fee() {
        let (feed, exchange) = exchange(0);
        let buy = exchange
            .place_order(&OrderRequest::BuyWithQuote {
                market: "KRW-BTC".to_string(),
                funds: 100_000.0,
            })
            .await
            .unwrap();
        let bought = exchange.get_order(&buy.order_id).await.unwrap();

        feed.set_price("BTC", 110_000_000.0);
        let sell = exchange
            .place_order(&OrderRequest::SellVolume {
                market: "KRW-BTC".to_string(),
                volume: bought.executed_volume,
            })
            .await
            .unwrap();
        let sold = exchange.get_order(&sell.order_id).await.unwrap();

        let proceeds = bought.executed_volume * 110_000_000.0;
        assert_eq!(sold.average_price, Some(110_000_000.0));
        assert!((sold.paid_fee - proceeds * 0.0005).abs() < 1e-6);
        assert_eq!(exchange.get_balance("BTC").await.unwrap().free, 0.0);
        assert!(exchange.equity() > 1_000_000.0);
    }

    #[tokio::test]
    async fn test_rejects_overspend_and_unknown_market() {
        let (_feed, exchange) = exchange(0);

        let overspend = exchange
            .place_order(&OrderRequest::BuyWithQuote {
                market: "KRW-BTC".to_string(),
                funds: 2_000_000.0,
            })
            .await;
        assert!(matches!(overspend, Err(Error::OrderRejected(_))));

        let unknown = exchange
            .place_order(&OrderRequest::SellVolume {
                market: "USDT-BTC".to_string(),
                volume: 1.0,
            })
            .await;
        assert!(matches!(unknown, Err(Error::OrderRejected(_))));

        assert!(exchange.get_order("missing").await.is_err());
    }
}
