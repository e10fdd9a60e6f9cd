use std::sync::Arc;

use crate::error::{Error, Result};
use crate::exchange::ExchangeClient;
use crate::models::{market_name, OrderHandle, OrderRequest};

/// Sizes and submits entry/exit market orders
pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeClient>,
    quote_currency: String,
    entry_fraction: f64,
}

impl OrderExecutor {
    /// # Arguments
    /// * `entry_fraction` - Share of the free quote balance spent per entry (e.g. 0.2)
    pub fn new(exchange: Arc<dyn ExchangeClient>, quote_currency: String, entry_fraction: f64) -> Self {
        Self {
            exchange,
            quote_currency,
            entry_fraction,
        }
    }

    pub fn quote_currency(&self) -> &str {
        &self.quote_currency
    }

    /// Market buy spending `entry_fraction` of the free quote balance
    pub async fn entry_request(&self, symbol: &str) -> Result<OrderRequest> {
        let balance = self.exchange.get_balance(&self.quote_currency).await?;
        if balance.free <= 0.0 {
            return Err(Error::InsufficientBalance {
                currency: self.quote_currency.clone(),
                free: balance.free,
            });
        }

        let funds = balance.free * self.entry_fraction;
        tracing::debug!(
            symbol,
            "Sizing entry: {:.0} of {:.0} {} free",
            funds,
            balance.free,
            self.quote_currency
        );

        Ok(OrderRequest::BuyWithQuote {
            market: market_name(&self.quote_currency, symbol),
            funds,
        })
    }

    /// Market sell of the whole free base balance
    pub async fn exit_request(&self, symbol: &str) -> Result<OrderRequest> {
        let balance = self.exchange.get_balance(symbol).await?;
        if balance.free <= 0.0 {
            return Err(Error::InsufficientBalance {
                currency: symbol.to_string(),
                free: balance.free,
            });
        }

        Ok(OrderRequest::SellVolume {
            market: market_name(&self.quote_currency, symbol),
            volume: balance.free,
        })
    }

    pub async fn submit(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let handle = self.exchange.place_order(request).await?;
        tracing::info!(
            order_id = %handle.order_id,
            market = request.market(),
            "📤 Submitted {:?} order",
            request.side()
        );
        Ok(handle)
    }
}
