// Exchange and market data boundaries, plus the paper-trading implementations
pub mod paper;
pub mod synthetic;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Balance, ExchangeOrder, MarketSnapshot, OrderHandle, OrderRequest};

pub use paper::PaperExchange;
pub use synthetic::SyntheticFeed;

/// Order placement and order/balance queries.
///
/// `place_order` fails with `Error::OrderRejected` when the exchange refuses
/// the order and `Error::Exchange` when the request itself failed.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle>;

    async fn get_order(&self, order_id: &str) -> Result<ExchangeOrder>;

    async fn get_balance(&self, currency: &str) -> Result<Balance>;
}

/// Current market view for a symbol; fails with `Error::DataUnavailable`
#[async_trait]
pub trait MarketSnapshotProvider: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot>;
}
