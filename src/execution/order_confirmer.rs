use std::sync::Arc;

use crate::error::{Error, Result};
use crate::exchange::ExchangeClient;
use crate::execution::BackoffSchedule;
use crate::models::OrderState;
use crate::round::{OrderKind, OrderRecord};

/// Turns "order submitted" into "order resolved" by polling the exchange
/// under a bounded backoff schedule.
pub struct OrderConfirmer {
    exchange: Arc<dyn ExchangeClient>,
    schedule: BackoffSchedule,
}

impl OrderConfirmer {
    pub fn new(exchange: Arc<dyn ExchangeClient>, schedule: BackoffSchedule) -> Self {
        Self { exchange, schedule }
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    /// Wait for `order_id` to reach a terminal state.
    ///
    /// * `done` returns the filled record.
    /// * `cancel`/`error` return `OrderNotFilled` without further polling.
    /// * Still `wait` after the last attempt returns `OrderTimeout`.
    /// * A failed query counts as an attempt. If the last attempt itself
    ///   failed, the outcome is unknown and `OrderStateUnknown` is returned.
    pub async fn confirm(&self, order_id: &str, kind: OrderKind) -> Result<OrderRecord> {
        let attempts = self.schedule.attempts();
        let mut last_error: Option<String> = None;

        for attempt in 0..attempts {
            match self.exchange.get_order(order_id).await {
                Ok(order) => {
                    last_error = None;
                    match order.state {
                        OrderState::Done => {
                            tracing::info!(
                                order_id,
                                attempt = attempt + 1,
                                "✅ Order filled: {:.8} @ {:.2}",
                                order.executed_volume,
                                order.average_price.unwrap_or_default()
                            );
                            return Ok(OrderRecord::from_exchange(&order, kind));
                        }
                        OrderState::Cancel | OrderState::Error => {
                            tracing::warn!(order_id, state = %order.state, "Order not filled");
                            return Err(Error::OrderNotFilled {
                                order_id: order_id.to_string(),
                                state: order.state,
                            });
                        }
                        OrderState::Wait => {
                            tracing::debug!(order_id, attempt = attempt + 1, "Order still pending");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(order_id, attempt = attempt + 1, "Order query failed: {}", e);
                    last_error = Some(e.to_string());
                }
            }

            if let Some(delay) = self.schedule.delay_before_retry(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        match last_error {
            Some(last_error) => Err(Error::OrderStateUnknown {
                order_id: order_id.to_string(),
                attempts,
                last_error,
            }),
            None => Err(Error::OrderTimeout {
                order_id: order_id.to_string(),
                attempts,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Balance, ExchangeOrder, OrderHandle, OrderRequest, OrderSide};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers order queries from a fixed script
    struct ScriptedOrders {
        script: Mutex<VecDeque<Result<OrderState>>>,
        queries: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedOrders {
        fn new(script: Vec<Result<OrderState>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn query_times(&self) -> Vec<tokio::time::Instant> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExchangeClient for ScriptedOrders {
        async fn place_order(&self, _request: &OrderRequest) -> Result<OrderHandle> {
            unreachable!("confirmer never places orders")
        }

        async fn get_order(&self, order_id: &str) -> Result<ExchangeOrder> {
            self.queries.lock().unwrap().push(tokio::time::Instant::now());
            let state = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(OrderState::Wait))?;
            Ok(ExchangeOrder {
                order_id: order_id.to_string(),
                market: "KRW-BTC".to_string(),
                side: OrderSide::Bid,
                state,
                average_price: Some(100.0),
                executed_volume: 1.0,
                paid_fee: 0.04,
                created_at: Utc::now(),
            })
        }

        async fn get_balance(&self, _currency: &str) -> Result<Balance> {
            unreachable!("confirmer never reads balances")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_after_pending_polls() {
        let exchange = ScriptedOrders::new(vec![
            Ok(OrderState::Wait),
            Ok(OrderState::Wait),
            Ok(OrderState::Done),
        ]);
        let confirmer = OrderConfirmer::new(exchange.clone(), BackoffSchedule::default());

        let record = confirmer.confirm("ord-1", OrderKind::Entry).await.unwrap();

        assert!(record.is_filled());
        let times = exchange.query_times();
        assert_eq!(times.len(), 3);
        // Slept the first two schedule entries before each retry
        assert_eq!(times[1] - times[0], Duration::from_millis(500));
        assert_eq!(times[2] - times[1], Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_immediately() {
        let exchange = ScriptedOrders::new(vec![Ok(OrderState::Cancel)]);
        let confirmer = OrderConfirmer::new(exchange.clone(), BackoffSchedule::default());
        let started = tokio::time::Instant::now();

        let err = confirmer.confirm("ord-1", OrderKind::Entry).await.unwrap_err();

        assert!(matches!(
            err,
            Error::OrderNotFilled {
                state: OrderState::Cancel,
                ..
            }
        ));
        assert_eq!(exchange.query_times().len(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_schedule_exhausted() {
        let exchange = ScriptedOrders::new(Vec::new());
        let confirmer = OrderConfirmer::new(exchange.clone(), BackoffSchedule::default());
        let started = tokio::time::Instant::now();

        let err = confirmer.confirm("ord-1", OrderKind::Exit).await.unwrap_err();

        assert!(matches!(err, Error::OrderTimeout { attempts: 10, .. }));
        assert_eq!(exchange.query_times().len(), 10);
        assert_eq!(started.elapsed(), Duration::from_millis(10_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_errors_are_retried() {
        let exchange = ScriptedOrders::new(vec![
            Err(Error::Exchange("502".into())),
            Ok(OrderState::Done),
        ]);
        let confirmer = OrderConfirmer::new(exchange, BackoffSchedule::default());

        assert!(confirmer.confirm("ord-1", OrderKind::Entry).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_final_attempt_is_ambiguous() {
        let exchange = ScriptedOrders::new(vec![
            Ok(OrderState::Wait),
            Err(Error::Exchange("connection reset".into())),
        ]);
        let confirmer =
            OrderConfirmer::new(exchange, BackoffSchedule::from_millis(&[100, 100]));

        let err = confirmer.confirm("ord-1", OrderKind::Entry).await.unwrap_err();

        assert!(matches!(err, Error::OrderStateUnknown { attempts: 2, .. }));
        assert!(err.is_fatal());
    }
}
