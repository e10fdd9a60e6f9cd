#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use scalper::audit::{AuditEvent, AuditLog};
use scalper::config::TradingSettings;
use scalper::exchange::{ExchangeClient, MarketSnapshotProvider};
use scalper::execution::BackoffSchedule;
use scalper::notify::{Notification, Notifier};
use scalper::oracle::{DecisionOracle, EntryJudgment, ExitJudgment, PositionView};
use scalper::risk::{CircuitBreakers, PerformanceAccumulator};
use scalper::round::{Collaborators, RoundManager, RoundRegistry};
use scalper::{
    Balance, Error, ExchangeOrder, MarketSnapshot, OrderHandle, OrderRequest, OrderState, Result,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const QUOTE: &str = "KRW";

// ============================================================================
// Exchange
// ============================================================================

/// One answer to an order-status query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Poll {
    Wait,
    Done,
    Cancel,
    /// The query itself fails
    Unreadable,
}

struct ScriptedOrder {
    request: OrderRequest,
    polls: VecDeque<Poll>,
    price: f64,
    order: ExchangeOrder,
}

#[derive(Default)]
struct ExchangeState {
    balances: HashMap<String, f64>,
    submit_failures: usize,
    scripts: VecDeque<(Vec<Poll>, f64)>,
    orders: HashMap<String, ScriptedOrder>,
    placed: Vec<OrderRequest>,
    queries: usize,
}

/// Exchange whose orders follow pre-scripted status sequences.
///
/// Each placed order takes the next script; fills happen at the scripted
/// price with no fee.
#[derive(Default)]
pub struct ScriptedExchange {
    state: Mutex<ExchangeState>,
}

impl ScriptedExchange {
    pub fn new(quote_balance: f64) -> Self {
        let exchange = Self::default();
        exchange
            .state
            .lock()
            .unwrap()
            .balances
            .insert(QUOTE.to_string(), quote_balance);
        exchange
    }

    pub fn reject_submits(&self, count: usize) {
        self.state.lock().unwrap().submit_failures = count;
    }

    pub fn script_order(&self, polls: &[Poll], price: f64) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push_back((polls.to_vec(), price));
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn queries(&self) -> usize {
        self.state.lock().unwrap().queries
    }

    pub fn balance(&self, currency: &str) -> f64 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(currency)
            .copied()
            .unwrap_or(0.0)
    }
}

fn base_of(market: &str) -> String {
    market.split('-').nth(1).unwrap_or(market).to_string()
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let mut state = self.state.lock().unwrap();
        if state.submit_failures > 0 {
            state.submit_failures -= 1;
            return Err(Error::OrderRejected("scripted rejection".to_string()));
        }
        let (polls, price) = state
            .scripts
            .pop_front()
            .ok_or_else(|| Error::OrderRejected("no scripted order".to_string()))?;

        let (currency, amount) = match request {
            OrderRequest::BuyWithQuote { funds, .. } => (QUOTE.to_string(), *funds),
            OrderRequest::SellVolume { market, volume } => (base_of(market), *volume),
        };
        *state.balances.entry(currency).or_insert(0.0) -= amount;

        let order_id = format!("order-{}", state.placed.len() + 1);
        let handle = OrderHandle {
            order_id: order_id.clone(),
            market: request.market().to_string(),
            side: request.side(),
            created_at: Utc::now(),
        };
        state.placed.push(request.clone());
        state.orders.insert(
            order_id.clone(),
            ScriptedOrder {
                request: request.clone(),
                polls: polls.into(),
                price,
                order: ExchangeOrder {
                    order_id,
                    market: handle.market.clone(),
                    side: handle.side,
                    state: OrderState::Wait,
                    average_price: None,
                    executed_volume: 0.0,
                    paid_fee: 0.0,
                    created_at: handle.created_at,
                },
            },
        );

        Ok(handle)
    }

    async fn get_order(&self, order_id: &str) -> Result<ExchangeOrder> {
        let mut state = self.state.lock().unwrap();
        state.queries += 1;
        let ExchangeState {
            orders, balances, ..
        } = &mut *state;
        let scripted = orders
            .get_mut(order_id)
            .ok_or_else(|| Error::Exchange(format!("unknown order {}", order_id)))?;

        if scripted.order.state != OrderState::Wait {
            return Ok(scripted.order.clone());
        }

        match scripted.polls.pop_front().unwrap_or(Poll::Wait) {
            Poll::Wait => {}
            Poll::Unreadable => return Err(Error::Exchange("order query failed".to_string())),
            Poll::Cancel => {
                scripted.order.state = OrderState::Cancel;
                match &scripted.request {
                    OrderRequest::BuyWithQuote { funds, .. } => {
                        *balances.entry(QUOTE.to_string()).or_insert(0.0) += funds;
                    }
                    OrderRequest::SellVolume { market, volume } => {
                        *balances.entry(base_of(market)).or_insert(0.0) += volume;
                    }
                }
            }
            Poll::Done => {
                let price = scripted.price;
                let volume = match &scripted.request {
                    OrderRequest::BuyWithQuote { market, funds } => {
                        let volume = funds / price;
                        *balances.entry(base_of(market)).or_insert(0.0) += volume;
                        volume
                    }
                    OrderRequest::SellVolume { volume, .. } => {
                        *balances.entry(QUOTE.to_string()).or_insert(0.0) += volume * price;
                        *volume
                    }
                };
                scripted.order.state = OrderState::Done;
                scripted.order.average_price = Some(price);
                scripted.order.executed_volume = volume;
            }
        }

        Ok(scripted.order.clone())
    }

    async fn get_balance(&self, currency: &str) -> Result<Balance> {
        Ok(Balance {
            currency: currency.to_string(),
            free: self.balance(currency),
            locked: 0.0,
        })
    }
}

// ============================================================================
// Market data
// ============================================================================

/// Serves queued prices; the last one repeats once the queue is drained
pub struct ScriptedFeed {
    prices: Mutex<VecDeque<Option<f64>>>,
    last: Mutex<f64>,
}

impl ScriptedFeed {
    pub fn new(prices: &[f64]) -> Self {
        Self {
            prices: Mutex::new(prices.iter().copied().map(Some).collect()),
            last: Mutex::new(prices.first().copied().unwrap_or(100_000_000.0)),
        }
    }

    pub fn push_price(&self, price: f64) {
        self.prices.lock().unwrap().push_back(Some(price));
    }

    pub fn push_outage(&self) {
        self.prices.lock().unwrap().push_back(None);
    }
}

#[async_trait]
impl MarketSnapshotProvider for ScriptedFeed {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        let next = self.prices.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(Some(price)) => *last = price,
            Some(None) => return Err(Error::DataUnavailable("scripted outage".to_string())),
            None => {}
        }
        Ok(MarketSnapshot::at_price(symbol, *last))
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// Replays queued judgments; declines entry and holds once drained
#[derive(Default)]
pub struct ScriptedOracle {
    entries: Mutex<VecDeque<Result<EntryJudgment>>>,
    exits: Mutex<VecDeque<Result<ExitJudgment>>>,
    positions: Mutex<Vec<PositionView>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, target_price: f64, stop_price: f64) {
        self.push_entry(Ok(EntryJudgment {
            should_enter: true,
            target_price,
            stop_price,
            reasons: vec!["scripted entry".to_string()],
        }));
    }

    pub fn decline(&self) {
        self.push_entry(Ok(EntryJudgment::decline(vec!["scripted decline".to_string()])));
    }

    pub fn push_entry(&self, judgment: Result<EntryJudgment>) {
        self.entries.lock().unwrap().push_back(judgment);
    }

    pub fn exit(&self) {
        self.push_exit(Ok(ExitJudgment::exit(vec!["scripted exit".to_string()])));
    }

    pub fn hold(&self) {
        self.push_exit(Ok(ExitJudgment::hold(vec!["scripted hold".to_string()])));
    }

    pub fn push_exit(&self, judgment: Result<ExitJudgment>) {
        self.exits.lock().unwrap().push_back(judgment);
    }

    pub fn positions(&self) -> Vec<PositionView> {
        self.positions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn entry(&self, _snapshot: &MarketSnapshot) -> Result<EntryJudgment> {
        self.entries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(EntryJudgment::decline(Vec::new())))
    }

    async fn exit(&self, position: &PositionView, _snapshot: &MarketSnapshot) -> Result<ExitJudgment> {
        self.positions.lock().unwrap().push(position.clone());
        self.exits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExitJudgment::hold(Vec::new())))
    }
}

// ============================================================================
// Sinks
// ============================================================================

#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Audit sink that always fails
pub struct BrokenAuditLog;

#[async_trait]
impl AuditLog for BrokenAuditLog {
    async fn append(&self, _event: &AuditEvent) -> Result<()> {
        Err(Error::Io(std::io::Error::other("disk full")))
    }
}

#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub manager: RoundManager,
    pub registry: Arc<RoundRegistry>,
    pub performance: Arc<PerformanceAccumulator>,
    pub exchange: Arc<ScriptedExchange>,
    pub feed: Arc<ScriptedFeed>,
    pub oracle: Arc<ScriptedOracle>,
    pub audit: Arc<MemoryAuditLog>,
    pub notifier: Arc<MemoryNotifier>,
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl Harness {
    pub fn new(prices: &[f64]) -> Self {
        Self::with_settings(prices, TradingSettings::default(), CircuitBreakers::default())
    }

    pub fn with_settings(prices: &[f64], settings: TradingSettings, breakers: CircuitBreakers) -> Self {
        let registry = Arc::new(RoundRegistry::new(
            settings.max_active_rounds,
            settings.history_capacity,
        ));
        let performance = Arc::new(PerformanceAccumulator::new(breakers));
        let exchange = Arc::new(ScriptedExchange::new(1_000_000.0));
        let feed = Arc::new(ScriptedFeed::new(prices));
        let oracle = Arc::new(ScriptedOracle::new());
        let audit = Arc::new(MemoryAuditLog::default());
        let notifier = Arc::new(MemoryNotifier::default());
        let (tx, rx) = watch::channel(false);

        let manager = RoundManager::new(
            registry.clone(),
            performance.clone(),
            Collaborators {
                exchange: exchange.clone(),
                snapshots: feed.clone(),
                oracle: oracle.clone(),
                audit: audit.clone(),
                notifier: notifier.clone(),
            },
            settings,
            BackoffSchedule::default(),
            rx,
        );

        Self {
            manager,
            registry,
            performance,
            exchange,
            feed,
            oracle,
            audit,
            notifier,
            shutdown: Arc::new(tx),
        }
    }

    /// Signal shutdown after `delay` of (paused) tokio time
    pub fn cancel_after(&self, delay: Duration) {
        let tx = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send_replace(true);
        });
    }
}
