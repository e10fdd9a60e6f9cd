use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::round::{Round, RoundMetrics, RoundStatus};

/// Condensed view of a round for reports and notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundSummary {
    pub round_id: Uuid,
    pub symbol: String,
    pub status: RoundStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: f64,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub metrics: Option<RoundMetrics>,
    pub exit_reason: Option<String>,
    pub decision_count: usize,
    pub abandoned_orders: usize,
}

impl From<&Round> for RoundSummary {
    fn from(round: &Round) -> Self {
        Self {
            round_id: round.id,
            symbol: round.symbol.clone(),
            status: round.status(),
            start_time: round.start_time,
            end_time: round.end_time,
            duration_minutes: round.duration_minutes(),
            entry_price: round.entry_order().map(|o| o.average_price),
            exit_price: round.exit_order().map(|o| o.average_price),
            take_profit: round.take_profit(),
            stop_loss: round.stop_loss(),
            metrics: round.metrics().cloned(),
            exit_reason: round.exit_reason.clone(),
            decision_count: round.decision_history().len(),
            abandoned_orders: round.abandoned_orders().len(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    active: HashMap<Uuid, Round>,
    completed: VecDeque<Round>,
}

impl RegistryState {
    fn live_count(&self) -> usize {
        self.active.values().filter(|r| !r.is_terminal()).count()
    }

    fn push_completed(&mut self, round: Round, capacity: usize) {
        self.completed.push_back(round);
        while self.completed.len() > capacity {
            self.completed.pop_front();
        }
    }

    /// Move any terminal rounds still sitting in the active map into history
    fn sweep(&mut self, capacity: usize) {
        let finished: Vec<Uuid> = self
            .active
            .iter()
            .filter(|(_, r)| r.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in finished {
            if let Some(round) = self.active.remove(&id) {
                self.push_completed(round, capacity);
            }
        }
    }
}

/// Bounds concurrently active rounds and keeps a short history of finished ones.
///
/// All bookkeeping sits behind one mutex. Closures passed to
/// [`RoundRegistry::with_round_mut`] run under that lock and must not await.
pub struct RoundRegistry {
    state: Mutex<RegistryState>,
    max_active_rounds: usize,
    history_capacity: usize,
}

impl RoundRegistry {
    pub fn new(max_active_rounds: usize, history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_active_rounds,
            history_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new round; rejected (not queued) when at capacity or when
    /// the symbol already has a live round
    pub fn create(&self, symbol: &str) -> Result<Uuid> {
        self.create_at(symbol, None)
    }

    pub fn create_at(&self, symbol: &str, timestamp: Option<DateTime<Utc>>) -> Result<Uuid> {
        let mut state = self.lock();
        state.sweep(self.history_capacity);

        if state.active.values().any(|r| r.symbol == symbol) {
            return Err(Error::SymbolActive(symbol.to_string()));
        }
        if state.live_count() >= self.max_active_rounds {
            return Err(Error::RegistryFull(self.max_active_rounds));
        }

        let round = Round::new_at(symbol, timestamp);
        let id = round.id;
        state.active.insert(id, round);

        tracing::info!(round_id = %id, symbol, "Created round");
        Ok(id)
    }

    /// Run `f` against an active round under the registry lock
    pub fn with_round_mut<T>(&self, id: Uuid, f: impl FnOnce(&mut Round) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        let round = state.active.get_mut(&id).ok_or(Error::RoundNotFound(id))?;
        f(round)
    }

    /// Clone of an active or retired round
    pub fn get(&self, id: Uuid) -> Option<Round> {
        let state = self.lock();
        state
            .active
            .get(&id)
            .or_else(|| state.completed.iter().find(|r| r.id == id))
            .cloned()
    }

    pub fn status(&self, id: Uuid) -> Option<RoundStatus> {
        self.get(id).map(|r| r.status())
    }

    pub fn active_for_symbol(&self, symbol: &str) -> Option<Uuid> {
        self.lock()
            .active
            .values()
            .find(|r| r.symbol == symbol && !r.is_terminal())
            .map(|r| r.id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().live_count()
    }

    /// Move a finished round into history, evicting the oldest entry past capacity
    pub fn retire(&self, id: Uuid) -> Result<Round> {
        let mut state = self.lock();
        let round = state.active.get(&id).ok_or(Error::RoundNotFound(id))?;
        if !round.is_terminal() {
            return Err(Error::InvalidState {
                round_id: id,
                expected: RoundStatus::Completed,
                actual: round.status(),
            });
        }

        let round = state.active.remove(&id).ok_or(Error::RoundNotFound(id))?;
        state.push_completed(round.clone(), self.history_capacity);
        Ok(round)
    }

    /// Retired rounds, oldest first
    pub fn completed(&self) -> Vec<Round> {
        self.lock().completed.iter().cloned().collect()
    }

    pub fn summary(&self, id: Uuid) -> Option<RoundSummary> {
        self.get(id).as_ref().map(RoundSummary::from)
    }
}
