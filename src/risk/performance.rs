use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::risk::{CircuitBreakers, StopReason};
use crate::round::OrderRecord;

/// Running totals across completed rounds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceState {
    pub cumulative_pnl: f64,
    pub trade_count: u32,
    pub win_count: u32,
    pub loss_count: u32,
    pub consecutive_losses: u32,
    pub cumulative_entry_value: f64,
    pub cumulative_exit_value: f64,
    pub cumulative_fees: f64,
    pub cumulative_elapsed_seconds: f64,
}

impl PerformanceState {
    /// (exit value - entry value) / entry value, as a fraction
    pub fn profit_rate(&self) -> f64 {
        if self.cumulative_entry_value > 0.0 {
            (self.cumulative_exit_value - self.cumulative_entry_value) / self.cumulative_entry_value
        } else {
            0.0
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.trade_count > 0 {
            self.win_count as f64 / self.trade_count as f64
        } else {
            0.0
        }
    }
}

/// Outcome of one recorded round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    pub entry_price: f64,
    pub exit_price: f64,
    pub volume: f64,
    pub fee: f64,
    pub pnl: f64,
    pub is_win: bool,
    pub holding_seconds: f64,
    /// Totals after this round was applied
    pub state: PerformanceState,
    /// Set when this record tripped (or found already tripped) the breaker
    pub stop_reason: Option<StopReason>,
    /// True only for the record that set the stop flag
    #[serde(default)]
    pub tripped: bool,
}

struct AccumulatorInner {
    state: PerformanceState,
    halted: Option<StopReason>,
    /// Running time carried over from a restored state
    carried_elapsed_seconds: f64,
    started_at: DateTime<Utc>,
}

/// Realized P&L tracker and stop-trading flag shared by all round tasks.
///
/// State changes only through [`PerformanceAccumulator::record`]; readers get
/// copies via [`PerformanceAccumulator::snapshot`].
pub struct PerformanceAccumulator {
    breakers: CircuitBreakers,
    inner: Mutex<AccumulatorInner>,
}

impl PerformanceAccumulator {
    pub fn new(breakers: CircuitBreakers) -> Self {
        Self::with_state(breakers, PerformanceState::default())
    }

    /// Resume from previously persisted totals
    pub fn with_state(breakers: CircuitBreakers, state: PerformanceState) -> Self {
        tracing::info!(
            "Restored performance state ({} trades, P&L: {:.2})",
            state.trade_count,
            state.cumulative_pnl
        );

        let carried_elapsed_seconds = state.cumulative_elapsed_seconds;
        Self {
            breakers,
            inner: Mutex::new(AccumulatorInner {
                state,
                halted: None,
                carried_elapsed_seconds,
                started_at: Utc::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AccumulatorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, entry: &OrderRecord, exit: &OrderRecord) -> RoundResult {
        self.record_at(entry, exit, None)
    }

    /// Apply one completed round and re-check the breakers
    ///
    /// # Arguments
    /// * `timestamp` - Optional "now" used for running time. If None, uses Utc::now()
    pub fn record_at(
        &self,
        entry: &OrderRecord,
        exit: &OrderRecord,
        timestamp: Option<DateTime<Utc>>,
    ) -> RoundResult {
        let now = timestamp.unwrap_or_else(Utc::now);
        let volume = entry.filled_volume;
        let fee = entry.fee + exit.fee;
        let pnl = (exit.average_price - entry.average_price) * volume - fee;
        let is_win = pnl > 0.0;

        let mut inner = self.lock();
        let elapsed = (now - inner.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        let carried = inner.carried_elapsed_seconds;

        let state = &mut inner.state;
        state.trade_count += 1;
        if is_win {
            state.win_count += 1;
            state.consecutive_losses = 0;
        } else {
            state.loss_count += 1;
            state.consecutive_losses += 1;
        }
        state.cumulative_pnl += pnl;
        state.cumulative_fees += fee;
        state.cumulative_entry_value += entry.average_price * volume;
        state.cumulative_exit_value += exit.average_price * volume;
        state.cumulative_elapsed_seconds = carried + elapsed;

        let mut tripped = false;
        if let Err(reason) = self.breakers.check(&inner.state) {
            if inner.halted.is_none() {
                tracing::warn!(
                    "🛑 Circuit breaker tripped: {} ({} trades, win rate {:.1}%, profit rate {:.2}%)",
                    reason,
                    inner.state.trade_count,
                    inner.state.win_rate() * 100.0,
                    inner.state.profit_rate() * 100.0
                );
                inner.halted = Some(reason);
                tripped = true;
            }
        }

        RoundResult {
            entry_price: entry.average_price,
            exit_price: exit.average_price,
            volume,
            fee,
            pnl,
            is_win,
            holding_seconds: (exit.submitted_at - entry.submitted_at)
                .num_milliseconds()
                .max(0) as f64
                / 1000.0,
            state: inner.state.clone(),
            stop_reason: inner.halted,
            tripped,
        }
    }

    pub fn halted(&self) -> Option<StopReason> {
        self.lock().halted
    }

    /// Err while the stop flag is set
    pub fn ensure_trading_allowed(&self) -> Result<()> {
        match self.halted() {
            Some(reason) => Err(Error::StopReasonTripped(reason)),
            None => Ok(()),
        }
    }

    /// Manually re-enable trading; counters are kept
    pub fn clear_stop(&self) {
        let mut inner = self.lock();
        if let Some(reason) = inner.halted.take() {
            tracing::info!("Circuit breaker cleared (was: {})", reason);
        }
    }

    pub fn snapshot(&self) -> PerformanceState {
        self.lock().state.clone()
    }
}
