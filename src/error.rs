use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderState;
use crate::risk::StopReason;
use crate::round::RoundStatus;

/// Errors raised by the round engine and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Transition not in the allowed table. Logic error, never retried.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: RoundStatus, to: RoundStatus },

    #[error("round {round_id} is {actual}, expected {expected}")]
    InvalidState {
        round_id: Uuid,
        expected: RoundStatus,
        actual: RoundStatus,
    },

    #[error("round {0} not found")]
    RoundNotFound(Uuid),

    #[error("insufficient {currency} balance: {free}")]
    InsufficientBalance { currency: String, free: f64 },

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("order {order_id} not filled: {state}")]
    OrderNotFilled { order_id: String, state: OrderState },

    #[error("order {order_id} still pending after {attempts} attempts")]
    OrderTimeout { order_id: String, attempts: usize },

    /// The final confirmation attempt could not read the order at all
    #[error("order {order_id} state unknown after {attempts} attempts: {last_error}")]
    OrderStateUnknown {
        order_id: String,
        attempts: usize,
        last_error: String,
    },

    #[error("decision oracle error: {0}")]
    Oracle(String),

    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("invalid entry judgment: {0}")]
    InvalidJudgment(String),

    #[error("no entry within {0} minutes")]
    WatchTimeout(u64),

    #[error("monitor gave up after {0} consecutive oracle errors")]
    MonitorFailed(u32),

    #[error("trading halted: {0}")]
    StopReasonTripped(StopReason),

    #[error("round registry at capacity ({0} active)")]
    RegistryFull(usize),

    #[error("a round is already active for {0}")]
    SymbolActive(String),

    #[error("cancelled")]
    Cancelled,

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Collaborator hiccups that are retried in place without a state change
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Oracle(_) | Error::DataUnavailable(_) | Error::Exchange(_)
        )
    }

    /// Exchange-side order outcomes that trigger a compensating rollback
    pub fn is_order_failure(&self) -> bool {
        matches!(
            self,
            Error::OrderRejected(_) | Error::OrderNotFilled { .. } | Error::OrderTimeout { .. }
        )
    }

    /// Errors after which the round must not continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidTransition { .. } | Error::OrderStateUnknown { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
