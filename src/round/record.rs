use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ExchangeOrder, OrderHandle, OrderState};
use crate::oracle::Judgment;
use crate::round::RoundStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRecordStatus {
    Pending,
    Completed,
    Canceled,
    Failed,
}

/// The round's view of one exchange order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub submitted_at: DateTime<Utc>,
    pub average_price: f64,
    pub filled_volume: f64,
    pub fee: f64,
    pub kind: OrderKind,
    pub status: OrderRecordStatus,
}

impl OrderRecord {
    /// Record for a submitted order whose outcome is not known yet
    pub fn pending(handle: &OrderHandle, kind: OrderKind) -> Self {
        Self {
            order_id: handle.order_id.clone(),
            submitted_at: handle.created_at,
            average_price: 0.0,
            filled_volume: 0.0,
            fee: 0.0,
            kind,
            status: OrderRecordStatus::Pending,
        }
    }

    pub fn from_exchange(order: &ExchangeOrder, kind: OrderKind) -> Self {
        let status = match order.state {
            OrderState::Done => OrderRecordStatus::Completed,
            OrderState::Wait => OrderRecordStatus::Pending,
            OrderState::Cancel => OrderRecordStatus::Canceled,
            OrderState::Error => OrderRecordStatus::Failed,
        };

        Self {
            order_id: order.order_id.clone(),
            submitted_at: order.created_at,
            average_price: order.average_price.unwrap_or(0.0),
            filled_volume: order.executed_volume,
            fee: order.paid_fee,
            kind,
            status,
        }
    }

    /// Quote value of the fill, fees excluded
    pub fn notional(&self) -> f64 {
        self.average_price * self.filled_volume
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderRecordStatus::Completed
    }
}

/// Snapshot of an open or closed position's performance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundMetrics {
    pub entry_price: f64,
    pub current_price: f64,
    pub profit_loss: f64,
    /// Percent, e.g. 1.1 for +1.1%
    pub profit_loss_rate: f64,
    pub holding_minutes: f64,
    pub max_profit_rate: f64,
    pub max_loss_rate: f64,
}

impl RoundMetrics {
    /// Compute a fresh snapshot, carrying the extremes of `previous` forward
    pub fn compute(
        entry_price: f64,
        volume: f64,
        current_price: f64,
        holding_minutes: f64,
        previous: Option<&RoundMetrics>,
    ) -> Self {
        let profit_loss = (current_price - entry_price) * volume;
        let profit_loss_rate = if entry_price > 0.0 {
            (current_price - entry_price) / entry_price * 100.0
        } else {
            0.0
        };

        let (max_profit_rate, max_loss_rate) = match previous {
            Some(prev) => (
                prev.max_profit_rate.max(profit_loss_rate),
                prev.max_loss_rate.min(profit_loss_rate),
            ),
            None => (profit_loss_rate, profit_loss_rate),
        };

        Self {
            entry_price,
            current_price,
            profit_loss,
            profit_loss_rate,
            holding_minutes,
            max_profit_rate,
            max_loss_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Accepted,
    Declined,
    Rejected(String),
}

/// One oracle judgment as received, with what the round did about it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub at: DateTime<Utc>,
    pub price: f64,
    pub judgment: Judgment,
    pub outcome: DecisionOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub from: RoundStatus,
    pub to: RoundStatus,
    pub reason: String,
    pub at: DateTime<Utc>,
}
