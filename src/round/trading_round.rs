use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::oracle::PositionView;
use crate::round::{
    DecisionRecord, OrderKind, OrderRecord, OrderRecordStatus, RoundMetrics, RoundStatus,
    StatusChange,
};

/// One attempted trade, from opportunity search through exit.
///
/// `status` only moves along the transition table. Order records are attached
/// together with the transition that implies them, so `entry_order` is present
/// exactly when the round has reached `EntryOrdered` (and `exit_order` when it
/// has reached `ExitOrdered`). Orders detached by a rollback are kept in
/// `abandoned_orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: Uuid,
    pub symbol: String,
    status: RoundStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
    entry_order: Option<OrderRecord>,
    exit_order: Option<OrderRecord>,
    abandoned_orders: Vec<OrderRecord>,
    decision_history: Vec<DecisionRecord>,
    pub entry_reason: Option<String>,
    pub entry_reasons: Vec<String>,
    pub exit_reason: Option<String>,
    pub exit_reasons: Vec<String>,
    metrics: Option<RoundMetrics>,
    transitions: Vec<StatusChange>,
}

impl Round {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::new_at(symbol, None)
    }

    /// Create a round with an explicit start time
    ///
    /// # Arguments
    /// * `timestamp` - Optional start time. If None, uses Utc::now()
    pub fn new_at(symbol: impl Into<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            status: RoundStatus::Created,
            start_time: timestamp.unwrap_or_else(Utc::now),
            end_time: None,
            take_profit: None,
            stop_loss: None,
            entry_order: None,
            exit_order: None,
            abandoned_orders: Vec::new(),
            decision_history: Vec::new(),
            entry_reason: None,
            entry_reasons: Vec::new(),
            exit_reason: None,
            exit_reasons: Vec::new(),
            metrics: None,
            transitions: Vec::new(),
        }
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    pub fn entry_order(&self) -> Option<&OrderRecord> {
        self.entry_order.as_ref()
    }

    pub fn exit_order(&self) -> Option<&OrderRecord> {
        self.exit_order.as_ref()
    }

    pub fn abandoned_orders(&self) -> &[OrderRecord] {
        &self.abandoned_orders
    }

    pub fn decision_history(&self) -> &[DecisionRecord] {
        &self.decision_history
    }

    pub fn metrics(&self) -> Option<&RoundMetrics> {
        self.metrics.as_ref()
    }

    pub fn transitions(&self) -> &[StatusChange] {
        &self.transitions
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fails if `expected` is not the current status
    pub fn ensure_status(&self, expected: RoundStatus) -> Result<()> {
        if self.status != expected {
            return Err(Error::InvalidState {
                round_id: self.id,
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }

    /// Move to `target` if the table allows it; status is untouched otherwise
    pub fn transition_to(&mut self, target: RoundStatus, reason: impl Into<String>) -> Result<()> {
        self.transition_at(target, reason.into(), Vec::new(), Utc::now())
    }

    /// Transition that also stores the oracle rationale behind it
    /// (`EntryReady` fills `entry_reasons`, `ExitReady` fills `exit_reasons`)
    pub fn transition_with_rationale(
        &mut self,
        target: RoundStatus,
        reason: impl Into<String>,
        rationale: Vec<String>,
    ) -> Result<()> {
        self.transition_at(target, reason.into(), rationale, Utc::now())
    }

    fn transition_at(
        &mut self,
        target: RoundStatus,
        reason: String,
        rationale: Vec<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let from = self.status;
        if !from.can_transition_to(target) {
            return Err(Error::InvalidTransition { from, to: target });
        }

        match target {
            RoundStatus::EntryReady => {
                self.entry_reason = Some(reason.clone());
                self.entry_reasons = rationale;
            }
            RoundStatus::ExitReady => {
                self.exit_reasons = rationale;
            }
            RoundStatus::Completed => {
                self.end_time = Some(at);
                self.exit_reason = Some(reason.clone());
            }
            RoundStatus::Failed => {
                self.end_time = Some(at);
                self.exit_reason = Some(format!("failed: {}", reason));
            }
            _ => {}
        }

        // Rolling back below an *Ordered state detaches the in-flight order
        if from == RoundStatus::EntryOrdered && target == RoundStatus::Watching {
            self.abandon(OrderKind::Entry);
        }
        if from == RoundStatus::ExitOrdered && target == RoundStatus::Holding {
            self.abandon(OrderKind::Exit);
        }
        if target == RoundStatus::Watching && from.is_rollback(target) {
            self.take_profit = None;
            self.stop_loss = None;
        }

        self.status = target;
        self.transitions.push(StatusChange {
            from,
            to: target,
            reason,
            at,
        });

        tracing::debug!(
            round_id = %self.id,
            symbol = %self.symbol,
            "Round {} -> {}",
            from,
            target
        );

        Ok(())
    }

    fn abandon(&mut self, kind: OrderKind) {
        let slot = match kind {
            OrderKind::Entry => self.entry_order.take(),
            OrderKind::Exit => self.exit_order.take(),
        };
        if let Some(mut record) = slot {
            if record.status == OrderRecordStatus::Pending {
                record.status = OrderRecordStatus::Failed;
            }
            self.abandoned_orders.push(record);
        }
    }

    /// Store take-profit/stop-loss for the upcoming entry.
    ///
    /// Only while watching, and only when `take_profit > reference_price > stop_loss`.
    pub fn set_targets(&mut self, take_profit: f64, stop_loss: f64, reference_price: f64) -> Result<()> {
        self.ensure_status(RoundStatus::Watching)?;
        if !(take_profit > reference_price && reference_price > stop_loss) {
            return Err(Error::InvalidJudgment(format!(
                "targets {} / {} do not bracket price {}",
                take_profit, stop_loss, reference_price
            )));
        }
        self.take_profit = Some(take_profit);
        self.stop_loss = Some(stop_loss);
        Ok(())
    }

    /// EntryReady -> EntryOrdered, attaching the submitted order
    pub fn mark_entry_ordered(&mut self, record: OrderRecord) -> Result<()> {
        self.transition_to(RoundStatus::EntryOrdered, format!("entry order {}", record.order_id))?;
        self.entry_order = Some(record);
        Ok(())
    }

    /// EntryOrdered -> Holding, replacing the pending record with the fill
    pub fn confirm_entry(&mut self, filled: OrderRecord) -> Result<()> {
        let reason = format!(
            "entry filled {} @ {:.2}",
            filled.filled_volume, filled.average_price
        );
        self.transition_to(RoundStatus::Holding, reason)?;
        self.entry_order = Some(filled);
        Ok(())
    }

    /// ExitReady -> ExitOrdered, attaching the submitted order
    pub fn mark_exit_ordered(&mut self, record: OrderRecord) -> Result<()> {
        self.transition_to(RoundStatus::ExitOrdered, format!("exit order {}", record.order_id))?;
        self.exit_order = Some(record);
        Ok(())
    }

    /// ExitOrdered -> Completed with metrics recomputed from the exit fill
    pub fn confirm_exit(&mut self, filled: OrderRecord, reason: impl Into<String>) -> Result<()> {
        self.ensure_status(RoundStatus::ExitOrdered)?;
        let completed_at = Utc::now();
        if let Some(entry) = &self.entry_order {
            self.metrics = Some(RoundMetrics::compute(
                entry.average_price,
                entry.filled_volume,
                filled.average_price,
                minutes_between(entry.submitted_at, completed_at),
                self.metrics.as_ref(),
            ));
        }
        self.transition_at(RoundStatus::Completed, reason.into(), Vec::new(), completed_at)?;
        self.exit_order = Some(filled);
        Ok(())
    }

    /// Set the in-flight order's status before a rollback detaches it
    pub fn set_pending_order_status(&mut self, kind: OrderKind, status: OrderRecordStatus) {
        let slot = match kind {
            OrderKind::Entry => self.entry_order.as_mut(),
            OrderKind::Exit => self.exit_order.as_mut(),
        };
        if let Some(record) = slot {
            if record.status == OrderRecordStatus::Pending {
                record.status = status;
            }
        }
    }

    pub fn record_decision(&mut self, record: DecisionRecord) {
        self.decision_history.push(record);
    }

    /// Recompute metrics against `current_price` while a position is open
    pub fn update_metrics(&mut self, current_price: f64) -> Option<&RoundMetrics> {
        self.update_metrics_at(current_price, None)
    }

    pub fn update_metrics_at(
        &mut self,
        current_price: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Option<&RoundMetrics> {
        let entry = self.entry_order.as_ref().filter(|o| o.is_filled())?;
        let now = timestamp.unwrap_or_else(Utc::now);
        let metrics = RoundMetrics::compute(
            entry.average_price,
            entry.filled_volume,
            current_price,
            minutes_between(entry.submitted_at, now),
            self.metrics.as_ref(),
        );
        self.metrics = Some(metrics);
        self.metrics.as_ref()
    }

    /// Position as seen by an exit decision; None until the entry is filled
    pub fn position_view(&self, now: DateTime<Utc>) -> Option<PositionView> {
        let entry = self.entry_order.as_ref().filter(|o| o.is_filled())?;
        Some(PositionView {
            symbol: self.symbol.clone(),
            entry_price: entry.average_price,
            volume: entry.filled_volume,
            take_profit: self.take_profit,
            stop_loss: self.stop_loss,
            holding_minutes: minutes_between(entry.submitted_at, now),
            metrics: self.metrics.clone(),
        })
    }

    /// Minutes since start, or total duration once finished
    pub fn duration_minutes(&self) -> f64 {
        minutes_between(self.start_time, self.end_time.unwrap_or_else(Utc::now))
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{EntryJudgment, Judgment};
    use crate::round::DecisionOutcome;

    fn pending(order_id: &str, kind: OrderKind) -> OrderRecord {
        OrderRecord {
            order_id: order_id.to_string(),
            submitted_at: Utc::now(),
            average_price: 0.0,
            filled_volume: 0.0,
            fee: 0.0,
            kind,
            status: OrderRecordStatus::Pending,
        }
    }

    fn filled(order_id: &str, kind: OrderKind, price: f64, volume: f64) -> OrderRecord {
        OrderRecord {
            average_price: price,
            filled_volume: volume,
            status: OrderRecordStatus::Completed,
            ..pending(order_id, kind)
        }
    }

    fn round_in_entry_ready() -> Round {
        let mut round = Round::new("BTC");
        round.transition_to(RoundStatus::Watching, "watch").unwrap();
        round
            .set_targets(101_000_000.0, 98_500_000.0, 100_000_000.0)
            .unwrap();
        round
            .transition_with_rationale(
                RoundStatus::EntryReady,
                "entry signal",
                vec!["breakout".to_string()],
            )
            .unwrap();
        round
    }

    #[test]
    fn test_invalid_transition_leaves_status_unchanged() {
        let mut round = Round::new("BTC");

        let err = round
            .transition_to(RoundStatus::Holding, "skip ahead")
            .unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: RoundStatus::Created,
                to: RoundStatus::Holding
            }
        ));
        assert_eq!(round.status(), RoundStatus::Created);
        assert!(round.transitions().is_empty());
    }

    #[test]
    fn test_entry_ready_stores_rationale() {
        let round = round_in_entry_ready();

        assert_eq!(round.entry_reasons, vec!["breakout".to_string()]);
        assert_eq!(round.entry_reason.as_deref(), Some("entry signal"));
        assert!(round.entry_order().is_none());
    }

    #[test]
    fn test_entry_order_attached_with_transition() {
        let mut round = round_in_entry_ready();

        round.mark_entry_ordered(pending("e1", OrderKind::Entry)).unwrap();
        assert_eq!(round.status(), RoundStatus::EntryOrdered);
        assert!(round.entry_order().is_some());

        round
            .confirm_entry(filled("e1", OrderKind::Entry, 100.0, 2.0))
            .unwrap();
        assert_eq!(round.status(), RoundStatus::Holding);
        assert!(round.entry_order().unwrap().is_filled());
    }

    #[test]
    fn test_rollback_detaches_entry_order() {
        let mut round = round_in_entry_ready();
        round.mark_entry_ordered(pending("e1", OrderKind::Entry)).unwrap();

        round.set_pending_order_status(OrderKind::Entry, OrderRecordStatus::Canceled);
        round
            .transition_to(RoundStatus::Watching, "entry order canceled")
            .unwrap();

        assert_eq!(round.status(), RoundStatus::Watching);
        assert!(round.entry_order().is_none());
        assert_eq!(round.abandoned_orders().len(), 1);
        assert_eq!(
            round.abandoned_orders()[0].status,
            OrderRecordStatus::Canceled
        );
        assert!(round.take_profit().is_none());
    }

    #[test]
    fn test_set_targets_requires_bracketing() {
        let mut round = Round::new("BTC");
        round.transition_to(RoundStatus::Watching, "watch").unwrap();

        assert!(round.set_targets(100.0, 99.0, 100.0).is_err());
        assert!(round.set_targets(101.0, 100.0, 100.0).is_err());
        assert!(round.take_profit().is_none());
        assert!(round.set_targets(101.0, 99.0, 100.0).is_ok());
    }

    #[test]
    fn test_terminal_transitions_set_end_time_and_reason() {
        let mut round = Round::new("BTC");
        round.transition_to(RoundStatus::Failed, "watch timeout").unwrap();

        assert!(round.end_time.is_some());
        assert_eq!(round.exit_reason.as_deref(), Some("failed: watch timeout"));
        assert!(round.transition_to(RoundStatus::Watching, "again").is_err());
    }

    #[test]
    fn test_confirm_exit_computes_metrics() {
        let mut round = round_in_entry_ready();
        round.mark_entry_ordered(pending("e1", OrderKind::Entry)).unwrap();
        round
            .confirm_entry(filled("e1", OrderKind::Entry, 100.0, 2.0))
            .unwrap();
        round.update_metrics(97.0);
        round
            .transition_with_rationale(RoundStatus::ExitReady, "exit", vec!["target".into()])
            .unwrap();
        round.mark_exit_ordered(pending("x1", OrderKind::Exit)).unwrap();

        round
            .confirm_exit(filled("x1", OrderKind::Exit, 103.0, 2.0), "target reached")
            .unwrap();

        let metrics = round.metrics().unwrap();
        assert_eq!(round.status(), RoundStatus::Completed);
        assert!((metrics.profit_loss_rate - 3.0).abs() < 1e-9);
        assert!((metrics.max_loss_rate + 3.0).abs() < 1e-9);
        assert_eq!(round.exit_reason.as_deref(), Some("target reached"));
        assert_eq!(round.exit_reasons, vec!["target".to_string()]);
    }

    #[test]
    fn test_round_survives_json_round_trip() {
        let mut round = round_in_entry_ready();
        round.mark_entry_ordered(pending("e1", OrderKind::Entry)).unwrap();
        round
            .confirm_entry(filled("e1", OrderKind::Entry, 100.0, 2.0))
            .unwrap();
        for (i, outcome) in [DecisionOutcome::Declined, DecisionOutcome::Accepted]
            .into_iter()
            .enumerate()
        {
            round.record_decision(DecisionRecord {
                at: Utc::now(),
                price: 100.0 + i as f64,
                judgment: Judgment::Entry(EntryJudgment::decline(vec![format!("#{}", i)])),
                outcome,
            });
        }
        // Peak +4%, trough -3%, currently +1%
        for price in [104.0, 97.0, 101.0] {
            round.update_metrics(price);
        }

        let json = serde_json::to_string(&round).unwrap();
        let restored: Round = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, round.id);
        assert_eq!(restored.status(), RoundStatus::Holding);
        assert_eq!(restored.decision_history(), round.decision_history());
        let n = restored.decision_history().len();
        assert_eq!(restored.decision_history()[n - 1].price, 101.0);

        let metrics = restored.metrics().unwrap();
        assert_eq!(restored.metrics(), round.metrics());
        assert!((metrics.profit_loss_rate - 1.0).abs() < 1e-9);
        assert!((metrics.max_profit_rate - 4.0).abs() < 1e-9);
        assert!((metrics.max_loss_rate + 3.0).abs() < 1e-9);
    }
}
