use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditLog};
use crate::config::TradingSettings;
use crate::error::{Error, Result};
use crate::exchange::{ExchangeClient, MarketSnapshotProvider};
use crate::execution::{poll_until, BackoffSchedule, OrderConfirmer, OrderExecutor, PollError, PollPolicy, Step};
use crate::models::OrderState;
use crate::notify::{Notification, Notifier};
use crate::oracle::{DecisionOracle, Judgment};
use crate::risk::{PerformanceAccumulator, RoundResult};
use crate::round::{
    DecisionOutcome, DecisionRecord, OrderKind, OrderRecord, OrderRecordStatus, Round,
    RoundRegistry, RoundStatus, RoundSummary,
};

/// External services a [`RoundManager`] talks to
pub struct Collaborators {
    pub exchange: Arc<dyn ExchangeClient>,
    pub snapshots: Arc<dyn MarketSnapshotProvider>,
    pub oracle: Arc<dyn DecisionOracle>,
    pub audit: Arc<dyn AuditLog>,
    pub notifier: Arc<dyn Notifier>,
}

/// Final state of a retired round
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub summary: RoundSummary,
    /// Present when the round completed and was recorded
    pub result: Option<RoundResult>,
}

/// Drives rounds through watch, entry, hold and exit.
///
/// Each phase catches its own failures and either rolls the round back
/// (`EntryReady`/`EntryOrdered` -> `Watching`, `ExitReady`/`ExitOrdered` ->
/// `Holding`) or fails it when no safe rollback exists. Round mutations go
/// through the registry lock, which is never held across an await.
///
/// Shutdown is only observed inside the watch and monitor poll loops, so a
/// cancelled round is left `Watching` or `Holding`.
pub struct RoundManager {
    registry: Arc<RoundRegistry>,
    performance: Arc<PerformanceAccumulator>,
    snapshots: Arc<dyn MarketSnapshotProvider>,
    oracle: Arc<dyn DecisionOracle>,
    executor: OrderExecutor,
    confirmer: OrderConfirmer,
    audit: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
    settings: TradingSettings,
    shutdown: watch::Receiver<bool>,
}

impl RoundManager {
    pub fn new(
        registry: Arc<RoundRegistry>,
        performance: Arc<PerformanceAccumulator>,
        collaborators: Collaborators,
        settings: TradingSettings,
        schedule: BackoffSchedule,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let executor = OrderExecutor::new(
            collaborators.exchange.clone(),
            settings.quote_currency.clone(),
            settings.entry_fraction,
        );
        let confirmer = OrderConfirmer::new(collaborators.exchange, schedule);

        Self {
            registry,
            performance,
            snapshots: collaborators.snapshots,
            oracle: collaborators.oracle,
            executor,
            confirmer,
            audit: collaborators.audit,
            notifier: collaborators.notifier,
            settings,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<RoundRegistry> {
        &self.registry
    }

    pub fn performance(&self) -> &Arc<PerformanceAccumulator> {
        &self.performance
    }

    // ========================================================================
    // Driver
    // ========================================================================

    /// Create a round for `symbol` and drive it to a terminal state.
    ///
    /// Refused with `StopReasonTripped` while the circuit breaker is set.
    pub async fn run_round(&self, symbol: &str) -> Result<RoundOutcome> {
        let id = self.create_round(symbol).await?;
        self.resume(id).await
    }

    /// Continue an existing round from `Created`, `Watching` or `Holding`.
    ///
    /// A round that ends terminal (completed or failed) is retired before
    /// returning; a failed round still returns the error that failed it.
    pub async fn resume(&self, id: Uuid) -> Result<RoundOutcome> {
        let driven = self.drive(id).await;

        if self.registry.status(id).is_some_and(|s| s.is_terminal()) {
            let outcome = self.finish(id).await?;
            driven?;
            return Ok(outcome);
        }

        driven?;
        let actual = self.registry.status(id).ok_or(Error::RoundNotFound(id))?;
        Err(Error::InvalidState {
            round_id: id,
            expected: RoundStatus::Completed,
            actual,
        })
    }

    async fn drive(&self, id: Uuid) -> Result<()> {
        let status = self.registry.status(id).ok_or(Error::RoundNotFound(id))?;
        if matches!(status, RoundStatus::Created | RoundStatus::Watching) {
            self.watch(id).await?;
        }
        self.monitor(id).await
    }

    /// Register a new round after checking the stop flag
    pub async fn create_round(&self, symbol: &str) -> Result<Uuid> {
        self.performance.ensure_trading_allowed()?;
        let id = self.registry.create(symbol)?;

        self.audit(AuditEvent::RoundCreated {
            round_id: id,
            symbol: symbol.to_string(),
            at: Utc::now(),
        })
        .await;

        Ok(id)
    }

    // ========================================================================
    // Watch phase
    // ========================================================================

    /// Poll the oracle for an entry until one is filled.
    ///
    /// Returns once the round is `Holding`. Declines, oracle/snapshot errors
    /// and failed entry attempts wait one `poll_interval` and retry. Past
    /// `max_watch` the round fails with `WatchTimeout`.
    pub async fn watch(&self, id: Uuid) -> Result<()> {
        let symbol = self
            .mutate(id, |round| {
                match round.status() {
                    RoundStatus::Created => {
                        round.transition_to(RoundStatus::Watching, "watching for entry")?
                    }
                    RoundStatus::Watching => {}
                    actual => {
                        return Err(Error::InvalidState {
                            round_id: round.id,
                            expected: RoundStatus::Watching,
                            actual,
                        })
                    }
                }
                Ok(round.symbol.clone())
            })
            .await?;

        tracing::info!(
            round_id = %id,
            symbol = %symbol,
            "👀 Watching for entry (poll {}s, max {} min)",
            self.settings.poll_interval_secs,
            self.settings.max_watch_minutes
        );

        let policy = PollPolicy::every(self.settings.poll_interval()).with_deadline(self.settings.max_watch());
        let mut shutdown = self.shutdown.clone();
        let result = poll_until(policy, &mut shutdown, |attempt| {
            self.watch_step(id, &symbol, attempt)
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(PollError::DeadlineElapsed { steps }) => {
                tracing::warn!(round_id = %id, symbol = %symbol, steps, "Watch timed out");
                let error = Error::WatchTimeout(self.settings.max_watch_minutes);
                Err(self.fail_round(id, &symbol, "watch", "deadline", error, false).await)
            }
            Err(PollError::Cancelled) => {
                tracing::info!(round_id = %id, symbol = %symbol, "Watch cancelled");
                Err(Error::Cancelled)
            }
            Err(PollError::Step(error)) => {
                let terminal = self.registry.status(id).is_some_and(|s| s.is_terminal());
                if error.is_fatal() && !terminal {
                    return Err(self.fail_round(id, &symbol, "watch", "step", error, false).await);
                }
                Err(error)
            }
        }
    }

    async fn watch_step(&self, id: Uuid, symbol: &str, attempt: u32) -> Result<Step<()>> {
        let snapshot = match self.snapshots.snapshot(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.collaborator_failed(id, symbol, "watch", "snapshot", &e).await;
                return Ok(Step::Pending);
            }
        };

        let judgment = match self.oracle.entry(&snapshot).await {
            Ok(judgment) => judgment,
            Err(e) => {
                self.collaborator_failed(id, symbol, "watch", "oracle_entry", &e).await;
                return Ok(Step::Pending);
            }
        };

        if !judgment.should_enter {
            tracing::debug!(round_id = %id, symbol, attempt, "No entry at {:.0}", snapshot.price);
            self.record_decision(id, snapshot.price, Judgment::Entry(judgment), DecisionOutcome::Declined)
                .await?;
            return Ok(Step::Pending);
        }

        if let Err(e) = judgment.validate(snapshot.price) {
            tracing::warn!(
                round_id = %id,
                symbol,
                phase = "watch",
                step = "validate_judgment",
                "Rejected entry judgment: {}",
                e
            );
            let reason = e.to_string();
            self.record_decision(
                id,
                snapshot.price,
                Judgment::Entry(judgment),
                DecisionOutcome::Rejected(reason.clone()),
            )
            .await?;
            self.phase_failed(id, symbol, "watch", "validate_judgment", &reason).await;
            return Ok(Step::Pending);
        }

        let price = snapshot.price;
        let (target, stop, reasons) = (judgment.target_price, judgment.stop_price, judgment.reasons.clone());
        self.record_decision(id, price, Judgment::Entry(judgment), DecisionOutcome::Accepted)
            .await?;
        self.mutate(id, |round| {
            round.set_targets(target, stop, price)?;
            round.transition_with_rationale(
                RoundStatus::EntryReady,
                format!("entry signal at {:.0}", price),
                reasons,
            )
        })
        .await?;

        tracing::info!(
            round_id = %id,
            symbol,
            "🎯 Entry signal at {:.0} (target {:.0}, stop {:.0})",
            price,
            target,
            stop
        );

        match self.enter_process(id).await {
            Ok(()) => Ok(Step::Ready(())),
            // Rolled back; wait a full interval before asking again
            Err(_) if self.registry.status(id) == Some(RoundStatus::Watching) => Ok(Step::Pending),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Entry phase
    // ========================================================================

    /// Size, submit and confirm the entry order.
    ///
    /// On success the round is `Holding`. Any failure before a fill rolls the
    /// round back to `Watching` and is returned; an unreadable final order
    /// state fails the round.
    pub async fn enter_process(&self, id: Uuid) -> Result<()> {
        let symbol = self.symbol_in(id, RoundStatus::EntryReady)?;

        let request = match self.executor.entry_request(&symbol).await {
            Ok(request) => request,
            Err(e) => return Err(self.roll_back(id, &symbol, OrderKind::Entry, "size_order", e).await),
        };

        let handle = match self.executor.submit(&request).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.roll_back(id, &symbol, OrderKind::Entry, "submit_order", e).await),
        };

        // No cancellation point between here and the confirmation result
        self.mutate(id, |round| {
            round.mark_entry_ordered(OrderRecord::pending(&handle, OrderKind::Entry))
        })
        .await?;
        self.audit(AuditEvent::OrderSubmitted {
            round_id: id,
            symbol: symbol.clone(),
            order_id: handle.order_id.clone(),
            kind: OrderKind::Entry,
            request,
            at: handle.created_at,
        })
        .await;

        let filled = match self.confirmer.confirm(&handle.order_id, OrderKind::Entry).await {
            Ok(filled) => filled,
            Err(e) if e.is_fatal() => {
                return Err(self.fail_round(id, &symbol, "enter", "confirm_order", e, true).await);
            }
            Err(e) => return Err(self.roll_back(id, &symbol, OrderKind::Entry, "confirm_order", e).await),
        };

        self.audit(AuditEvent::OrderResolved {
            round_id: id,
            symbol: symbol.clone(),
            record: filled.clone(),
        })
        .await;

        let (entry_price, volume) = (filled.average_price, filled.filled_volume);
        let (take_profit, stop_loss, reasons) = self
            .mutate(id, |round| {
                round.confirm_entry(filled)?;
                Ok((round.take_profit(), round.stop_loss(), round.entry_reasons.clone()))
            })
            .await?;

        tracing::info!(
            round_id = %id,
            symbol = %symbol,
            "🟢 Entered {:.8} @ {:.0}",
            volume,
            entry_price
        );
        self.notify(Notification::RoundStarted {
            round_id: id,
            symbol,
            entry_price,
            volume,
            take_profit,
            stop_loss,
            reasons,
        })
        .await;

        Ok(())
    }

    // ========================================================================
    // Hold / exit phase
    // ========================================================================

    /// Poll the oracle for an exit while holding, until the round completes.
    ///
    /// Failed exit attempts roll back and monitoring continues. After
    /// `max_monitor_oracle_errors` consecutive snapshot/oracle failures the
    /// loop gives up with `MonitorFailed`; the round stays `Holding` and an
    /// alert is sent.
    pub async fn monitor(&self, id: Uuid) -> Result<()> {
        let symbol = self.symbol_in(id, RoundStatus::Holding)?;
        tracing::info!(round_id = %id, symbol = %symbol, "📈 Monitoring position");

        let errors = AtomicU32::new(0);
        let policy = PollPolicy::every(self.settings.monitor_interval());
        let mut shutdown = self.shutdown.clone();
        let result = poll_until(policy, &mut shutdown, |_| {
            self.monitor_step(id, &symbol, &errors)
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(PollError::Cancelled) => {
                tracing::info!(round_id = %id, symbol = %symbol, "Monitor cancelled, position left open");
                Err(Error::Cancelled)
            }
            Err(PollError::DeadlineElapsed { steps }) => {
                let error = Error::MonitorFailed(steps);
                self.report_monitor_failure(id, &symbol, &error).await;
                Err(error)
            }
            Err(PollError::Step(error @ Error::MonitorFailed(_))) => {
                self.report_monitor_failure(id, &symbol, &error).await;
                Err(error)
            }
            Err(PollError::Step(error)) => {
                let terminal = self.registry.status(id).is_some_and(|s| s.is_terminal());
                if error.is_fatal() && !terminal {
                    return Err(self.fail_round(id, &symbol, "monitor", "step", error, true).await);
                }
                Err(error)
            }
        }
    }

    async fn monitor_step(&self, id: Uuid, symbol: &str, errors: &AtomicU32) -> Result<Step<()>> {
        let snapshot = match self.snapshots.snapshot(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.monitor_error(id, symbol, "snapshot", e, errors).await,
        };

        let price = snapshot.price;
        let position = self.registry.with_round_mut(id, |round| {
            round.update_metrics(price);
            round.position_view(Utc::now()).ok_or_else(|| Error::InvalidState {
                round_id: round.id,
                expected: RoundStatus::Holding,
                actual: round.status(),
            })
        })?;

        let judgment = match self.oracle.exit(&position, &snapshot).await {
            Ok(judgment) => judgment,
            Err(e) => return self.monitor_error(id, symbol, "oracle_exit", e, errors).await,
        };
        errors.store(0, Ordering::Relaxed);

        if !judgment.should_exit {
            self.record_decision(id, price, Judgment::Exit(judgment), DecisionOutcome::Declined)
                .await?;
            return Ok(Step::Pending);
        }

        let reasons = judgment.reasons.clone();
        self.record_decision(id, price, Judgment::Exit(judgment), DecisionOutcome::Accepted)
            .await?;
        self.mutate(id, |round| {
            round.transition_with_rationale(
                RoundStatus::ExitReady,
                format!("exit signal at {:.0}", price),
                reasons,
            )
        })
        .await?;

        tracing::info!(round_id = %id, symbol, "🎯 Exit signal at {:.0}", price);

        match self.exit_process(id).await {
            Ok(()) => Ok(Step::Ready(())),
            Err(_) if self.registry.status(id) == Some(RoundStatus::Holding) => Ok(Step::Pending),
            Err(e) => Err(e),
        }
    }

    async fn monitor_error(
        &self,
        id: Uuid,
        symbol: &str,
        step: &str,
        error: Error,
        errors: &AtomicU32,
    ) -> Result<Step<()>> {
        let count = errors.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            round_id = %id,
            symbol,
            "Monitor error {}/{}",
            count,
            self.settings.max_monitor_oracle_errors
        );
        self.collaborator_failed(id, symbol, "monitor", step, &error).await;

        if count >= self.settings.max_monitor_oracle_errors {
            return Err(Error::MonitorFailed(count));
        }
        Ok(Step::Pending)
    }

    async fn report_monitor_failure(&self, id: Uuid, symbol: &str, error: &Error) {
        tracing::error!(round_id = %id, symbol, phase = "monitor", "🚨 {}", error);
        self.phase_failed(id, symbol, "monitor", "give_up", &error.to_string())
            .await;
        self.notify(Notification::MonitorFailed {
            round_id: id,
            symbol: symbol.to_string(),
            error: error.to_string(),
        })
        .await;
    }

    /// Size, submit and confirm the exit order.
    ///
    /// On success the round is `Completed` with metrics computed from the
    /// exit fill. Failures before a fill roll back to `Holding`.
    pub async fn exit_process(&self, id: Uuid) -> Result<()> {
        let symbol = self.symbol_in(id, RoundStatus::ExitReady)?;

        let request = match self.executor.exit_request(&symbol).await {
            Ok(request) => request,
            Err(e) => return Err(self.roll_back(id, &symbol, OrderKind::Exit, "size_order", e).await),
        };

        let handle = match self.executor.submit(&request).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.roll_back(id, &symbol, OrderKind::Exit, "submit_order", e).await),
        };

        self.mutate(id, |round| {
            round.mark_exit_ordered(OrderRecord::pending(&handle, OrderKind::Exit))
        })
        .await?;
        self.audit(AuditEvent::OrderSubmitted {
            round_id: id,
            symbol: symbol.clone(),
            order_id: handle.order_id.clone(),
            kind: OrderKind::Exit,
            request,
            at: handle.created_at,
        })
        .await;

        let filled = match self.confirmer.confirm(&handle.order_id, OrderKind::Exit).await {
            Ok(filled) => filled,
            Err(e) if e.is_fatal() => {
                return Err(self.fail_round(id, &symbol, "exit", "confirm_order", e, true).await);
            }
            Err(e) => return Err(self.roll_back(id, &symbol, OrderKind::Exit, "confirm_order", e).await),
        };

        self.audit(AuditEvent::OrderResolved {
            round_id: id,
            symbol: symbol.clone(),
            record: filled.clone(),
        })
        .await;

        let exit_price = filled.average_price;
        let rate = self
            .mutate(id, |round| {
                let reason = if round.exit_reasons.is_empty() {
                    "exit signal".to_string()
                } else {
                    round.exit_reasons.join("; ")
                };
                round.confirm_exit(filled, reason)?;
                Ok(round.metrics().map(|m| m.profit_loss_rate))
            })
            .await?;

        tracing::info!(
            round_id = %id,
            symbol = %symbol,
            "🔴 Exited @ {:.0} ({:+.2}%)",
            exit_price,
            rate.unwrap_or_default()
        );
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Record a terminal round with the accumulator and move it to history
    async fn finish(&self, id: Uuid) -> Result<RoundOutcome> {
        let round = self.registry.get(id).ok_or(Error::RoundNotFound(id))?;

        let result = match (round.status(), round.entry_order(), round.exit_order()) {
            (RoundStatus::Completed, Some(entry), Some(exit)) => Some(self.performance.record(entry, exit)),
            _ => None,
        };

        let retired = self.registry.retire(id)?;
        let summary = RoundSummary::from(&retired);

        tracing::info!(
            round_id = %id,
            symbol = %summary.symbol,
            status = %summary.status,
            "🏁 Round finished after {:.1} min: {}",
            summary.duration_minutes,
            summary.exit_reason.as_deref().unwrap_or("-")
        );

        self.audit(AuditEvent::RoundFinished {
            summary: summary.clone(),
            result: result.clone(),
        })
        .await;
        self.notify(Notification::RoundFinished {
            summary: summary.clone(),
            pnl: result.as_ref().map(|r| r.pnl),
        })
        .await;

        // Only the round that tripped the breaker reports the halt
        if let Some(RoundResult {
            stop_reason: Some(reason),
            tripped: true,
            state,
            ..
        }) = result.clone()
        {
            self.audit(AuditEvent::TradingHalted {
                reason,
                state: state.clone(),
                at: Utc::now(),
            })
            .await;
            self.notify(Notification::TradingHalted { reason, state }).await;
        }

        Ok(RoundOutcome { summary, result })
    }

    // ========================================================================
    // Failure handling
    // ========================================================================

    /// Compensating rollback after a failed order attempt; returns `error`
    async fn roll_back(&self, id: Uuid, symbol: &str, kind: OrderKind, step: &str, error: Error) -> Error {
        let (phase, target) = match kind {
            OrderKind::Entry => ("enter", RoundStatus::Watching),
            OrderKind::Exit => ("exit", RoundStatus::Holding),
        };
        let order_status = match &error {
            Error::OrderNotFilled {
                state: OrderState::Cancel,
                ..
            } => OrderRecordStatus::Canceled,
            _ => OrderRecordStatus::Failed,
        };

        if error.is_order_failure() {
            tracing::warn!(round_id = %id, symbol, phase, step, "↩️ Rolling back to {}: {}", target, error);
        } else {
            // No order outcome behind this one (sizing, connectivity)
            tracing::error!(round_id = %id, symbol, phase, step, "↩️ Rolling back to {}: {}", target, error);
        }
        self.phase_failed(id, symbol, phase, step, &error.to_string()).await;

        let reason = format!("{} failed: {}", step, error);
        if let Err(e) = self
            .mutate(id, |round| {
                round.set_pending_order_status(kind, order_status);
                round.transition_to(target, reason)
            })
            .await
        {
            tracing::error!(round_id = %id, symbol, phase, "Rollback failed: {}", e);
            return e;
        }

        if kind == OrderKind::Exit {
            self.notify(Notification::ExitRolledBack {
                round_id: id,
                symbol: symbol.to_string(),
                error: format!("{}: {}", step, error),
            })
            .await;
        }

        error
    }

    /// Fail the round closed; returns `error`
    async fn fail_round(
        &self,
        id: Uuid,
        symbol: &str,
        phase: &str,
        step: &str,
        error: Error,
        position_open: bool,
    ) -> Error {
        tracing::error!(round_id = %id, symbol, phase, step, "❌ Round failed: {}", error);
        self.phase_failed(id, symbol, phase, step, &error.to_string()).await;

        let reason = format!("{}: {}", step, error);
        if let Err(e) = self
            .mutate(id, |round| round.transition_to(RoundStatus::Failed, reason))
            .await
        {
            tracing::error!(round_id = %id, symbol, phase, "Could not mark round failed: {}", e);
        }

        self.notify(Notification::RoundFailed {
            round_id: id,
            symbol: symbol.to_string(),
            error: format!("{} ({}/{})", error, phase, step),
            position_open,
        })
        .await;

        error
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn symbol_in(&self, id: Uuid, expected: RoundStatus) -> Result<String> {
        self.registry.with_round_mut(id, |round| {
            round.ensure_status(expected)?;
            Ok(round.symbol.clone())
        })
    }

    /// Mutate a round under the registry lock, then audit any transitions it made
    async fn mutate<T>(&self, id: Uuid, f: impl FnOnce(&mut Round) -> Result<T>) -> Result<T> {
        let (result, changes, symbol) = self.registry.with_round_mut(id, |round| {
            let before = round.transitions().len();
            let result = f(round);
            Ok((result, round.transitions()[before..].to_vec(), round.symbol.clone()))
        })?;

        for change in changes {
            self.audit(AuditEvent::StatusChanged {
                round_id: id,
                symbol: symbol.clone(),
                from: change.from,
                to: change.to,
                reason: change.reason,
                at: change.at,
            })
            .await;
        }

        result
    }

    async fn record_decision(
        &self,
        id: Uuid,
        price: f64,
        judgment: Judgment,
        outcome: DecisionOutcome,
    ) -> Result<()> {
        let record = DecisionRecord {
            at: Utc::now(),
            price,
            judgment,
            outcome,
        };
        let symbol = self.registry.with_round_mut(id, |round| {
            round.record_decision(record.clone());
            Ok(round.symbol.clone())
        })?;

        self.audit(AuditEvent::Decision {
            round_id: id,
            symbol,
            record,
        })
        .await;
        Ok(())
    }

    /// Snapshot or oracle call failed; the loop retries on its next poll
    async fn collaborator_failed(&self, id: Uuid, symbol: &str, phase: &str, step: &str, error: &Error) {
        if error.is_transient() {
            tracing::warn!(round_id = %id, symbol, phase, step, "{}", error);
        } else {
            tracing::error!(round_id = %id, symbol, phase, step, "Unexpected collaborator error: {}", error);
        }
        self.phase_failed(id, symbol, phase, step, &error.to_string()).await;
    }

    async fn phase_failed(&self, id: Uuid, symbol: &str, phase: &str, step: &str, error: &str) {
        self.audit(AuditEvent::PhaseFailed {
            round_id: id,
            symbol: symbol.to_string(),
            phase: phase.to_string(),
            step: step.to_string(),
            error: error.to_string(),
            at: Utc::now(),
        })
        .await;
    }

    async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.append(&event).await {
            tracing::warn!(round_id = ?event.round_id(), "Audit log write failed: {}", e);
        }
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!("Notification failed: {}", e);
        }
    }
}
