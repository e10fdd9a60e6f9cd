use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a trading round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Created,
    Watching,
    EntryReady,
    EntryOrdered,
    Holding,
    ExitReady,
    ExitOrdered,
    Completed,
    Failed,
}

impl RoundStatus {
    pub const ALL: [RoundStatus; 9] = [
        RoundStatus::Created,
        RoundStatus::Watching,
        RoundStatus::EntryReady,
        RoundStatus::EntryOrdered,
        RoundStatus::Holding,
        RoundStatus::ExitReady,
        RoundStatus::ExitOrdered,
        RoundStatus::Completed,
        RoundStatus::Failed,
    ];

    /// Targets reachable from this state in one step
    pub fn allowed_transitions(self) -> &'static [RoundStatus] {
        use RoundStatus::*;
        match self {
            Created => &[Watching, Failed],
            Watching => &[EntryReady, Failed],
            EntryReady => &[EntryOrdered, Watching, Failed],
            EntryOrdered => &[Holding, Watching, Failed],
            Holding => &[ExitReady, Failed],
            ExitReady => &[ExitOrdered, Holding, Failed],
            ExitOrdered => &[Completed, Holding, Failed],
            Completed | Failed => &[],
        }
    }

    pub fn can_transition_to(self, target: RoundStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Completed | RoundStatus::Failed)
    }

    /// Transitions that undo an in-progress phase after a failed order
    pub fn is_rollback(self, target: RoundStatus) -> bool {
        matches!(
            (self, target),
            (RoundStatus::EntryReady, RoundStatus::Watching)
                | (RoundStatus::EntryOrdered, RoundStatus::Watching)
                | (RoundStatus::ExitReady, RoundStatus::Holding)
                | (RoundStatus::ExitOrdered, RoundStatus::Holding)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Created => "created",
            RoundStatus::Watching => "watching",
            RoundStatus::EntryReady => "entry_ready",
            RoundStatus::EntryOrdered => "entry_ordered",
            RoundStatus::Holding => "holding",
            RoundStatus::ExitReady => "exit_ready",
            RoundStatus::ExitOrdered => "exit_ordered",
            RoundStatus::Completed => "completed",
            RoundStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
