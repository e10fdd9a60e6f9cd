// Append-only audit trail of round activity
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::OrderRequest;
use crate::risk::{PerformanceState, RoundResult, StopReason};
use crate::round::{DecisionRecord, OrderKind, OrderRecord, RoundStatus, RoundSummary};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    RoundCreated {
        round_id: Uuid,
        symbol: String,
        at: DateTime<Utc>,
    },
    StatusChanged {
        round_id: Uuid,
        symbol: String,
        from: RoundStatus,
        to: RoundStatus,
        reason: String,
        at: DateTime<Utc>,
    },
    Decision {
        round_id: Uuid,
        symbol: String,
        record: DecisionRecord,
    },
    OrderSubmitted {
        round_id: Uuid,
        symbol: String,
        order_id: String,
        kind: OrderKind,
        request: OrderRequest,
        at: DateTime<Utc>,
    },
    OrderResolved {
        round_id: Uuid,
        symbol: String,
        record: OrderRecord,
    },
    PhaseFailed {
        round_id: Uuid,
        symbol: String,
        phase: String,
        step: String,
        error: String,
        at: DateTime<Utc>,
    },
    RoundFinished {
        summary: RoundSummary,
        result: Option<RoundResult>,
    },
    TradingHalted {
        reason: StopReason,
        state: PerformanceState,
        at: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn round_id(&self) -> Option<Uuid> {
        match self {
            AuditEvent::RoundCreated { round_id, .. }
            | AuditEvent::StatusChanged { round_id, .. }
            | AuditEvent::Decision { round_id, .. }
            | AuditEvent::OrderSubmitted { round_id, .. }
            | AuditEvent::OrderResolved { round_id, .. }
            | AuditEvent::PhaseFailed { round_id, .. } => Some(*round_id),
            AuditEvent::RoundFinished { summary, .. } => Some(summary.round_id),
            AuditEvent::TradingHalted { .. } => None,
        }
    }
}

/// Best-effort sink; callers log and ignore failures
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<()>;
}

/// Emits audit events as tracing records
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        tracing::info!(target: "scalper::audit", "{}", json);
        Ok(())
    }
}

/// One JSON object per line, appended to a file
pub struct JsonLinesAuditLog {
    path: PathBuf,
    // Serializes writers so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonLinesAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for JsonLinesAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read every event from a JSON-lines audit file.
///
/// Lines that fail to parse are skipped with a warning.
pub async fn read_events(path: &Path) -> Result<Vec<AuditEvent>> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut events = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!("Skipping audit line {}: {}", line_no + 1, e),
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(symbol: &str) -> AuditEvent {
        AuditEvent::RoundCreated {
            round_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_json_lines_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonLinesAuditLog::new(dir.path().join("audit.jsonl"));

        let first = created("BTC");
        let second = AuditEvent::TradingHalted {
            reason: StopReason::ConsecutiveLosses,
            state: PerformanceState::default(),
            at: Utc::now(),
        };
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let events = read_events(log.path()).await.unwrap();
        assert_eq!(events, vec![first, second]);
    }

    #[tokio::test]
    async fn test_read_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let event = created("ETH");
        let content = format!("not json\n\n{}\n", serde_json::to_string(&event).unwrap());
        tokio::fs::write(&path, content).await.unwrap();

        let events = read_events(&path).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].round_id(), event.round_id());
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let log = JsonLinesAuditLog::new("/nonexistent-dir/audit.jsonl");

        assert!(log.append(&created("BTC")).await.is_err());
    }
}
