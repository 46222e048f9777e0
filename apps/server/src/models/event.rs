//! Cutover lifecycle events fanned out to in-process subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CutoverStatus, DataSource, JobStatus, JobType, RollbackTrigger, Transition};

/// Event published after the corresponding state change has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum CutoverEvent {
    /// A table attempt was registered.
    TableRegistered(TableRegisteredPayload),
    /// A transition committed.
    TransitionCommitted(TransitionPayload),
    /// A table was rolled back.
    RolledBack(RolledBackPayload),
    /// A reconciliation job finished (either way).
    JobFinished(JobFinishedPayload),
    /// Retries were exhausted or the failure was not retryable.
    ReconciliationAlert(AlertPayload),
    /// A freeze window changed status.
    FreezeWindowChanged(FreezeWindowPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegisteredPayload {
    pub table_name: String,
    pub cutover_table_id: Uuid,
    pub attempt: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub table_name: String,
    pub transition: Transition,
    pub status: CutoverStatus,
    pub read_source: DataSource,
    pub write_source: DataSource,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolledBackPayload {
    pub table_name: String,
    pub trigger: RollbackTrigger,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFinishedPayload {
    pub job_id: Uuid,
    pub table_name: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub drift_detected: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub job_id: Uuid,
    pub table_name: String,
    pub attempt: i32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreezeWindowPayload {
    pub freeze_window_id: Uuid,
    pub status: String,
    pub affected_tables: Vec<String>,
}

/// Wrapper that includes a timestamp with every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoverEventMessage {
    #[serde(flatten)]
    pub event: CutoverEvent,
    pub timestamp: DateTime<Utc>,
}

impl CutoverEventMessage {
    pub fn new(event: CutoverEvent, timestamp: DateTime<Utc>) -> Self {
        Self { event, timestamp }
    }

    pub fn table_name(&self) -> Option<&str> {
        match &self.event {
            CutoverEvent::TableRegistered(p) => Some(&p.table_name),
            CutoverEvent::TransitionCommitted(p) => Some(&p.table_name),
            CutoverEvent::RolledBack(p) => Some(&p.table_name),
            CutoverEvent::JobFinished(p) => Some(&p.table_name),
            CutoverEvent::ReconciliationAlert(p) => Some(&p.table_name),
            CutoverEvent::FreezeWindowChanged(_) => None,
        }
    }

    /// True when the event is about `table`, directly or through a window covering it.
    pub fn concerns(&self, table: &str) -> bool {
        match &self.event {
            CutoverEvent::FreezeWindowChanged(p) => p.affected_tables.iter().any(|t| t == table),
            _ => self.table_name() == Some(table),
        }
    }
}
