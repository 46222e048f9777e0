//! Audit log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{CutoverStatus, Transition};
use crate::entity::cutover_audit_entry;
use crate::error::{AppError, AppResult};

/// Category of audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Prepare,
    Cutover,
    Rollback,
    Validation,
    Reconciliation,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Cutover => "cutover",
            Self::Rollback => "rollback",
            Self::Validation => "validation",
            Self::Reconciliation => "reconciliation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prepare" => Some(Self::Prepare),
            "cutover" => Some(Self::Cutover),
            "rollback" => Some(Self::Rollback),
            "validation" => Some(Self::Validation),
            "reconciliation" => Some(Self::Reconciliation),
            _ => None,
        }
    }

    /// Operation recorded for a state-machine transition.
    pub fn for_transition(transition: Transition) -> Self {
        match transition {
            Transition::PendingToReady => Self::Validation,
            Transition::ReadyToCutover | Transition::ReadSwitch => Self::Cutover,
            Transition::CutoverToCompleted => Self::Cutover,
            Transition::CutoverToRolledBack => Self::Rollback,
        }
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    InProgress,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::InProgress => "in_progress",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "in_progress" => Some(Self::InProgress),
            _ => None,
        }
    }
}

/// Discriminator stored under `details.kind`.
pub mod kind {
    pub const REGISTER: &str = "register";
    pub const GATE: &str = "gate";
    pub const FREEZE_WINDOW: &str = "freeze_window";
    pub const TRANSITION: &str = "transition";
    pub const RECONCILIATION: &str = "reconciliation";
    pub const REJECTION: &str = "rejection";
}

/// Entry to be appended; sequence and hashes are assigned on write.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub table_name: String,
    pub cutover_table_id: Option<Uuid>,
    pub operation: AuditOperation,
    pub status: AuditStatus,
    pub transition: Option<Transition>,
    pub actor: String,
    pub details: JsonValue,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewAuditEntry {
    pub fn new(
        table_name: impl Into<String>,
        cutover_table_id: Option<Uuid>,
        operation: AuditOperation,
        status: AuditStatus,
        actor: impl Into<String>,
        details: JsonValue,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            cutover_table_id,
            operation,
            status,
            transition: None,
            actor: actor.into(),
            details,
            error_message: None,
            created_at,
        }
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Persisted, hash-chained audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuditEntry {
    pub id: Uuid,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutover_table_id: Option<Uuid>,
    pub sequence: i64,
    pub operation: AuditOperation,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    pub actor: String,
    #[schema(value_type = Object)]
    pub details: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub prev_hash: String,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_model(m: cutover_audit_entry::Model) -> AppResult<Self> {
        let corrupt = |field: &str, value: &str| {
            AppError::Database(format!(
                "cutover_audit_entries.{field} holds unknown value '{value}'"
            ))
        };
        let operation =
            AuditOperation::parse(&m.operation).ok_or_else(|| corrupt("operation", &m.operation))?;
        let status = AuditStatus::parse(&m.status).ok_or_else(|| corrupt("status", &m.status))?;
        let transition = match m.transition.as_deref() {
            Some(raw) => Some(Transition::parse(raw).ok_or_else(|| corrupt("transition", raw))?),
            None => None,
        };

        Ok(Self {
            id: m.id,
            table_name: m.table_name,
            cutover_table_id: m.cutover_table_id,
            sequence: m.sequence,
            operation,
            status,
            transition,
            actor: m.actor,
            details: m.details,
            error_message: m.error_message,
            prev_hash: m.prev_hash,
            entry_hash: m.entry_hash,
            created_at: m.created_at,
        })
    }

    pub fn kind(&self) -> Option<&str> {
        self.details.get("kind").and_then(JsonValue::as_str)
    }

    pub fn is_successful_transition(&self) -> bool {
        self.status == AuditStatus::Success
            && self.transition.is_some()
            && self.kind() == Some(kind::TRANSITION)
    }
}

/// Result of replaying a table's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuditReplay {
    pub table_name: String,
    pub entries_checked: u64,
    /// Successful transitions in order.
    pub transitions: Vec<Transition>,
    /// Status the transitions lead to for the latest attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<CutoverStatus>,
    pub chain_valid: bool,
    pub violations: Vec<String>,
}

impl AuditReplay {
    pub fn is_consistent(&self) -> bool {
        self.chain_valid && self.violations.is_empty()
    }
}
