//! Append-only, hash-chained audit log.
//!
//! Each table name has its own chain: entries are numbered from 1 and every
//! entry hashes its predecessor's hash together with its own canonical
//! content. The `(table_name, sequence)` unique index makes appends atomic.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sea_orm::{ConnectionTrait, Set};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use super::engine::CutoverEngine;
use crate::db::audit_entries::{self, InsertOutcome};
use crate::entity::cutover_audit_entry;
use crate::error::{AppError, AppResult};
use crate::models::audit_entry::kind;
use crate::models::{AuditEntry, AuditReplay, AuditStatus, CutoverStatus, NewAuditEntry, Transition};

/// `prev_hash` of the first entry in every chain.
pub const GENESIS_HASH: &str = "0";

/// Appends retried outside a transaction when another writer takes the slot.
const APPEND_ATTEMPTS: usize = 3;

/// Hash over the previous hash and the canonical entry content.
#[allow(clippy::too_many_arguments)]
pub fn compute_entry_hash(
    prev_hash: &str,
    table_name: &str,
    sequence: i64,
    operation: &str,
    status: &str,
    transition: Option<&str>,
    actor: &str,
    details: &serde_json::Value,
    error_message: Option<&str>,
    created_at: DateTime<Utc>,
) -> String {
    let canonical = json!({
        "table_name": table_name,
        "sequence": sequence,
        "operation": operation,
        "status": status,
        "transition": transition,
        "actor": actor,
        "details": details,
        "error_message": error_message,
        "created_at": created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    });

    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(serde_json::to_vec(&canonical).unwrap_or_default());
    hex::encode(hasher.finalize())
}

fn hash_of_model(m: &cutover_audit_entry::Model) -> String {
    compute_entry_hash(
        &m.prev_hash,
        &m.table_name,
        m.sequence,
        &m.operation,
        &m.status,
        m.transition.as_deref(),
        &m.actor,
        &m.details,
        m.error_message.as_deref(),
        m.created_at,
    )
}

/// Append one entry on `db` (pool or transaction).
///
/// Fails with `Conflict` if a concurrent writer took the next sequence number;
/// inside a transaction the caller must abandon the unit of work.
pub(crate) async fn append<C: ConnectionTrait>(
    db: &C,
    entry: NewAuditEntry,
) -> AppResult<cutover_audit_entry::Model> {
    let last = audit_entries::last_for_table(db, &entry.table_name).await?;
    let (sequence, prev_hash) = match last {
        Some(last) => (last.sequence + 1, last.entry_hash),
        None => (1, GENESIS_HASH.to_string()),
    };
    // Stored timestamps keep microseconds on every backend.
    let created_at = entry.created_at.trunc_subsecs(6);
    let transition = entry.transition.map(|t| t.as_str().to_string());

    let entry_hash = compute_entry_hash(
        &prev_hash,
        &entry.table_name,
        sequence,
        entry.operation.as_str(),
        entry.status.as_str(),
        transition.as_deref(),
        &entry.actor,
        &entry.details,
        entry.error_message.as_deref(),
        created_at,
    );

    let model = cutover_audit_entry::Model {
        id: Uuid::now_v7(),
        table_name: entry.table_name,
        cutover_table_id: entry.cutover_table_id,
        sequence,
        operation: entry.operation.as_str().to_string(),
        status: entry.status.as_str().to_string(),
        transition,
        actor: entry.actor,
        details: entry.details,
        error_message: entry.error_message,
        prev_hash,
        entry_hash,
        created_at,
    };

    let active = cutover_audit_entry::ActiveModel {
        id: Set(model.id),
        table_name: Set(model.table_name.clone()),
        cutover_table_id: Set(model.cutover_table_id),
        sequence: Set(model.sequence),
        operation: Set(model.operation.clone()),
        status: Set(model.status.clone()),
        transition: Set(model.transition.clone()),
        actor: Set(model.actor.clone()),
        details: Set(model.details.clone()),
        error_message: Set(model.error_message.clone()),
        prev_hash: Set(model.prev_hash.clone()),
        entry_hash: Set(model.entry_hash.clone()),
        created_at: Set(model.created_at),
    };

    match audit_entries::insert(db, active).await? {
        InsertOutcome::Inserted => Ok(model),
        InsertOutcome::SequenceTaken => Err(AppError::Conflict(format!(
            "audit sequence {} for '{}' was taken by a concurrent writer",
            sequence, model.table_name
        ))),
    }
}

impl CutoverEngine {
    /// Append outside any transaction, retrying when another writer takes the slot.
    pub(crate) async fn record_audit(
        &self,
        entry: NewAuditEntry,
    ) -> AppResult<cutover_audit_entry::Model> {
        let mut last_err = None;
        for _ in 0..APPEND_ATTEMPTS {
            match append(self.pool.connection(), entry.clone()).await {
                Err(AppError::Conflict(message)) => {
                    warn!(table = %entry.table_name, "Audit append collided: {}", message);
                    last_err = Some(AppError::Conflict(message));
                }
                other => return other,
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::Conflict("audit append failed".to_string())))
    }

    /// Full audit trail for a table name, across all attempts.
    pub async fn audit_trail(&self, name: &str) -> AppResult<Vec<AuditEntry>> {
        audit_entries::trail(self.pool.connection(), name)
            .await?
            .into_iter()
            .map(AuditEntry::from_model)
            .collect()
    }

    /// Walk the chain, verify it, and replay every successful transition
    /// against the allowed edge set.
    pub async fn replay_audit(&self, name: &str) -> AppResult<AuditReplay> {
        let rows = audit_entries::trail(self.pool.connection(), name).await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(format!("Audit trail for '{}'", name)));
        }
        Ok(replay_rows(name, &rows))
    }
}

/// Pure replay over stored rows.
pub fn replay_rows(name: &str, rows: &[cutover_audit_entry::Model]) -> AuditReplay {
    let mut violations = Vec::new();
    let mut chain_valid = true;
    let mut expected_sequence = 1_i64;
    let mut expected_prev = GENESIS_HASH.to_string();

    for row in rows {
        if row.sequence != expected_sequence {
            chain_valid = false;
            violations.push(format!(
                "entry {}: expected sequence {}",
                row.sequence, expected_sequence
            ));
        }
        if row.prev_hash != expected_prev {
            chain_valid = false;
            violations.push(format!("entry {}: prev_hash does not match", row.sequence));
        }
        if hash_of_model(row) != row.entry_hash {
            chain_valid = false;
            violations.push(format!("entry {}: content hash mismatch", row.sequence));
        }
        expected_sequence = row.sequence + 1;
        expected_prev = row.entry_hash.clone();
    }

    let mut state: Option<CutoverStatus> = None;
    let mut transitions = Vec::new();
    let mut entries_checked = 0_u64;

    for row in rows {
        entries_checked += 1;
        let Ok(entry) = AuditEntry::from_model(row.clone()) else {
            violations.push(format!("entry {}: unreadable", row.sequence));
            continue;
        };
        if entry.status != AuditStatus::Success {
            continue;
        }

        if entry.kind() == Some(kind::REGISTER) {
            if let Some(status) = state
                && !status.is_terminal()
            {
                violations.push(format!(
                    "entry {}: re-registered while attempt was '{}'",
                    entry.sequence, status
                ));
            }
            state = Some(CutoverStatus::Pending);
            continue;
        }

        let Some(transition) = entry.transition.filter(|_| entry.is_successful_transition()) else {
            continue;
        };

        let from = transition.from_status();
        if state != Some(from) {
            violations.push(format!(
                "entry {}: '{}' applied in state {}",
                entry.sequence,
                transition.as_str(),
                state.map(|s| s.as_str()).unwrap_or("unregistered")
            ));
        }
        if transition != Transition::ReadSwitch && !from.can_transition_to(transition.to_status())
        {
            violations.push(format!(
                "entry {}: '{}' is not an allowed edge",
                entry.sequence,
                transition.as_str()
            ));
        }
        if transition == Transition::CutoverToCompleted {
            let drift = entry
                .details
                .get("drift_percentage")
                .and_then(serde_json::Value::as_f64);
            let difference = entry
                .details
                .get("record_count_difference")
                .and_then(serde_json::Value::as_i64);
            let integrity = entry
                .details
                .get("referential_integrity_status")
                .and_then(serde_json::Value::as_str);
            if drift != Some(0.0) || difference != Some(0) || integrity != Some("clean") {
                violations.push(format!(
                    "entry {}: completed without zero drift and clean integrity",
                    entry.sequence
                ));
            }
        }

        transitions.push(transition);
        state = Some(transition.to_status());
    }

    AuditReplay {
        table_name: name.to_string(),
        entries_checked,
        transitions,
        final_status: state,
        chain_valid,
        violations,
    }
}
