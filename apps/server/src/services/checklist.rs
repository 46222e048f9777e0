//! Checklist gate: eight boolean preconditions for `pending -> ready`.

use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde_json::json;
use tracing::info;

use super::audit;
use super::engine::CutoverEngine;
use crate::db::{checklists, cutover_tables};
use crate::entity::{cutover_checklist, cutover_table};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuditOperation, AuditStatus, Checklist, ChecklistGate, CutoverStatus, NewAuditEntry,
    audit_entry::kind,
};

/// Collisions with concurrent table writes tolerated before giving up.
const GATE_APPLY_ATTEMPTS: usize = 5;

async fn load<C: ConnectionTrait>(
    db: &C,
    table: &cutover_table::Model,
) -> AppResult<cutover_checklist::Model> {
    checklists::find_for_table(db, table.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Checklist for '{}'", table.name)))
}

/// Drive the two system gates from a reconciliation outcome, inside the
/// caller's transaction.
pub(crate) async fn set_system_gates<C: ConnectionTrait>(
    db: &C,
    table: &cutover_table::Model,
    data_consistency: bool,
    referential_integrity: bool,
    actor: &str,
    now: DateTime<Utc>,
) -> AppResult<Checklist> {
    let current = load(db, table).await?;
    let updated = checklists::set_gates(
        db,
        current,
        &[
            (ChecklistGate::DataConsistency, data_consistency),
            (ChecklistGate::ReferentialIntegrity, referential_integrity),
        ],
        actor,
        now,
    )
    .await?;
    Ok(updated.into())
}

impl CutoverEngine {
    /// Checklist of the current attempt.
    pub async fn get_checklist(&self, name: &str) -> AppResult<Checklist> {
        let table = self.current_row(name).await?;
        Ok(load(self.pool.connection(), &table).await?.into())
    }

    /// True when all eight gates are set.
    pub async fn can_advance(&self, name: &str) -> AppResult<bool> {
        Ok(self.get_checklist(name).await?.all_satisfied)
    }

    /// Set one operator-attested gate and audit it.
    ///
    /// `data_consistency` and `referential_integrity` follow reconciliation
    /// results and cannot be set by hand.
    pub async fn mark_checklist_gate(
        &self,
        name: &str,
        gate: ChecklistGate,
        value: bool,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Checklist> {
        if gate.is_system_driven() {
            return Err(AppError::InvalidInput(format!(
                "gate '{}' is driven by reconciliation results and cannot be set manually",
                gate
            )));
        }

        for _ in 0..GATE_APPLY_ATTEMPTS {
            let table = self.current_row(name).await?;
            let status = CutoverStatus::parse(&table.status).ok_or_else(|| {
                AppError::Database(format!(
                    "cutover_tables.status holds unknown value '{}'",
                    table.status
                ))
            })?;
            if status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "table '{}' is '{}'; its checklist is closed",
                    name, status
                )));
            }

            let txn = self.pool.begin().await?;

            // Bumping the row version makes a concurrent transition built on
            // the old checklist lose its compare-and-swap.
            let bump = cutover_tables::versioned_changes(table.version, now);
            if cutover_tables::compare_and_swap(&txn, table.id, status, table.version, bump)
                .await?
                .is_none()
            {
                txn.rollback().await?;
                continue;
            }

            let current = load(&txn, &table).await?;
            let previous = Checklist::from(current.clone()).gate(gate);
            let updated: Checklist =
                checklists::set_gates(&txn, current, &[(gate, value)], actor, now)
                    .await?
                    .into();

            let entry = NewAuditEntry::new(
                name,
                Some(table.id),
                AuditOperation::Prepare,
                AuditStatus::Success,
                actor,
                json!({
                    "kind": kind::GATE,
                    "gate": gate.as_str(),
                    "value": value,
                    "previous": previous,
                    "all_satisfied": updated.all_satisfied,
                }),
                now,
            );
            match audit::append(&txn, entry).await {
                Ok(_) => {}
                Err(AppError::Conflict(_)) => {
                    txn.rollback().await?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            txn.commit().await?;

            info!(
                table = %name,
                gate = gate.as_str(),
                value,
                actor = %actor,
                all_satisfied = updated.all_satisfied,
                "Checklist gate marked"
            );

            return Ok(updated);
        }

        Err(AppError::Conflict(format!(
            "table '{}' kept changing while marking gate '{}'; retry",
            name, gate
        )))
    }
}
