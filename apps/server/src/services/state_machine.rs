//! Cutover state machine.
//!
//! The only mutation points for a table's status and routing. Every write is a
//! compare-and-swap on `(id, status, version)` committed in the same
//! transaction as its audit entry.

use chrono::{DateTime, Utc};
use sea_orm::Set;
use serde_json::{Value as JsonValue, json};
use tracing::{info, warn};

use super::audit;
use super::engine::{CutoverEngine, SYSTEM_ACTOR};
use crate::db::{checklists, cutover_tables, freeze_windows, reconciliation_jobs};
use crate::error::{AdvanceError, AppError, AppResult};
use crate::models::event::{RolledBackPayload, TableRegisteredPayload, TransitionPayload};
use crate::models::{
    AuditOperation, AuditStatus, Checklist, ChecklistGate, CutoverEvent, CutoverOverview,
    CutoverStatus, CutoverTable, DataSource, FreezeWindowStatus, NewAuditEntry, RollbackTrigger,
    RoutingPolicy, Transition, ValidationStatus, audit_entry::kind, validate_table_name,
};

/// Attempts a rollback makes before giving up on CAS collisions.
const ROLLBACK_ATTEMPTS: usize = 5;

fn merge_details(mut base: JsonValue, extra: JsonValue) -> JsonValue {
    if let (Some(base), JsonValue::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

impl CutoverEngine {
    /// Register a table for migration.
    ///
    /// Creates attempt 1, or attempt N+1 when the current attempt was rolled
    /// back, together with its all-false checklist.
    pub async fn register_table(
        &self,
        name: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CutoverTable> {
        validate_table_name(name).map_err(AppError::InvalidInput)?;

        let txn = self.pool.begin().await?;

        let attempt = match cutover_tables::find_current(&txn, name).await? {
            None => 1,
            Some(current) if current.status == CutoverStatus::RolledBack.as_str() => {
                current.attempt + 1
            }
            Some(current) => {
                return Err(AppError::Conflict(format!(
                    "table '{}' attempt {} is '{}'; only a rolled back table can be registered again",
                    name, current.attempt, current.status
                )));
            }
        };

        let row = cutover_tables::insert(&txn, name, attempt, actor, now).await?;
        checklists::insert(&txn, &row, now).await?;
        audit::append(
            &txn,
            NewAuditEntry::new(
                name,
                Some(row.id),
                AuditOperation::Prepare,
                AuditStatus::Success,
                actor,
                json!({ "kind": kind::REGISTER, "attempt": attempt }),
                now,
            ),
        )
        .await?;

        txn.commit().await?;

        info!(table = %name, attempt, actor = %actor, "Cutover table registered");
        self.publish(
            CutoverEvent::TableRegistered(TableRegisteredPayload {
                table_name: name.to_string(),
                cutover_table_id: row.id,
                attempt,
            }),
            now,
        );

        CutoverTable::from_model(row)
    }

    /// Read-only snapshot of the current attempt.
    pub async fn get_status(&self, name: &str) -> AppResult<CutoverTable> {
        CutoverTable::from_model(self.current_row(name).await?)
    }

    /// Current attempt of every registered table.
    pub async fn list_tables(&self) -> AppResult<Vec<CutoverTable>> {
        cutover_tables::list_current(self.pool.connection())
            .await?
            .into_iter()
            .map(CutoverTable::from_model)
            .collect()
    }

    /// Where the data-access layer must send reads and writes for `name`.
    pub async fn routing_policy(&self, name: &str, now: DateTime<Utc>) -> AppResult<RoutingPolicy> {
        let table = self.get_status(name).await?;
        let frozen = self.writes_frozen(name, now).await?;
        Ok(table.routing(frozen))
    }

    /// Read-only migration summary.
    pub async fn overview(&self) -> AppResult<CutoverOverview> {
        let db = self.pool.connection();
        let tables = self.list_tables().await?;
        let mut overview = CutoverOverview::from_statuses(tables.iter().map(|t| t.status));
        overview.active_freeze_windows =
            freeze_windows::list(db, &[FreezeWindowStatus::Active]).await?.len() as u64;
        overview.open_alerts = reconciliation_jobs::open_alerts(db).await?.len() as u64;
        Ok(overview)
    }

    /// Attempt the next forward transition for the current attempt of `name`.
    pub async fn request_advance(
        &self,
        name: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CutoverTable> {
        let snapshot = self.get_status(name).await?;
        self.advance_from(&snapshot, actor, now).await
    }

    /// Attempt the next forward transition starting from a snapshot the
    /// caller already holds. A stale snapshot fails with `ConcurrentTransition`.
    pub async fn advance_from(
        &self,
        snapshot: &CutoverTable,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CutoverTable> {
        let Some(transition) = Transition::advance_from(snapshot.status) else {
            let err = AdvanceError::TerminalState {
                table: snapshot.name.clone(),
                status: snapshot.status,
            };
            self.record_rejection(snapshot, None, &err, actor, now).await;
            return Err(err.into());
        };

        let changes = match self.check_advance(snapshot, transition, now).await {
            Ok(changes) => changes,
            Err(AppError::Advance(err)) => {
                self.record_rejection(snapshot, Some(transition), &err, actor, now)
                    .await;
                return Err(err.into());
            }
            Err(other) => return Err(other),
        };

        match self
            .commit_transition(snapshot, transition, changes, actor, json!({}), now)
            .await
        {
            Err(AppError::Advance(err)) => {
                self.record_rejection(snapshot, Some(transition), &err, actor, now)
                    .await;
                Err(err.into())
            }
            other => other,
        }
    }

    /// Verify the preconditions of `transition` and build its row changes.
    async fn check_advance(
        &self,
        snapshot: &CutoverTable,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> AppResult<crate::entity::cutover_table::ActiveModel> {
        let table = snapshot.name.clone();
        let mut changes = cutover_tables::versioned_changes(snapshot.version, now);
        changes.status = Set(transition.to_status().as_str().to_string());

        match transition {
            Transition::PendingToReady => {
                let checklist: Checklist =
                    checklists::find_for_table(self.pool.connection(), snapshot.id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("Checklist for '{}'", table)))?
                        .into();
                let missing = checklist.unsatisfied();
                if !missing.is_empty() {
                    return Err(AdvanceError::ChecklistIncomplete { table, missing }.into());
                }
                if snapshot.validation_status != ValidationStatus::Passed {
                    return Err(AdvanceError::ValidationFailed {
                        table,
                        reason: format!(
                            "latest reconciliation verdict is '{}', needs 'passed' (drift {:.4}, integrity '{}')",
                            snapshot.validation_status.as_str(),
                            snapshot.drift_percentage,
                            snapshot.referential_integrity_status.as_str()
                        ),
                    }
                    .into());
                }
            }
            Transition::ReadyToCutover => {
                if self.active_window_for(&table, now).await?.is_none() {
                    return Err(AdvanceError::NoActiveFreezeWindow { table }.into());
                }
                changes.write_source = Set(DataSource::Dual.as_str().to_string());
                changes.dual_write_started_at = Set(Some(now));
            }
            Transition::CutoverToCompleted => {
                let reason = if snapshot.read_source != DataSource::Supabase {
                    Some(
                        "reads still go to the legacy store; the dual-write soak has not finished with zero drift"
                            .to_string(),
                    )
                } else if !snapshot
                    .last_reconciled_at
                    .zip(snapshot.read_switched_at)
                    .is_some_and(|(reconciled, switched)| reconciled > switched)
                {
                    Some("no reconciliation has completed since reads switched to the new store".to_string())
                } else if !snapshot.has_zero_drift() {
                    Some(format!(
                        "drift must be exactly zero with clean integrity, measured drift {:.4} (difference {}), integrity '{}'",
                        snapshot.drift_percentage,
                        snapshot.record_count_difference,
                        snapshot.referential_integrity_status.as_str()
                    ))
                } else if snapshot.validation_status != ValidationStatus::Passed {
                    Some(format!(
                        "latest reconciliation verdict is '{}'",
                        snapshot.validation_status.as_str()
                    ))
                } else {
                    None
                };
                if let Some(reason) = reason {
                    return Err(AdvanceError::ValidationFailed { table, reason }.into());
                }
                changes.write_source = Set(DataSource::Supabase.as_str().to_string());
                changes.cutover_date = Set(Some(now));
            }
            Transition::ReadSwitch | Transition::CutoverToRolledBack => {
                return Err(AdvanceError::InvalidTransition {
                    table,
                    from: snapshot.status,
                    to: transition.to_status(),
                }
                .into());
            }
        }

        Ok(changes)
    }

    /// CAS the row, append the audit entry and publish, as one unit of work.
    pub(crate) async fn commit_transition(
        &self,
        snapshot: &CutoverTable,
        transition: Transition,
        changes: crate::entity::cutover_table::ActiveModel,
        actor: &str,
        extra_details: JsonValue,
        now: DateTime<Utc>,
    ) -> AppResult<CutoverTable> {
        let concurrent = || AdvanceError::ConcurrentTransition {
            table: snapshot.name.clone(),
            expected: snapshot.status,
            version: snapshot.version,
        };

        let txn = self.pool.begin().await?;

        let Some(updated) = cutover_tables::compare_and_swap(
            &txn,
            snapshot.id,
            snapshot.status,
            snapshot.version,
            changes,
        )
        .await?
        else {
            return Err(concurrent().into());
        };
        let updated = CutoverTable::from_model(updated)?;

        if transition == Transition::PendingToReady {
            let missing = checklists::find_for_table(&txn, snapshot.id)
                .await?
                .map(|row| Checklist::from(row).unsatisfied())
                .unwrap_or_else(|| ChecklistGate::ALL.to_vec());
            if !missing.is_empty() {
                txn.rollback().await?;
                return Err(AdvanceError::ChecklistIncomplete {
                    table: snapshot.name.clone(),
                    missing,
                }
                .into());
            }
        }

        let details = merge_details(
            json!({
                "kind": kind::TRANSITION,
                "from": snapshot.status.as_str(),
                "to": updated.status.as_str(),
                "read_source": updated.read_source.as_str(),
                "write_source": updated.write_source.as_str(),
                "drift_percentage": updated.drift_percentage,
                "record_count_difference": updated.record_count_difference,
                "referential_integrity_status": updated.referential_integrity_status.as_str(),
            }),
            extra_details,
        );
        let entry = NewAuditEntry::new(
            &updated.name,
            Some(updated.id),
            AuditOperation::for_transition(transition),
            AuditStatus::Success,
            actor,
            details,
            now,
        )
        .with_transition(transition);

        match audit::append(&txn, entry).await {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => return Err(concurrent().into()),
            Err(e) => return Err(e),
        }

        if updated.status.is_terminal() {
            reconciliation_jobs::cancel_pending_for_table(
                &txn,
                updated.id,
                &format!("table reached '{}'", updated.status),
                now,
            )
            .await?;
        }

        txn.commit().await?;

        info!(
            table = %updated.name,
            from = %snapshot.status,
            to = %updated.status,
            transition = transition.as_str(),
            actor = %actor,
            "Cutover transition committed"
        );
        self.publish(
            CutoverEvent::TransitionCommitted(TransitionPayload {
                table_name: updated.name.clone(),
                transition,
                status: updated.status,
                read_source: updated.read_source,
                write_source: updated.write_source,
                actor: actor.to_string(),
            }),
            now,
        );

        Ok(updated)
    }

    /// Record a rejected request as a failure entry. Never masks the rejection.
    async fn record_rejection(
        &self,
        snapshot: &CutoverTable,
        attempted: Option<Transition>,
        err: &AdvanceError,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        warn!(
            table = %snapshot.name,
            status = %snapshot.status,
            code = err.code(),
            actor = %actor,
            "Advance rejected: {}",
            err
        );

        let operation = attempted
            .map(AuditOperation::for_transition)
            .unwrap_or(AuditOperation::Validation);
        let mut entry = NewAuditEntry::new(
            &snapshot.name,
            Some(snapshot.id),
            operation,
            AuditStatus::Failure,
            actor,
            json!({
                "kind": kind::REJECTION,
                "code": err.code(),
                "from": snapshot.status.as_str(),
            }),
            now,
        )
        .with_error(err.to_string());
        if let Some(transition) = attempted {
            entry = entry.with_transition(transition);
        }

        if let Err(e) = self.record_audit(entry).await {
            warn!(table = %snapshot.name, "Failed to record rejection: {}", e);
        }
    }

    /// Operator rollback (or cancellation) of an in-flight cutover.
    ///
    /// Retries when a concurrent write (usually a drift check) bumps the row,
    /// as long as the table is still in `cutover`.
    pub async fn rollback(
        &self,
        name: &str,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CutoverTable> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput(
                "a rollback reason is required".to_string(),
            ));
        }

        let snapshot = self.get_status(name).await?;
        if snapshot.status != CutoverStatus::Cutover {
            return Err(self.reject_rollback(&snapshot, actor, now).await);
        }

        match self
            .rollback_with_retry(name, RollbackTrigger::Operator, reason, actor, now)
            .await?
        {
            Some(table) => Ok(table),
            None => {
                let snapshot = self.get_status(name).await?;
                Err(self.reject_rollback(&snapshot, actor, now).await)
            }
        }
    }

    /// Audit and build the rejection for a rollback of a table outside `cutover`.
    async fn reject_rollback(
        &self,
        snapshot: &CutoverTable,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppError {
        let err = if snapshot.status.is_terminal() {
            AdvanceError::TerminalState {
                table: snapshot.name.clone(),
                status: snapshot.status,
            }
        } else {
            AdvanceError::InvalidTransition {
                table: snapshot.name.clone(),
                from: snapshot.status,
                to: CutoverStatus::RolledBack,
            }
        };
        self.record_rejection(
            snapshot,
            Some(Transition::CutoverToRolledBack),
            &err,
            actor,
            now,
        )
        .await;
        err.into()
    }

    async fn rollback_from(
        &self,
        snapshot: &CutoverTable,
        trigger: RollbackTrigger,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CutoverTable> {
        let mut changes = cutover_tables::versioned_changes(snapshot.version, now);
        changes.status = Set(CutoverStatus::RolledBack.as_str().to_string());
        changes.read_source = Set(DataSource::Legacy.as_str().to_string());
        changes.write_source = Set(DataSource::Legacy.as_str().to_string());
        changes.rollback_date = Set(Some(now));
        changes.rollback_reason = Set(Some(reason.to_string()));

        let table = self
            .commit_transition(
                snapshot,
                Transition::CutoverToRolledBack,
                changes,
                actor,
                json!({
                    "trigger": trigger.as_str(),
                    "reason": reason,
                    "system_initiated": trigger.is_system_initiated(),
                }),
                now,
            )
            .await?;

        warn!(
            table = %table.name,
            trigger = trigger.as_str(),
            actor = %actor,
            "Cutover rolled back: {}",
            reason
        );
        self.publish(
            CutoverEvent::RolledBack(RolledBackPayload {
                table_name: table.name.clone(),
                trigger,
                reason: reason.to_string(),
            }),
            now,
        );

        Ok(table)
    }

    /// System-initiated rollback. Returns `None` if the table already left
    /// `cutover`.
    pub(crate) async fn force_rollback(
        &self,
        name: &str,
        trigger: RollbackTrigger,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<CutoverTable>> {
        self.rollback_with_retry(name, trigger, reason, SYSTEM_ACTOR, now)
            .await
    }

    /// Re-read and retry on CAS collisions so the table never stays in
    /// `cutover`. `None` once the table is no longer in `cutover`.
    async fn rollback_with_retry(
        &self,
        name: &str,
        trigger: RollbackTrigger,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<CutoverTable>> {
        for _ in 0..ROLLBACK_ATTEMPTS {
            let snapshot = self.get_status(name).await?;
            if snapshot.status != CutoverStatus::Cutover {
                return Ok(None);
            }
            match self
                .rollback_from(&snapshot, trigger, reason, actor, now)
                .await
            {
                Ok(table) => return Ok(Some(table)),
                Err(AppError::Advance(AdvanceError::ConcurrentTransition { .. })) => continue,
                Err(e) => return Err(e),
            }
        }

        let snapshot = self.get_status(name).await?;
        Err(AdvanceError::ConcurrentTransition {
            table: snapshot.name,
            expected: snapshot.status,
            version: snapshot.version,
        }
        .into())
    }

    /// Second half of `ready -> cutover`: move reads to the new store once the
    /// dual-write soak finished with zero drift.
    pub(crate) async fn switch_reads(
        &self,
        snapshot: &CutoverTable,
        now: DateTime<Utc>,
    ) -> AppResult<CutoverTable> {
        if snapshot.status != CutoverStatus::Cutover || snapshot.read_source != DataSource::Legacy {
            return Err(AdvanceError::InvalidTransition {
                table: snapshot.name.clone(),
                from: snapshot.status,
                to: CutoverStatus::Cutover,
            }
            .into());
        }

        let mut changes = cutover_tables::versioned_changes(snapshot.version, now);
        changes.read_source = Set(DataSource::Supabase.as_str().to_string());
        changes.read_switched_at = Set(Some(now));

        self.commit_transition(
            snapshot,
            Transition::ReadSwitch,
            changes,
            SYSTEM_ACTOR,
            json!({ "soak_started_at": snapshot.dual_write_started_at }),
            now,
        )
        .await
    }
}
