//! Freeze window coordinator.
//!
//! Schedules write-freeze intervals, activates and closes them, and forces a
//! rollback of any covered table still in `cutover` when a window closes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, Set};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::audit;
use super::engine::{CutoverEngine, SYSTEM_ACTOR};
use crate::db::{cutover_tables, freeze_windows};
use crate::entity::freeze_window as freeze_window_entity;
use crate::error::{AppError, AppResult};
use crate::models::event::FreezeWindowPayload;
use crate::models::{
    AuditOperation, AuditStatus, CutoverEvent, CutoverStatus, FreezeWindow, FreezeWindowStatus,
    NewAuditEntry, RollbackTrigger, audit_entry::kind, validate_table_name,
};

/// What one coordinator tick did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FreezeTickReport {
    pub activated: Vec<Uuid>,
    pub completed: Vec<Uuid>,
    pub cancelled: Vec<Uuid>,
    pub rolled_back: Vec<String>,
}

fn to_window(pair: freeze_windows::WindowWithTables) -> AppResult<FreezeWindow> {
    FreezeWindow::from_model(pair.0, pair.1)
}

/// One audit entry per affected table describing a window change.
async fn audit_window_change<C: ConnectionTrait>(
    db: &C,
    window_id: Uuid,
    tables: &[String],
    action: FreezeWindowStatus,
    actor: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    for table in tables {
        let cutover_table_id = cutover_tables::find_current(db, table).await?.map(|t| t.id);
        audit::append(
            db,
            NewAuditEntry::new(
                table,
                cutover_table_id,
                AuditOperation::Prepare,
                AuditStatus::Success,
                actor,
                json!({
                    "kind": kind::FREEZE_WINDOW,
                    "freeze_window_id": window_id,
                    "window_status": action.as_str(),
                    "reason": reason,
                }),
                now,
            ),
        )
        .await?;
    }
    Ok(())
}

/// Another active window covering one of `tables`, if any.
async fn active_on_shared_table<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    tables: &[String],
) -> AppResult<Option<Uuid>> {
    Ok(freeze_windows::list(db, &[FreezeWindowStatus::Active])
        .await?
        .into_iter()
        .find(|(w, t)| w.id != id && t.iter().any(|name| tables.contains(name)))
        .map(|(w, _)| w.id))
}

impl CutoverEngine {
    /// Schedule a freeze window over `tables`.
    ///
    /// Rejects windows that overlap an open (scheduled or active) window on
    /// any shared table.
    pub async fn schedule_freeze_window(
        &self,
        tables: &[String],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        description: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<FreezeWindow> {
        if start_time >= end_time {
            return Err(AppError::InvalidInput(
                "freeze window start_time must be before end_time".to_string(),
            ));
        }
        if end_time <= now {
            return Err(AppError::InvalidInput(
                "freeze window must end in the future".to_string(),
            ));
        }

        let mut tables: Vec<String> = tables.iter().map(|t| t.trim().to_string()).collect();
        tables.sort();
        tables.dedup();
        if tables.is_empty() {
            return Err(AppError::InvalidInput(
                "a freeze window must cover at least one table".to_string(),
            ));
        }

        for table in &tables {
            validate_table_name(table).map_err(AppError::InvalidInput)?;
            let current = self.get_status(table).await?;
            if current.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "table '{}' is '{}' and cannot be frozen",
                    table, current.status
                )));
            }
        }

        let open = freeze_windows::list(
            self.pool.connection(),
            &[FreezeWindowStatus::Scheduled, FreezeWindowStatus::Active],
        )
        .await?;
        for existing in open.into_iter().map(to_window) {
            let existing = existing?;
            if existing.shares_tables(&tables) && existing.overlaps(start_time, end_time) {
                return Err(AppError::Conflict(format!(
                    "overlaps freeze window {} ({} to {}) on a shared table",
                    existing.id, existing.start_time, existing.end_time
                )));
            }
        }

        let txn = self.pool.begin().await?;
        let created = freeze_windows::insert(
            &txn,
            description,
            start_time,
            end_time,
            &tables,
            actor,
            now,
        )
        .await?;
        audit_window_change(
            &txn,
            created.0.id,
            &tables,
            FreezeWindowStatus::Scheduled,
            actor,
            None,
            now,
        )
        .await?;
        txn.commit().await?;

        let window = to_window(created)?;
        info!(
            window_id = %window.id,
            tables = ?window.affected_tables,
            start = %window.start_time,
            end = %window.end_time,
            actor = %actor,
            "Freeze window scheduled"
        );
        self.publish_window(&window, now);

        Ok(window)
    }

    /// All windows ordered by start time.
    pub async fn list_freeze_windows(&self) -> AppResult<Vec<FreezeWindow>> {
        freeze_windows::list(self.pool.connection(), &[])
            .await?
            .into_iter()
            .map(to_window)
            .collect()
    }

    pub async fn get_freeze_window(&self, id: Uuid) -> AppResult<FreezeWindow> {
        freeze_windows::find_by_id(self.pool.connection(), id)
            .await?
            .map(to_window)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Freeze window {}", id)))
    }

    /// Move a scheduled window to active. Denied before `start_time` and while
    /// another active window covers one of its tables.
    pub async fn activate_freeze_window(
        &self,
        id: Uuid,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<FreezeWindow> {
        let (model, tables) = self.window_row(id).await?;
        let window = FreezeWindow::from_model(model.clone(), tables.clone())?;

        if window.status != FreezeWindowStatus::Scheduled {
            return Err(AppError::Conflict(format!(
                "freeze window {} is '{}', only scheduled windows can be activated",
                id, window.status
            )));
        }
        if now < window.start_time {
            return Err(AppError::InvalidInput(format!(
                "freeze window {} cannot be activated before its start_time {}",
                id, window.start_time
            )));
        }
        if now >= window.end_time {
            return Err(AppError::InvalidInput(format!(
                "freeze window {} already ended at {}",
                id, window.end_time
            )));
        }

        let changes = freeze_window_entity::ActiveModel {
            status: Set(FreezeWindowStatus::Active.as_str().to_string()),
            activated_at: Set(Some(now)),
            ..Default::default()
        };
        self.commit_window_change(
            &model,
            &tables,
            changes,
            FreezeWindowStatus::Active,
            actor,
            None,
            now,
        )
        .await
    }

    /// Close an active window. Covered tables still in `cutover` are rolled back.
    pub async fn complete_freeze_window(
        &self,
        id: Uuid,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<FreezeWindow> {
        self.close_window(id, FreezeWindowStatus::Completed, None, actor, now)
            .await
    }

    /// Cancel a scheduled or active window. Covered tables still in `cutover`
    /// are rolled back.
    pub async fn cancel_freeze_window(
        &self,
        id: Uuid,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<FreezeWindow> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput(
                "a cancellation reason is required".to_string(),
            ));
        }
        self.close_window(id, FreezeWindowStatus::Cancelled, Some(reason), actor, now)
            .await
    }

    async fn close_window(
        &self,
        id: Uuid,
        target: FreezeWindowStatus,
        reason: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<FreezeWindow> {
        let (model, tables) = self.window_row(id).await?;
        let window = FreezeWindow::from_model(model.clone(), tables.clone())?;

        let allowed = match target {
            FreezeWindowStatus::Completed => window.status == FreezeWindowStatus::Active,
            FreezeWindowStatus::Cancelled => window.status.is_open(),
            _ => false,
        };
        if !allowed {
            return Err(AppError::Conflict(format!(
                "freeze window {} is '{}' and cannot become '{}'",
                id, window.status, target
            )));
        }

        if window.status == FreezeWindowStatus::Active {
            let (trigger, why) = if now >= window.end_time {
                (
                    RollbackTrigger::FreezeWindowExpired,
                    format!("freeze window {} expired before the table completed", id),
                )
            } else if target == FreezeWindowStatus::Cancelled {
                (
                    RollbackTrigger::FreezeWindowCancelled,
                    format!(
                        "freeze window {} cancelled by {}: {}",
                        id,
                        actor,
                        reason.unwrap_or_default()
                    ),
                )
            } else {
                (
                    RollbackTrigger::FreezeWindowClosed,
                    format!("freeze window {} closed by {} before the table completed", id, actor),
                )
            };
            for table in &window.affected_tables {
                self.force_rollback(table, trigger, &why, now).await?;
            }
        }

        let mut changes = freeze_window_entity::ActiveModel {
            status: Set(target.as_str().to_string()),
            ..Default::default()
        };
        match target {
            FreezeWindowStatus::Completed => changes.completed_at = Set(Some(now)),
            _ => {
                changes.cancelled_at = Set(Some(now));
                changes.cancel_reason = Set(reason.map(str::to_string));
            }
        }

        self.commit_window_change(&model, &tables, changes, target, actor, reason, now)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit_window_change(
        &self,
        model: &freeze_window_entity::Model,
        tables: &[String],
        changes: freeze_window_entity::ActiveModel,
        target: FreezeWindowStatus,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<FreezeWindow> {
        let txn = self.pool.begin().await?;
        if target == FreezeWindowStatus::Active {
            freeze_windows::lock_tables(&txn, tables).await?;
            if let Some(other) = active_on_shared_table(&txn, model.id, tables).await? {
                txn.rollback().await?;
                return Err(AppError::Conflict(format!(
                    "freeze window {} is already active on a shared table",
                    other
                )));
            }
        }
        if !freeze_windows::compare_and_swap(&txn, model, changes, now).await? {
            return Err(AppError::Conflict(format!(
                "freeze window {} changed concurrently; re-fetch and retry",
                model.id
            )));
        }
        audit_window_change(&txn, model.id, tables, target, actor, reason, now).await?;
        txn.commit().await?;

        let window = self.get_freeze_window(model.id).await?;
        info!(
            window_id = %window.id,
            status = %window.status,
            actor = %actor,
            "Freeze window changed"
        );
        self.publish_window(&window, now);
        Ok(window)
    }

    async fn window_row(&self, id: Uuid) -> AppResult<freeze_windows::WindowWithTables> {
        freeze_windows::find_by_id(self.pool.connection(), id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Freeze window {}", id)))
    }

    fn publish_window(&self, window: &FreezeWindow, now: DateTime<Utc>) {
        self.publish(
            CutoverEvent::FreezeWindowChanged(FreezeWindowPayload {
                freeze_window_id: window.id,
                status: window.status.as_str().to_string(),
                affected_tables: window.affected_tables.clone(),
            }),
            now,
        );
    }

    /// The active window covering `table` at `now`, if any.
    pub async fn active_window_for(
        &self,
        table: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<FreezeWindow>> {
        for pair in freeze_windows::open_for_table(self.pool.connection(), table).await? {
            let window = to_window(pair)?;
            if window.status == FreezeWindowStatus::Active && window.contains(now) {
                return Ok(Some(window));
            }
        }
        Ok(None)
    }

    /// Writes to `table` must be rejected while an active window covers it.
    pub async fn writes_frozen(&self, table: &str, now: DateTime<Utc>) -> AppResult<bool> {
        Ok(self.active_window_for(table, now).await?.is_some())
    }

    /// One coordinator pass: close expired windows (rolling back covered
    /// tables still in `cutover`), cancel windows that were never activated,
    /// then activate windows whose start time has come.
    pub async fn freeze_window_tick(&self, now: DateTime<Utc>) -> AppResult<FreezeTickReport> {
        let mut report = FreezeTickReport::default();
        let windows = freeze_windows::list(
            self.pool.connection(),
            &[FreezeWindowStatus::Active, FreezeWindowStatus::Scheduled],
        )
        .await?
        .into_iter()
        .map(to_window)
        .collect::<AppResult<Vec<_>>>()?;

        for window in windows
            .iter()
            .filter(|w| w.status == FreezeWindowStatus::Active && now >= w.end_time)
        {
            for table in &window.affected_tables {
                let in_cutover = self
                    .get_status(table)
                    .await
                    .is_ok_and(|t| t.status == CutoverStatus::Cutover);
                if in_cutover {
                    let reason = format!(
                        "freeze window {} expired at {} before the table reached zero drift",
                        window.id, window.end_time
                    );
                    if let Some(rolled) = self
                        .force_rollback(table, RollbackTrigger::FreezeWindowExpired, &reason, now)
                        .await?
                    {
                        report.rolled_back.push(rolled.name);
                    }
                }
            }
            match self
                .complete_freeze_window(window.id, SYSTEM_ACTOR, now)
                .await
            {
                Ok(_) => report.completed.push(window.id),
                Err(e) => warn!(window_id = %window.id, "Failed to complete expired window: {}", e),
            }
        }

        for window in windows
            .iter()
            .filter(|w| w.status == FreezeWindowStatus::Scheduled)
        {
            if now >= window.end_time {
                match self
                    .cancel_freeze_window(
                        window.id,
                        "window ended before it was activated",
                        SYSTEM_ACTOR,
                        now,
                    )
                    .await
                {
                    Ok(_) => report.cancelled.push(window.id),
                    Err(e) => warn!(window_id = %window.id, "Failed to cancel missed window: {}", e),
                }
            } else if now >= window.start_time {
                match self
                    .activate_freeze_window(window.id, SYSTEM_ACTOR, now)
                    .await
                {
                    Ok(_) => report.activated.push(window.id),
                    Err(e) => warn!(window_id = %window.id, "Failed to activate window: {}", e),
                }
            }
        }

        Ok(report)
    }
}

/// Start the freeze window coordinator background task.
pub fn start_freeze_window_task(engine: CutoverEngine, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting freeze window coordinator (interval: {} seconds)",
            interval_secs
        );

        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            ticker.tick().await;

            match engine.freeze_window_tick(Utc::now()).await {
                Ok(report) if !report.rolled_back.is_empty() => {
                    warn!(tables = ?report.rolled_back, "Freeze windows expired with tables in cutover");
                }
                Ok(_) => {}
                Err(e) => error!("Freeze window tick error: {}", e),
            }
        }
    })
}
