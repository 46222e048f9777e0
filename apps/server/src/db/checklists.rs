//! Database queries for cutover checklists.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::cutover_checklist::{self, ActiveModel, Entity as ChecklistEntity};
use crate::entity::cutover_table;
use crate::error::{AppError, AppResult};
use crate::models::ChecklistGate;

/// Create an all-false checklist for a new attempt.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    table: &cutover_table::Model,
    now: DateTime<Utc>,
) -> AppResult<cutover_checklist::Model> {
    let model = ActiveModel {
        id: Set(Uuid::now_v7()),
        cutover_table_id: Set(table.id),
        table_name: Set(table.name.clone()),
        data_consistency: Set(false),
        referential_integrity: Set(false),
        performance_validation: Set(false),
        security_validation: Set(false),
        backup_complete: Set(false),
        freeze_window_scheduled: Set(false),
        team_notified: Set(false),
        rollback_plan_ready: Set(false),
        completed_at: Set(None),
        completed_by: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    model
        .insert(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert checklist: {}", e)))
}

/// Checklist belonging to an attempt.
pub async fn find_for_table<C: ConnectionTrait>(
    db: &C,
    cutover_table_id: Uuid,
) -> AppResult<Option<cutover_checklist::Model>> {
    let result = ChecklistEntity::find()
        .filter(cutover_checklist::Column::CutoverTableId.eq(cutover_table_id))
        .one(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get checklist: {}", e)))?;

    Ok(result)
}

fn gate_value(model: &cutover_checklist::Model, gate: ChecklistGate) -> bool {
    match gate {
        ChecklistGate::DataConsistency => model.data_consistency,
        ChecklistGate::ReferentialIntegrity => model.referential_integrity,
        ChecklistGate::PerformanceValidation => model.performance_validation,
        ChecklistGate::SecurityValidation => model.security_validation,
        ChecklistGate::BackupComplete => model.backup_complete,
        ChecklistGate::FreezeWindowScheduled => model.freeze_window_scheduled,
        ChecklistGate::TeamNotified => model.team_notified,
        ChecklistGate::RollbackPlanReady => model.rollback_plan_ready,
    }
}

fn set_gate_value(model: &mut cutover_checklist::Model, gate: ChecklistGate, value: bool) {
    match gate {
        ChecklistGate::DataConsistency => model.data_consistency = value,
        ChecklistGate::ReferentialIntegrity => model.referential_integrity = value,
        ChecklistGate::PerformanceValidation => model.performance_validation = value,
        ChecklistGate::SecurityValidation => model.security_validation = value,
        ChecklistGate::BackupComplete => model.backup_complete = value,
        ChecklistGate::FreezeWindowScheduled => model.freeze_window_scheduled = value,
        ChecklistGate::TeamNotified => model.team_notified = value,
        ChecklistGate::RollbackPlanReady => model.rollback_plan_ready = value,
    }
}

/// Write gate values and keep `completed_at`/`completed_by` in step:
/// stamped when the last gate turns true, cleared when any turns false.
/// Only the named gate columns are written.
pub async fn set_gates<C: ConnectionTrait>(
    db: &C,
    current: cutover_checklist::Model,
    gates: &[(ChecklistGate, bool)],
    actor: &str,
    now: DateTime<Utc>,
) -> AppResult<cutover_checklist::Model> {
    let mut next = current.clone();
    for (gate, value) in gates {
        set_gate_value(&mut next, *gate, *value);
    }

    let all_true = ChecklistGate::ALL
        .into_iter()
        .all(|gate| gate_value(&next, gate));
    let (completed_at, completed_by) = match (all_true, current.completed_at) {
        (true, Some(at)) => (Some(at), current.completed_by.clone()),
        (true, None) => (Some(now), Some(actor.to_string())),
        (false, _) => (None, None),
    };

    let mut active: ActiveModel = current.into();
    for (gate, value) in gates {
        match gate {
            ChecklistGate::DataConsistency => active.data_consistency = Set(*value),
            ChecklistGate::ReferentialIntegrity => active.referential_integrity = Set(*value),
            ChecklistGate::PerformanceValidation => active.performance_validation = Set(*value),
            ChecklistGate::SecurityValidation => active.security_validation = Set(*value),
            ChecklistGate::BackupComplete => active.backup_complete = Set(*value),
            ChecklistGate::FreezeWindowScheduled => active.freeze_window_scheduled = Set(*value),
            ChecklistGate::TeamNotified => active.team_notified = Set(*value),
            ChecklistGate::RollbackPlanReady => active.rollback_plan_ready = Set(*value),
        }
    }
    active.completed_at = Set(completed_at);
    active.completed_by = Set(completed_by);
    active.updated_at = Set(now);

    active
        .update(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update checklist: {}", e)))
}
