//! Database queries for cutover tables.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entity::cutover_table::{self, ActiveModel, Entity as CutoverTableEntity};
use crate::error::{AppError, AppResult};
use crate::models::{CutoverStatus, DataSource, IntegrityStatus, ValidationStatus};

use super::is_unique_violation;

/// Insert a fresh attempt in `pending` with legacy routing.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    name: &str,
    attempt: i32,
    created_by: &str,
    now: DateTime<Utc>,
) -> AppResult<cutover_table::Model> {
    let model = ActiveModel {
        id: Set(Uuid::now_v7()),
        name: Set(name.to_string()),
        attempt: Set(attempt),
        status: Set(CutoverStatus::Pending.as_str().to_string()),
        read_source: Set(DataSource::Legacy.as_str().to_string()),
        write_source: Set(DataSource::Legacy.as_str().to_string()),
        validation_status: Set(ValidationStatus::Pending.as_str().to_string()),
        drift_percentage: Set(0.0),
        record_count_legacy: Set(0),
        record_count_new: Set(0),
        record_count_difference: Set(0),
        referential_integrity_status: Set(IntegrityStatus::Pending.as_str().to_string()),
        referential_integrity_issues: Set(serde_json::json!([])),
        dual_write_started_at: Set(None),
        read_switched_at: Set(None),
        last_reconciled_at: Set(None),
        cutover_date: Set(None),
        rollback_date: Set(None),
        rollback_reason: Set(None),
        version: Set(0),
        created_by: Set(created_by.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    model.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!(
                "table '{}' attempt {} is already registered",
                name, attempt
            ))
        } else {
            AppError::Database(format!("Failed to insert cutover table: {}", e))
        }
    })
}

/// Get an attempt row by ID.
pub async fn find_by_id<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<cutover_table::Model>> {
    let result = CutoverTableEntity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get cutover table: {}", e)))?;

    Ok(result)
}

/// Latest attempt for a table name.
pub async fn find_current<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> AppResult<Option<cutover_table::Model>> {
    let result = CutoverTableEntity::find()
        .filter(cutover_table::Column::Name.eq(name))
        .order_by_desc(cutover_table::Column::Attempt)
        .one(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get cutover table: {}", e)))?;

    Ok(result)
}

/// Latest attempt of every table, ordered by name.
pub async fn list_current<C: ConnectionTrait>(db: &C) -> AppResult<Vec<cutover_table::Model>> {
    let rows = CutoverTableEntity::find()
        .order_by_asc(cutover_table::Column::Name)
        .order_by_desc(cutover_table::Column::Attempt)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list cutover tables: {}", e)))?;

    let mut current: Vec<cutover_table::Model> = Vec::with_capacity(rows.len());
    for row in rows {
        if current.last().is_some_and(|last| last.name == row.name) {
            continue;
        }
        current.push(row);
    }

    Ok(current)
}

/// Apply `changes` only if the row still carries the status and version the
/// caller read. `changes` should come from [`versioned_changes`].
///
/// Returns the updated row, or `None` when another writer got there first.
pub async fn compare_and_swap<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    expected_status: CutoverStatus,
    expected_version: i32,
    changes: ActiveModel,
) -> AppResult<Option<cutover_table::Model>> {
    let result = CutoverTableEntity::update_many()
        .set(changes)
        .filter(cutover_table::Column::Id.eq(id))
        .filter(cutover_table::Column::Status.eq(expected_status.as_str()))
        .filter(cutover_table::Column::Version.eq(expected_version))
        .exec(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update cutover table: {}", e)))?;

    if result.rows_affected == 0 {
        return Ok(None);
    }

    find_by_id(db, id).await
}

/// Blank change set carrying the version bump and timestamp every write needs.
pub fn versioned_changes(expected_version: i32, now: DateTime<Utc>) -> ActiveModel {
    ActiveModel {
        version: Set(expected_version + 1),
        updated_at: Set(now),
        ..Default::default()
    }
}
