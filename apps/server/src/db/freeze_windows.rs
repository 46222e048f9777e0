//! Database queries for freeze windows and their affected tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::freeze_window::{self, ActiveModel, Entity as FreezeWindowEntity};
use crate::entity::freeze_window_table::{self, Entity as FreezeWindowTableEntity};
use crate::error::{AppError, AppResult};
use crate::models::FreezeWindowStatus;

/// A window row together with its affected table names.
pub type WindowWithTables = (freeze_window::Model, Vec<String>);

/// Insert a scheduled window and its table rows.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    description: &str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    tables: &[String],
    created_by: &str,
    now: DateTime<Utc>,
) -> AppResult<WindowWithTables> {
    let id = Uuid::now_v7();
    let window = ActiveModel {
        id: Set(id),
        description: Set(description.to_string()),
        start_time: Set(start_time),
        end_time: Set(end_time),
        status: Set(FreezeWindowStatus::Scheduled.as_str().to_string()),
        created_by: Set(created_by.to_string()),
        activated_at: Set(None),
        completed_at: Set(None),
        cancelled_at: Set(None),
        cancel_reason: Set(None),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .map_err(|e| AppError::Database(format!("Failed to insert freeze window: {}", e)))?;

    for table in tables {
        freeze_window_table::ActiveModel {
            id: Set(Uuid::now_v7()),
            freeze_window_id: Set(id),
            table_name: Set(table.clone()),
        }
        .insert(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert freeze window table: {}", e)))?;
    }

    Ok((window, tables.to_vec()))
}

async fn attach_tables<C: ConnectionTrait>(
    db: &C,
    windows: Vec<freeze_window::Model>,
) -> AppResult<Vec<WindowWithTables>> {
    if windows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = windows.iter().map(|w| w.id).collect();
    let rows = FreezeWindowTableEntity::find()
        .filter(freeze_window_table::Column::FreezeWindowId.is_in(ids))
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get freeze window tables: {}", e)))?;

    let mut by_window: HashMap<Uuid, Vec<String>> = HashMap::new();
    for row in rows {
        by_window
            .entry(row.freeze_window_id)
            .or_default()
            .push(row.table_name);
    }

    Ok(windows
        .into_iter()
        .map(|w| {
            let tables = by_window.remove(&w.id).unwrap_or_default();
            (w, tables)
        })
        .collect())
}

/// Get a window by ID.
pub async fn find_by_id<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<WindowWithTables>> {
    let window = FreezeWindowEntity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get freeze window: {}", e)))?;

    match window {
        Some(w) => Ok(attach_tables(db, vec![w]).await?.pop()),
        None => Ok(None),
    }
}

/// Windows in any of the given statuses (all windows when empty), by start time.
pub async fn list<C: ConnectionTrait>(
    db: &C,
    statuses: &[FreezeWindowStatus],
) -> AppResult<Vec<WindowWithTables>> {
    let mut query = FreezeWindowEntity::find().order_by_asc(freeze_window::Column::Id);
    if !statuses.is_empty() {
        query = query.filter(
            freeze_window::Column::Status.is_in(statuses.iter().map(|s| s.as_str())),
        );
    }

    let mut windows = query
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list freeze windows: {}", e)))?;
    windows.sort_by_key(|w| w.start_time);

    attach_tables(db, windows).await
}

/// Open (scheduled or active) windows that list `table`.
pub async fn open_for_table<C: ConnectionTrait>(
    db: &C,
    table: &str,
) -> AppResult<Vec<WindowWithTables>> {
    Ok(list(db, &[FreezeWindowStatus::Scheduled, FreezeWindowStatus::Active])
        .await?
        .into_iter()
        .filter(|(_, tables)| tables.iter().any(|t| t == table))
        .collect())
}

/// Lock the affected-table rows naming any of `tables` until the transaction
/// ends. Activations sharing a table queue behind each other; SQLite ignores
/// the lock and serializes writers on its own.
pub async fn lock_tables<C: ConnectionTrait>(db: &C, tables: &[String]) -> AppResult<()> {
    FreezeWindowTableEntity::find()
        .filter(freeze_window_table::Column::TableName.is_in(tables.iter().cloned()))
        .lock_exclusive()
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to lock freeze window tables: {}", e)))?;

    Ok(())
}

/// Apply `changes` only if the window still has the status and version the
/// caller read. Returns whether the write won.
pub async fn compare_and_swap<C: ConnectionTrait>(
    db: &C,
    expected: &freeze_window::Model,
    mut changes: ActiveModel,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    changes.version = Set(expected.version + 1);
    changes.updated_at = Set(now);

    let result = FreezeWindowEntity::update_many()
        .set(changes)
        .filter(freeze_window::Column::Id.eq(expected.id))
        .filter(freeze_window::Column::Status.eq(expected.status.clone()))
        .filter(freeze_window::Column::Version.eq(expected.version))
        .exec(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update freeze window: {}", e)))?;

    Ok(result.rows_affected == 1)
}
