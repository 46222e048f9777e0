//! Database queries for the append-only audit log.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::cutover_audit_entry::{self, ActiveModel, Entity as AuditEntity};
use crate::error::{AppError, AppResult};

use super::is_unique_violation;

/// Outcome of an insert attempt.
pub enum InsertOutcome {
    Inserted,
    /// Another writer took this `(table_name, sequence)` slot.
    SequenceTaken,
}

/// Insert a fully-formed entry. Rows are never updated afterwards.
pub async fn insert<C: ConnectionTrait>(db: &C, entry: ActiveModel) -> AppResult<InsertOutcome> {
    match AuditEntity::insert(entry).exec(db).await {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::SequenceTaken),
        Err(e) => Err(AppError::Database(format!(
            "Failed to insert audit entry: {}",
            e
        ))),
    }
}

/// Most recent entry for a table name.
pub async fn last_for_table<C: ConnectionTrait>(
    db: &C,
    table_name: &str,
) -> AppResult<Option<cutover_audit_entry::Model>> {
    let result = AuditEntity::find()
        .filter(cutover_audit_entry::Column::TableName.eq(table_name))
        .order_by_desc(cutover_audit_entry::Column::Sequence)
        .one(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get audit entry: {}", e)))?;

    Ok(result)
}

/// Full trail for a table name in sequence order.
pub async fn trail<C: ConnectionTrait>(
    db: &C,
    table_name: &str,
) -> AppResult<Vec<cutover_audit_entry::Model>> {
    let result = AuditEntity::find()
        .filter(cutover_audit_entry::Column::TableName.eq(table_name))
        .order_by_asc(cutover_audit_entry::Column::Sequence)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get audit trail: {}", e)))?;

    Ok(result)
}
