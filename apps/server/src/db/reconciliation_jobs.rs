//! Database queries for reconciliation jobs.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::reconciliation_job::{self, ActiveModel, Entity as JobEntity};
use crate::error::{AppError, AppResult};
use crate::models::{CutoverStatus, JobStatus, JobType};

use super::cutover_tables;

/// Fields of a job about to be enqueued.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub cutover_table_id: Uuid,
    pub table_name: String,
    pub job_type: JobType,
    pub attempt: i32,
    pub retry_of: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub triggered_by: String,
}

/// Enqueue a pending job.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    job: NewJob,
    now: DateTime<Utc>,
) -> AppResult<reconciliation_job::Model> {
    let model = ActiveModel {
        id: Set(Uuid::now_v7()),
        cutover_table_id: Set(job.cutover_table_id),
        table_name: Set(job.table_name),
        job_type: Set(job.job_type.as_str().to_string()),
        status: Set(JobStatus::Pending.as_str().to_string()),
        attempt: Set(job.attempt),
        retry_of: Set(job.retry_of),
        scheduled_at: Set(job.scheduled_at),
        started_at: Set(None),
        completed_at: Set(None),
        records_processed: Set(0),
        records_total: Set(None),
        drift_detected: Set(0),
        drift_percentage: Set(None),
        errors: Set(serde_json::json!([])),
        blocking_alert: Set(false),
        triggered_by: Set(job.triggered_by),
        created_at: Set(now),
        updated_at: Set(now),
    };

    model
        .insert(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert reconciliation job: {}", e)))
}

/// Get a job by ID.
pub async fn find_by_id<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<reconciliation_job::Model>> {
    let result = JobEntity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get reconciliation job: {}", e)))?;

    Ok(result)
}

/// Newest jobs first, optionally filtered.
pub async fn list<C: ConnectionTrait>(
    db: &C,
    table_name: Option<&str>,
    status: Option<JobStatus>,
    limit: u64,
) -> AppResult<(Vec<reconciliation_job::Model>, u64)> {
    let mut query = JobEntity::find();
    if let Some(table_name) = table_name {
        query = query.filter(reconciliation_job::Column::TableName.eq(table_name));
    }
    if let Some(status) = status {
        query = query.filter(reconciliation_job::Column::Status.eq(status.as_str()));
    }

    let total = query
        .clone()
        .count(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to count reconciliation jobs: {}", e)))?;

    let jobs = query
        .order_by_desc(reconciliation_job::Column::Id) // UUIDv7 is time-ordered
        .limit(limit)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list reconciliation jobs: {}", e)))?;

    Ok((jobs, total))
}

/// Jobs in a given status, oldest first.
pub async fn in_status<C: ConnectionTrait>(
    db: &C,
    status: JobStatus,
) -> AppResult<Vec<reconciliation_job::Model>> {
    let result = JobEntity::find()
        .filter(reconciliation_job::Column::Status.eq(status.as_str()))
        .order_by_asc(reconciliation_job::Column::Id)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get reconciliation jobs: {}", e)))?;

    Ok(result)
}

/// All jobs of one attempt, oldest first.
pub async fn for_table<C: ConnectionTrait>(
    db: &C,
    cutover_table_id: Uuid,
) -> AppResult<Vec<reconciliation_job::Model>> {
    let result = JobEntity::find()
        .filter(reconciliation_job::Column::CutoverTableId.eq(cutover_table_id))
        .order_by_asc(reconciliation_job::Column::Id)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get reconciliation jobs: {}", e)))?;

    Ok(result)
}

/// Most recent completed job for an attempt.
pub async fn last_completed<C: ConnectionTrait>(
    db: &C,
    cutover_table_id: Uuid,
) -> AppResult<Option<reconciliation_job::Model>> {
    let result = JobEntity::find()
        .filter(reconciliation_job::Column::CutoverTableId.eq(cutover_table_id))
        .filter(reconciliation_job::Column::Status.eq(JobStatus::Completed.as_str()))
        .order_by_desc(reconciliation_job::Column::Id)
        .one(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get last completed job: {}", e)))?;

    Ok(result)
}

/// Move a pending job to running. Returns false if someone else claimed it.
pub async fn claim<C: ConnectionTrait>(db: &C, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
    let changes = ActiveModel {
        status: Set(JobStatus::Running.as_str().to_string()),
        started_at: Set(Some(now)),
        updated_at: Set(now),
        ..Default::default()
    };

    let result = JobEntity::update_many()
        .set(changes)
        .filter(reconciliation_job::Column::Id.eq(id))
        .filter(reconciliation_job::Column::Status.eq(JobStatus::Pending.as_str()))
        .exec(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to claim reconciliation job: {}", e)))?;

    Ok(result.rows_affected == 1)
}

/// Write the outcome of a running job. Returns false if the job is no longer
/// running (for example the reaper already failed it).
pub async fn finish<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    mut changes: ActiveModel,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    changes.completed_at = Set(Some(now));
    changes.updated_at = Set(now);

    let result = JobEntity::update_many()
        .set(changes)
        .filter(reconciliation_job::Column::Id.eq(id))
        .filter(reconciliation_job::Column::Status.eq(JobStatus::Running.as_str()))
        .exec(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to finish reconciliation job: {}", e)))?;

    Ok(result.rows_affected == 1)
}

/// Fail every pending job of an attempt (used when the attempt reaches a terminal state).
pub async fn cancel_pending_for_table<C: ConnectionTrait>(
    db: &C,
    cutover_table_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<u64> {
    let changes = ActiveModel {
        status: Set(JobStatus::Failed.as_str().to_string()),
        errors: Set(serde_json::json!([reason])),
        completed_at: Set(Some(now)),
        updated_at: Set(now),
        ..Default::default()
    };

    let result = JobEntity::update_many()
        .set(changes)
        .filter(reconciliation_job::Column::CutoverTableId.eq(cutover_table_id))
        .filter(reconciliation_job::Column::Status.eq(JobStatus::Pending.as_str()))
        .exec(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to cancel pending jobs: {}", e)))?;

    Ok(result.rows_affected)
}

/// Jobs flagged with a blocking alert that no later completed job has cleared.
/// Alerts of attempts that reached a terminal state no longer block anything.
pub async fn open_alerts<C: ConnectionTrait>(db: &C) -> AppResult<Vec<reconciliation_job::Model>> {
    let alerts = JobEntity::find()
        .filter(reconciliation_job::Column::BlockingAlert.eq(true))
        .order_by_asc(reconciliation_job::Column::Id)
        .all(db)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get alert jobs: {}", e)))?;

    let mut open = Vec::new();
    for alert in alerts {
        let attempt_closed = cutover_tables::find_by_id(db, alert.cutover_table_id)
            .await?
            .and_then(|table| CutoverStatus::parse(&table.status))
            .is_none_or(|status| status.is_terminal());
        if attempt_closed {
            continue;
        }
        let cleared = last_completed(db, alert.cutover_table_id)
            .await?
            .is_some_and(|done| done.id > alert.id);
        if !cleared {
            open.push(alert);
        }
    }

    Ok(open)
}
