//! Reconciliation job models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::reconciliation_job;
use crate::error::{AppError, AppResult};

/// Kind of comparison a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Compare full record counts and integrity.
    Full,
    /// Compare records changed since the last completed job.
    Incremental,
    /// Counts and aggregate integrity only.
    DriftCheck,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::DriftCheck => "drift_check",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "incremental" => Some(Self::Incremental),
            "drift_check" => Some(Self::DriftCheck),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One comparison run between the two stores.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReconciliationJob {
    pub id: Uuid,
    pub cutover_table_id: Uuid,
    pub table_name: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub attempt: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_total: Option<i64>,
    pub drift_detected: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_percentage: Option<f64>,
    pub errors: Vec<String>,
    pub blocking_alert: bool,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationJob {
    pub fn from_model(m: reconciliation_job::Model) -> AppResult<Self> {
        let job_type = JobType::parse(&m.job_type).ok_or_else(|| {
            AppError::Database(format!(
                "reconciliation_jobs.job_type holds unknown value '{}'",
                m.job_type
            ))
        })?;
        let status = JobStatus::parse(&m.status).ok_or_else(|| {
            AppError::Database(format!(
                "reconciliation_jobs.status holds unknown value '{}'",
                m.status
            ))
        })?;
        let errors: Vec<String> = serde_json::from_value(m.errors).unwrap_or_default();

        Ok(Self {
            id: m.id,
            cutover_table_id: m.cutover_table_id,
            table_name: m.table_name,
            job_type,
            status,
            attempt: m.attempt,
            retry_of: m.retry_of,
            scheduled_at: m.scheduled_at,
            started_at: m.started_at,
            completed_at: m.completed_at,
            records_processed: m.records_processed,
            records_total: m.records_total,
            drift_detected: m.drift_detected,
            drift_percentage: m.drift_percentage,
            errors,
            blocking_alert: m.blocking_alert,
            triggered_by: m.triggered_by,
            created_at: m.created_at,
        })
    }
}

/// Request to enqueue a reconciliation job.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TriggerReconciliationRequest {
    pub job_type: JobType,
}

/// Query parameters for listing jobs.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct JobListQuery {
    pub table: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
}

impl JobListQuery {
    pub fn clamped_limit(&self) -> u64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }
}

/// List of reconciliation jobs.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<ReconciliationJob>,
    pub total: u64,
}
