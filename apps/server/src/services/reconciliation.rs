//! Reconciliation job runner.
//!
//! Jobs move `pending -> running -> {completed, failed}` and never loop
//! back. A transient failure schedules a new job carrying `attempt + 1`;
//! exhausting the attempt budget raises a blocking alert instead.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use sea_orm::Set;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::audit;
use super::checklist;
use super::drift_detector::{DriftReport, DriftScope};
use super::engine::{CutoverEngine, SYSTEM_ACTOR};
use crate::config::{ReconciliationSettings, defaults};
use crate::db::reconciliation_jobs::{self, NewJob};
use crate::db::cutover_tables;
use crate::entity::reconciliation_job;
use crate::error::{AdvanceError, AppError, AppResult, DriftError};
use crate::models::event::{AlertPayload, JobFinishedPayload};
use crate::models::{
    AuditOperation, AuditStatus, CutoverEvent, CutoverStatus, CutoverTable, DataSource,
    IntegrityStatus, JobListQuery, JobListResponse, JobStatus, JobType, NewAuditEntry,
    ReconciliationJob, RollbackTrigger, ValidationStatus, audit_entry::kind,
};

/// Times a successful result is re-applied when the table row moved underneath it.
const APPLY_ATTEMPTS: usize = 5;

/// Exponential retry delay, capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    /// Defaults: initial=5s, max=600s, multiplier=2.0
    pub fn new() -> Self {
        Self {
            initial: Duration::from_secs(defaults::DEV_JOB_BACKOFF_INITIAL_SECS),
            max: Duration::from_secs(defaults::DEV_JOB_BACKOFF_MAX_SECS),
            multiplier: 2.0,
        }
    }

    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let delay = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max.as_secs_f64()))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry budget, timeouts and per-phase scheduling intervals.
#[derive(Debug, Clone)]
pub struct ReconciliationPolicy {
    pub job_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
    pub full_interval: chrono::Duration,
    pub incremental_interval: chrono::Duration,
    pub drift_check_interval: chrono::Duration,
}

impl ReconciliationPolicy {
    pub fn from_settings(settings: &ReconciliationSettings) -> Self {
        Self {
            job_timeout: settings.job_timeout(),
            max_attempts: settings.max_attempts.max(1),
            backoff: ExponentialBackoff::new()
                .with_initial(Duration::from_secs(settings.backoff_initial_secs))
                .with_max(Duration::from_secs(settings.backoff_max_secs)),
            full_interval: chrono::Duration::seconds(settings.full_interval_secs as i64),
            incremental_interval: chrono::Duration::seconds(
                settings.incremental_interval_secs as i64,
            ),
            drift_check_interval: chrono::Duration::seconds(
                settings.drift_check_interval_secs as i64,
            ),
        }
    }

    /// Job type and cadence for a table in `status`; `None` for terminal tables.
    pub fn schedule_for(&self, status: CutoverStatus) -> Option<(JobType, chrono::Duration)> {
        match status {
            CutoverStatus::Pending => Some((JobType::Full, self.full_interval)),
            CutoverStatus::Ready => Some((JobType::Incremental, self.incremental_interval)),
            CutoverStatus::Cutover => Some((JobType::DriftCheck, self.drift_check_interval)),
            CutoverStatus::Completed | CutoverStatus::RolledBack => None,
        }
    }

    /// A running job started before this instant is considered lost.
    fn stall_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::seconds(self.job_timeout.as_secs() as i64 * 2)
    }
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(defaults::DEV_JOB_TIMEOUT_SECS),
            max_attempts: defaults::DEV_JOB_MAX_ATTEMPTS,
            backoff: ExponentialBackoff::new(),
            full_interval: chrono::Duration::seconds(defaults::DEV_FULL_INTERVAL_SECS as i64),
            incremental_interval: chrono::Duration::seconds(
                defaults::DEV_INCREMENTAL_INTERVAL_SECS as i64,
            ),
            drift_check_interval: chrono::Duration::seconds(
                defaults::DEV_DRIFT_CHECK_INTERVAL_SECS as i64,
            ),
        }
    }
}

/// What one runner pass did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconciliationTickReport {
    pub reaped: Vec<Uuid>,
    pub scheduled: Vec<Uuid>,
    pub ran: Vec<ReconciliationJob>,
}

/// Drift at or under the threshold. A zero threshold means exact equality.
fn within_threshold(report: &DriftReport, threshold: f64) -> bool {
    report.record_count_difference == 0 || (threshold > 0.0 && report.drift_percentage <= threshold)
}

impl CutoverEngine {
    /// Enqueue a job for the current attempt of `name`.
    pub async fn trigger_reconciliation(
        &self,
        name: &str,
        job_type: JobType,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ReconciliationJob> {
        let table = self.get_status(name).await?;
        if table.status.is_terminal() {
            return Err(AdvanceError::TerminalState {
                table: table.name,
                status: table.status,
            }
            .into());
        }

        let job = reconciliation_jobs::insert(
            self.pool.connection(),
            NewJob {
                cutover_table_id: table.id,
                table_name: table.name.clone(),
                job_type,
                attempt: 1,
                retry_of: None,
                scheduled_at: now,
                triggered_by: actor.to_string(),
            },
            now,
        )
        .await?;

        info!(
            job_id = %job.id,
            table = %table.name,
            job_type = job_type.as_str(),
            actor = %actor,
            "Reconciliation job queued"
        );

        ReconciliationJob::from_model(job)
    }

    pub async fn get_job(&self, id: Uuid) -> AppResult<ReconciliationJob> {
        reconciliation_jobs::find_by_id(self.pool.connection(), id)
            .await?
            .map(ReconciliationJob::from_model)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Reconciliation job {}", id)))
    }

    /// Newest jobs first.
    pub async fn list_jobs(&self, query: &JobListQuery) -> AppResult<JobListResponse> {
        let (rows, total) = reconciliation_jobs::list(
            self.pool.connection(),
            query.table.as_deref(),
            query.status,
            query.clamped_limit(),
        )
        .await?;

        let jobs = rows
            .into_iter()
            .map(ReconciliationJob::from_model)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(JobListResponse { jobs, total })
    }

    /// Failed jobs whose alert no later successful job has cleared.
    pub async fn list_blocking_alerts(&self) -> AppResult<Vec<ReconciliationJob>> {
        reconciliation_jobs::open_alerts(self.pool.connection())
            .await?
            .into_iter()
            .map(ReconciliationJob::from_model)
            .collect()
    }

    /// Claim a pending job and run it to a finished state.
    pub async fn run_job(&self, job_id: Uuid, now: DateTime<Utc>) -> AppResult<ReconciliationJob> {
        let db = self.pool.connection();
        let job = self.get_job(job_id).await?;

        if !reconciliation_jobs::claim(db, job_id, now).await? {
            return Err(AppError::Conflict(format!(
                "reconciliation job {} is '{}', only pending jobs can run",
                job_id,
                job.status.as_str()
            )));
        }

        let watermark = reconciliation_jobs::last_completed(db, job.cutover_table_id)
            .await?
            .and_then(|last| last.started_at);
        let scope = DriftScope::for_job(job.job_type, watermark);

        info!(
            job_id = %job.id,
            table = %job.table_name,
            job_type = job.job_type.as_str(),
            attempt = job.attempt,
            "Reconciliation job started"
        );

        let timeout = self.settings.reconciliation.job_timeout;
        let outcome = match tokio::time::timeout(
            timeout,
            self.detector.detect(&job.table_name, scope),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DriftError::Timeout {
                table: job.table_name.clone(),
                seconds: timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(report) => self.complete_job(&job, report, now).await?,
            Err(err) => self.fail_job(&job, err, now).await?,
        }

        self.get_job(job_id).await
    }

    /// Write a successful result: the job row, the table's drift fields,
    /// the two system gates and the audit entry commit together.
    async fn complete_job(
        &self,
        job: &ReconciliationJob,
        report: DriftReport,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let threshold = self.settings.ready_drift_threshold;
        let data_consistent = within_threshold(&report, threshold);
        let integrity_clean = report.integrity_clean();
        let validation = if data_consistent && integrity_clean {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };
        let integrity_status = if integrity_clean {
            IntegrityStatus::Clean
        } else {
            IntegrityStatus::Issues
        };

        let job_changes = reconciliation_job::ActiveModel {
            status: Set(JobStatus::Completed.as_str().to_string()),
            records_processed: Set(report.records_processed),
            records_total: Set(Some(report.record_count_legacy)),
            drift_detected: Set(report.record_count_difference),
            drift_percentage: Set(Some(report.drift_percentage)),
            errors: Set(json!([])),
            ..Default::default()
        };

        let entry = NewAuditEntry::new(
            &job.table_name,
            Some(job.cutover_table_id),
            AuditOperation::Reconciliation,
            AuditStatus::Success,
            SYSTEM_ACTOR,
            json!({
                "kind": kind::RECONCILIATION,
                "job_id": job.id,
                "job_type": job.job_type.as_str(),
                "attempt": job.attempt,
                "record_count_legacy": report.record_count_legacy,
                "record_count_new": report.record_count_new,
                "record_count_difference": report.record_count_difference,
                "drift_percentage": report.drift_percentage,
                "integrity_issues": report.integrity_issues,
                "validation_status": validation.as_str(),
            }),
            now,
        );

        let mut applied: Option<CutoverTable> = None;
        let mut committed = false;

        for _ in 0..APPLY_ATTEMPTS {
            let row = cutover_tables::find_by_id(self.pool.connection(), job.cutover_table_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Cutover table for job {}", job.id)))?;
            let table = CutoverTable::from_model(row)?;

            let txn = self.pool.begin().await?;
            if !reconciliation_jobs::finish(&txn, job.id, job_changes.clone(), now).await? {
                txn.rollback().await?;
                return Err(AppError::Conflict(format!(
                    "reconciliation job {} is no longer running",
                    job.id
                )));
            }

            let updated = if table.status.is_terminal() {
                None
            } else {
                let mut changes = cutover_tables::versioned_changes(table.version, now);
                changes.record_count_legacy = Set(report.record_count_legacy);
                changes.record_count_new = Set(report.record_count_new);
                changes.record_count_difference = Set(report.record_count_difference);
                changes.drift_percentage = Set(report.drift_percentage);
                changes.referential_integrity_status = Set(integrity_status.as_str().to_string());
                changes.referential_integrity_issues = Set(json!(report.integrity_issues));
                changes.validation_status = Set(validation.as_str().to_string());
                changes.last_reconciled_at = Set(Some(now));

                match cutover_tables::compare_and_swap(
                    &txn,
                    table.id,
                    table.status,
                    table.version,
                    changes,
                )
                .await?
                {
                    Some(updated) => Some(updated),
                    None => {
                        txn.rollback().await?;
                        continue;
                    }
                }
            };

            if let Some(updated) = &updated {
                checklist::set_system_gates(
                    &txn,
                    updated,
                    data_consistent,
                    integrity_clean,
                    SYSTEM_ACTOR,
                    now,
                )
                .await?;
            }

            match audit::append(&txn, entry.clone()).await {
                Ok(_) => {}
                Err(AppError::Conflict(_)) => {
                    txn.rollback().await?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            txn.commit().await?;
            applied = updated.map(CutoverTable::from_model).transpose()?;
            committed = true;
            break;
        }

        if !committed {
            return Err(AppError::Conflict(format!(
                "could not apply reconciliation job {} to '{}': the table kept changing",
                job.id, job.table_name
            )));
        }

        info!(
            job_id = %job.id,
            table = %job.table_name,
            drift = report.drift_percentage,
            difference = report.record_count_difference,
            integrity_issues = report.integrity_issues.len(),
            validation = validation.as_str(),
            "Reconciliation job completed"
        );
        self.publish(
            CutoverEvent::JobFinished(JobFinishedPayload {
                job_id: job.id,
                table_name: job.table_name.clone(),
                job_type: job.job_type,
                status: JobStatus::Completed,
                drift_detected: report.record_count_difference,
                drift_percentage: Some(report.drift_percentage),
            }),
            now,
        );

        if let Some(table) = applied
            && table.status == CutoverStatus::Cutover
        {
            self.apply_cutover_policy(&table, &report, now).await?;
        }

        Ok(())
    }

    /// In `cutover`, drift or integrity issues force a rollback; a clean
    /// result after the dual-write soak moves reads to the new store.
    async fn apply_cutover_policy(
        &self,
        table: &CutoverTable,
        report: &DriftReport,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if !report.is_zero() {
            let (trigger, reason) = if report.record_count_difference != 0 {
                (
                    RollbackTrigger::DriftDetected,
                    format!(
                        "drift {:.4} ({} records) detected during cutover",
                        report.drift_percentage, report.record_count_difference
                    ),
                )
            } else {
                (
                    RollbackTrigger::IntegrityIssues,
                    format!(
                        "referential integrity issues during cutover: {}",
                        report.integrity_issues.join("; ")
                    ),
                )
            };
            self.force_rollback(&table.name, trigger, &reason, now).await?;
            return Ok(());
        }

        let soaked = table
            .dual_write_started_at
            .is_some_and(|started| now - started >= self.settings.dual_write_soak);
        if table.read_source == DataSource::Legacy && soaked {
            match self.switch_reads(table, now).await {
                Ok(_) => {}
                Err(AppError::Advance(AdvanceError::ConcurrentTransition { .. })) => {
                    warn!(table = %table.name, "Read switch lost a race; the next drift check retries it");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Record a failed run and either queue a retry or raise the alert.
    async fn fail_job(
        &self,
        job: &ReconciliationJob,
        err: DriftError,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let policy = &self.settings.reconciliation;
        let retry = err.is_transient() && (job.attempt as u32) < policy.max_attempts;
        let message = err.to_string();

        let txn = self.pool.begin().await?;

        let changes = reconciliation_job::ActiveModel {
            status: Set(JobStatus::Failed.as_str().to_string()),
            errors: Set(json!([message])),
            blocking_alert: Set(!retry),
            ..Default::default()
        };
        if !reconciliation_jobs::finish(&txn, job.id, changes, now).await? {
            txn.rollback().await?;
            return Err(AppError::Conflict(format!(
                "reconciliation job {} is no longer running",
                job.id
            )));
        }

        if retry {
            let delay = policy.backoff.next_delay(job.attempt as u32);
            let retry_job = reconciliation_jobs::insert(
                &txn,
                NewJob {
                    cutover_table_id: job.cutover_table_id,
                    table_name: job.table_name.clone(),
                    job_type: job.job_type,
                    attempt: job.attempt + 1,
                    retry_of: Some(job.id),
                    scheduled_at: now + chrono::Duration::seconds(delay.as_secs() as i64),
                    triggered_by: SYSTEM_ACTOR.to_string(),
                },
                now,
            )
            .await?;
            txn.commit().await?;

            warn!(
                job_id = %job.id,
                retry_job_id = %retry_job.id,
                table = %job.table_name,
                attempt = job.attempt,
                delay_secs = delay.as_secs(),
                "Reconciliation job failed, retry scheduled: {}",
                message
            );
        } else {
            if let Some(row) = cutover_tables::find_by_id(&txn, job.cutover_table_id).await?
                && let Some(status) = CutoverStatus::parse(&row.status)
                && !status.is_terminal()
            {
                let mut table_changes = cutover_tables::versioned_changes(row.version, now);
                table_changes.validation_status = Set(ValidationStatus::Failed.as_str().to_string());
                let swapped =
                    cutover_tables::compare_and_swap(&txn, row.id, status, row.version, table_changes)
                        .await?;
                if swapped.is_none() {
                    warn!(table = %job.table_name, "Table changed while raising alert; validation status left as is");
                }
            }

            audit::append(
                &txn,
                NewAuditEntry::new(
                    &job.table_name,
                    Some(job.cutover_table_id),
                    AuditOperation::Reconciliation,
                    AuditStatus::Failure,
                    SYSTEM_ACTOR,
                    json!({
                        "kind": kind::RECONCILIATION,
                        "job_id": job.id,
                        "job_type": job.job_type.as_str(),
                        "attempt": job.attempt,
                        "blocking_alert": true,
                        "transient": err.is_transient(),
                    }),
                    now,
                )
                .with_error(&message),
            )
            .await?;
            txn.commit().await?;

            error!(
                job_id = %job.id,
                table = %job.table_name,
                attempt = job.attempt,
                "Reconciliation blocked, alert raised: {}",
                message
            );
            self.publish(
                CutoverEvent::ReconciliationAlert(AlertPayload {
                    job_id: job.id,
                    table_name: job.table_name.clone(),
                    attempt: job.attempt,
                    error: message.clone(),
                }),
                now,
            );
        }

        self.publish(
            CutoverEvent::JobFinished(JobFinishedPayload {
                job_id: job.id,
                table_name: job.table_name.clone(),
                job_type: job.job_type,
                status: JobStatus::Failed,
                drift_detected: 0,
                drift_percentage: None,
            }),
            now,
        );

        Ok(())
    }

    /// Fail `running` jobs that outlived twice the job timeout.
    pub async fn reap_stalled_jobs(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let cutoff = self.settings.reconciliation.stall_cutoff(now);
        let running =
            reconciliation_jobs::in_status(self.pool.connection(), JobStatus::Running).await?;

        let mut reaped = Vec::new();
        for row in running {
            if row.started_at.is_none_or(|started| started >= cutoff) {
                continue;
            }
            let job = ReconciliationJob::from_model(row)?;
            let err = DriftError::Timeout {
                table: job.table_name.clone(),
                seconds: self.settings.reconciliation.job_timeout.as_secs(),
            };
            match self.fail_job(&job, err, now).await {
                Ok(()) => reaped.push(job.id),
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if !reaped.is_empty() {
            warn!(count = reaped.len(), "Reaped stalled reconciliation jobs");
        }
        Ok(reaped)
    }

    /// Queue the phase-appropriate job for every live table that is due.
    pub async fn schedule_periodic_jobs(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let db = self.pool.connection();
        let policy = &self.settings.reconciliation;
        let mut scheduled = Vec::new();

        for row in cutover_tables::list_current(db).await? {
            let Some(status) = CutoverStatus::parse(&row.status) else {
                continue;
            };
            let Some((job_type, every)) = policy.schedule_for(status) else {
                continue;
            };

            let jobs = reconciliation_jobs::for_table(db, row.id).await?;
            let in_flight = jobs.iter().any(|j| {
                j.status == JobStatus::Pending.as_str() || j.status == JobStatus::Running.as_str()
            });
            if in_flight {
                continue;
            }
            let recent = jobs
                .iter()
                .rev()
                .find(|j| j.job_type == job_type.as_str())
                .is_some_and(|last| last.scheduled_at + every > now);
            if recent {
                continue;
            }

            let job = reconciliation_jobs::insert(
                db,
                NewJob {
                    cutover_table_id: row.id,
                    table_name: row.name.clone(),
                    job_type,
                    attempt: 1,
                    retry_of: None,
                    scheduled_at: now,
                    triggered_by: SYSTEM_ACTOR.to_string(),
                },
                now,
            )
            .await?;
            scheduled.push(job.id);
        }

        Ok(scheduled)
    }

    /// Run every due pending job, one per table, concurrently across tables.
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> AppResult<Vec<ReconciliationJob>> {
        let pending =
            reconciliation_jobs::in_status(self.pool.connection(), JobStatus::Pending).await?;

        let mut seen = HashSet::new();
        let due: Vec<Uuid> = pending
            .into_iter()
            .filter(|job| job.scheduled_at <= now)
            .filter(|job| seen.insert(job.cutover_table_id))
            .map(|job| job.id)
            .collect();

        let results = join_all(due.into_iter().map(|id| self.run_job(id, now))).await;

        let mut ran = Vec::new();
        for result in results {
            match result {
                Ok(job) => ran.push(job),
                Err(e) => error!("Reconciliation job error: {}", e),
            }
        }
        Ok(ran)
    }

    /// One runner pass: reap, schedule, run.
    pub async fn reconciliation_tick(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<ReconciliationTickReport> {
        let reaped = self.reap_stalled_jobs(now).await?;
        let scheduled = self.schedule_periodic_jobs(now).await?;
        let ran = self.run_due_jobs(now).await?;
        Ok(ReconciliationTickReport {
            reaped,
            scheduled,
            ran,
        })
    }
}

/// Start the reconciliation runner background task.
pub fn start_reconciliation_task(engine: CutoverEngine, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting reconciliation runner (interval: {} seconds)",
            interval_secs
        );

        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            ticker.tick().await;

            match engine.reconciliation_tick(Utc::now()).await {
                Ok(report) if !report.ran.is_empty() || !report.reaped.is_empty() => {
                    info!(
                        ran = report.ran.len(),
                        scheduled = report.scheduled.len(),
                        reaped = report.reaped.len(),
                        "Reconciliation pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Reconciliation task error: {}", e),
            }
        }
    })
}
