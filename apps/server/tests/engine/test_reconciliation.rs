//! Reconciliation jobs: retries, alerts, timeouts and the periodic runner.

use std::time::Duration as StdDuration;

use chrono::Duration;
use cutover_lib::models::{JobListQuery, JobStatus, JobType, ValidationStatus};
use cutover_lib::services::{EngineSettings, ReconciliationPolicy};

use super::test_helpers::*;

fn settings(max_attempts: u32, job_timeout: StdDuration) -> EngineSettings {
    EngineSettings {
        reconciliation: ReconciliationPolicy {
            max_attempts,
            job_timeout,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn jobs_for(h: &Harness, table: &str) -> Vec<cutover_lib::models::ReconciliationJob> {
    let mut jobs = h
        .engine
        .list_jobs(&JobListQuery {
            table: Some(table.to_string()),
            status: None,
            limit: Some(200),
        })
        .await
        .unwrap()
        .jobs;
    jobs.sort_by_key(|j| j.id);
    jobs
}

#[tokio::test]
async fn test_full_job_records_counts() {
    let h = harness().await;
    let t = t0();
    h.legacy.set_count("orders", 1200);
    h.new.set_count("orders", 1200);
    h.register("orders", t).await;

    let job = h.reconcile("orders", JobType::Full, t).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 1200);
    assert_eq!(job.records_total, Some(1200));
    assert_eq!(job.drift_detected, 0);
    assert_eq!(job.drift_percentage, Some(0.0));
    assert_eq!(job.started_at, Some(t));
    assert_eq!(job.completed_at, Some(t));
    assert!(!job.blocking_alert);

    let table = h.engine.get_status("orders").await.unwrap();
    assert_eq!(table.validation_status, ValidationStatus::Passed);
    assert_eq!(table.last_reconciled_at, Some(t));
}

/// Incremental runs count rows changed since the previous run started.
#[tokio::test]
async fn test_incremental_job_uses_changed_rows() {
    let h = harness().await;
    let t = t0();
    h.seed("orders", SEEDED_ROWS);
    h.legacy.set_changed("orders", 42);
    h.register("orders", t).await;

    h.reconcile("orders", JobType::Full, t).await;
    let job = h.reconcile("orders", JobType::Incremental, t + minutes(15)).await;
    assert_eq!(job.records_processed, 42);
    assert_eq!(job.drift_detected, 0);
}

/// An unreachable store is retried with backoff, never reported as drift.
#[tokio::test]
async fn test_unavailable_store_retries_then_alerts() {
    let h = harness_with(settings(2, StdDuration::from_secs(30))).await;
    let t = t0();
    h.seed("orders", SEEDED_ROWS);
    h.register("orders", t).await;
    h.legacy.set_mode(ProbeMode::Unavailable);

    let first = h.reconcile("orders", JobType::Full, t).await;
    assert_eq!(first.status, JobStatus::Failed);
    assert!(!first.blocking_alert);
    assert!(first.errors[0].contains("SourceUnavailable"));
    assert_eq!(first.drift_detected, 0);

    let jobs = jobs_for(&h, "orders").await;
    assert_eq!(jobs.len(), 2);
    let retry = &jobs[1];
    assert_eq!(retry.status, JobStatus::Pending);
    assert_eq!(retry.attempt, 2);
    assert_eq!(retry.retry_of, Some(first.id));
    assert_eq!(retry.scheduled_at, t + Duration::seconds(5));

    // Not due before the backoff elapses.
    assert!(h.engine.run_due_jobs(t + Duration::seconds(1)).await.unwrap().is_empty());

    let ran = h.engine.run_due_jobs(t + Duration::seconds(5)).await.unwrap();
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].id, retry.id);
    assert_eq!(ran[0].status, JobStatus::Failed);
    assert!(ran[0].blocking_alert);

    let table = h.engine.get_status("orders").await.unwrap();
    assert_eq!(table.validation_status, ValidationStatus::Failed);
    assert_eq!(table.record_count_difference, 0);

    let alerts = h.engine.list_blocking_alerts().await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, retry.id);
    assert_eq!(h.engine.overview().await.unwrap().open_alerts, 1);
    assert_eq!(jobs_for(&h, "orders").await.len(), 2);

    // A later successful run clears the alert.
    h.legacy.set_mode(ProbeMode::Healthy);
    h.reconcile("orders", JobType::Full, t + minutes(5)).await;
    assert!(h.engine.list_blocking_alerts().await.unwrap().is_empty());
    assert_eq!(
        h.engine.get_status("orders").await.unwrap().validation_status,
        ValidationStatus::Passed
    );
}

/// Query errors are not transient: the first failure raises the alert.
#[tokio::test]
async fn test_query_error_alerts_immediately() {
    let h = harness().await;
    let t = t0();
    h.register("orders", t).await;
    h.new.set_mode(ProbeMode::QueryFails);

    let job = h.reconcile("orders", JobType::Full, t).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.blocking_alert);
    assert_eq!(jobs_for(&h, "orders").await.len(), 1);
    assert_eq!(h.engine.list_blocking_alerts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_hung_probe_times_out_and_retries() {
    let h = harness_with(settings(3, StdDuration::from_millis(50))).await;
    let t = t0();
    h.register("orders", t).await;
    h.new.set_mode(ProbeMode::Hang);

    let job = h.reconcile("orders", JobType::Full, t).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.errors[0].contains("Timeout"));
    assert!(!job.blocking_alert);

    let jobs = jobs_for(&h, "orders").await;
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].attempt, 2);
    assert_eq!(jobs[1].status, JobStatus::Pending);
}

#[tokio::test]
async fn test_reaper_fails_stalled_running_jobs() {
    let h = harness_with(settings(3, StdDuration::from_secs(60))).await;
    let t = t0();
    h.register("orders", t).await;

    let job = h
        .engine
        .trigger_reconciliation("orders", JobType::Full, OPERATOR, t)
        .await
        .unwrap();
    // Simulate a runner that claimed the job and died.
    let claimed = cutover_lib::db::reconciliation_jobs::claim(h.engine.pool().connection(), job.id, t)
        .await
        .unwrap();
    assert!(claimed);

    assert!(h.engine.reap_stalled_jobs(t + minutes(1)).await.unwrap().is_empty());

    let reaped = h.engine.reap_stalled_jobs(t + minutes(3)).await.unwrap();
    assert_eq!(reaped, vec![job.id]);

    let failed = h.engine.get_job(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.errors[0].contains("Timeout"));

    let jobs = jobs_for(&h, "orders").await;
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].retry_of, Some(job.id));
}

#[tokio::test]
async fn test_runner_schedules_phase_jobs_once() {
    let h = harness().await;
    let t = t0();
    h.seed("orders", SEEDED_ROWS);
    h.seed("customers", 50);
    h.register("orders", t).await;
    h.register("customers", t).await;

    let report = h.engine.reconciliation_tick(t).await.unwrap();
    assert!(report.reaped.is_empty());
    assert_eq!(report.scheduled.len(), 2);
    assert_eq!(report.ran.len(), 2);
    assert!(report.ran.iter().all(|j| j.job_type == JobType::Full));
    assert!(report.ran.iter().all(|j| j.status == JobStatus::Completed));

    let again = h.engine.reconciliation_tick(t + minutes(1)).await.unwrap();
    assert!(again.scheduled.is_empty());
    assert!(again.ran.is_empty());
}

#[tokio::test]
async fn test_running_job_cannot_be_run_twice() {
    let h = harness().await;
    let t = t0();
    h.register("orders", t).await;

    let job = h.reconcile("orders", JobType::Full, t).await;
    let again = h.engine.run_job(job.id, t).await;
    assert!(matches!(again, Err(cutover_lib::error::AppError::Conflict(_))));
}

#[tokio::test]
async fn test_terminal_table_rejects_new_jobs() {
    let h = harness().await;
    let t = t0();
    h.into_cutover("orders", t).await;
    h.engine
        .rollback("orders", "abort", OPERATOR, t + minutes(1))
        .await
        .unwrap();

    let result = h
        .engine
        .trigger_reconciliation("orders", JobType::DriftCheck, OPERATOR, t + minutes(2))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_alert_of_rolled_back_attempt_stops_blocking() {
    let h = harness().await;
    let t = t0();
    h.into_cutover("orders", t).await;
    h.new.set_mode(ProbeMode::QueryFails);

    let job = h.reconcile("orders", JobType::DriftCheck, t + minutes(1)).await;
    assert!(job.blocking_alert);
    assert_eq!(h.engine.list_blocking_alerts().await.unwrap().len(), 1);

    h.engine
        .rollback("orders", "new store rejecting queries", OPERATOR, t + minutes(2))
        .await
        .unwrap();
    assert!(h.engine.list_blocking_alerts().await.unwrap().is_empty());

    h.new.set_mode(ProbeMode::Healthy);
    h.register("orders", t + minutes(3)).await;
    let job = h.reconcile("orders", JobType::Full, t + minutes(4)).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(h.engine.list_blocking_alerts().await.unwrap().is_empty());
    assert_eq!(h.engine.overview().await.unwrap().open_alerts, 0);
}

#[tokio::test]
async fn test_alert_on_live_attempt_keeps_blocking() {
    let h = harness().await;
    let t = t0();
    h.register("orders", t).await;
    h.new.set_mode(ProbeMode::QueryFails);
    h.reconcile("orders", JobType::Full, t).await;

    assert_eq!(h.engine.overview().await.unwrap().open_alerts, 1);
}
