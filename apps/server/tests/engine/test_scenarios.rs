//! End-to-end cutover scenarios.

use cutover_lib::error::AppError;
use cutover_lib::models::{
    AuditStatus, CutoverEvent, CutoverStatus, DataSource, JobType, RollbackTrigger, Transition,
    ValidationStatus,
};

use super::test_helpers::*;

/// Happy path: pending -> ready -> cutover (dual write) -> read switch -> completed.
#[tokio::test]
async fn test_full_cutover_happy_path() {
    let h = harness().await;
    let t = t0();

    let ready = h.prepare_ready("orders", t - minutes(60)).await;
    assert_eq!(ready.status, CutoverStatus::Ready);
    assert_eq!(ready.validation_status, ValidationStatus::Passed);
    assert_eq!(ready.read_source, DataSource::Legacy);
    assert_eq!(ready.write_source, DataSource::Legacy);

    h.open_window(&["orders"], t, t + minutes(30)).await;
    let cutover = h
        .engine
        .request_advance("orders", OPERATOR, t)
        .await
        .expect("Failed to enter cutover");
    assert_eq!(cutover.status, CutoverStatus::Cutover);
    assert_eq!(cutover.read_source, DataSource::Legacy);
    assert_eq!(cutover.write_source, DataSource::Dual);
    assert_eq!(cutover.dual_write_started_at, Some(t));

    // Soak finished with zero drift: reads move to the new store.
    h.reconcile("orders", JobType::DriftCheck, t + minutes(5)).await;
    let switched = h.engine.get_status("orders").await.unwrap();
    assert_eq!(switched.status, CutoverStatus::Cutover);
    assert_eq!(switched.read_source, DataSource::Supabase);
    assert_eq!(switched.write_source, DataSource::Dual);
    assert_eq!(switched.read_switched_at, Some(t + minutes(5)));

    h.reconcile("orders", JobType::DriftCheck, t + minutes(10)).await;
    let completed = h
        .engine
        .request_advance("orders", OPERATOR, t + minutes(10))
        .await
        .expect("Failed to complete cutover");
    assert_eq!(completed.status, CutoverStatus::Completed);
    assert_eq!(completed.read_source, DataSource::Supabase);
    assert_eq!(completed.write_source, DataSource::Supabase);
    assert_eq!(completed.cutover_date, Some(t + minutes(10)));

    let trail = h.engine.audit_trail("orders").await.unwrap();
    let transitions: Vec<Transition> = trail
        .iter()
        .filter(|e| e.is_successful_transition())
        .filter_map(|e| e.transition)
        .collect();
    assert_eq!(
        transitions,
        vec![
            Transition::PendingToReady,
            Transition::ReadyToCutover,
            Transition::ReadSwitch,
            Transition::CutoverToCompleted,
        ]
    );
    assert!(trail.iter().all(|e| e.status == AuditStatus::Success));
}

/// Drift during cutover rolls the table back and restores legacy routing.
#[tokio::test]
async fn test_drift_during_cutover_rolls_back() {
    let h = harness().await;
    let t = t0();

    h.into_cutover("orders", t).await;
    h.reconcile("orders", JobType::DriftCheck, t + minutes(5)).await;
    let switched = h.engine.get_status("orders").await.unwrap();
    assert_eq!(switched.read_source, DataSource::Supabase);

    let mut events = h.engine.subscribe_table("orders");
    h.new.set_count("orders", 998);
    let job = h.reconcile("orders", JobType::DriftCheck, t + minutes(10)).await;
    assert_eq!(job.drift_detected, 2);
    assert_eq!(job.drift_percentage, Some(0.002));

    let table = h.engine.get_status("orders").await.unwrap();
    assert_eq!(table.status, CutoverStatus::RolledBack);
    assert_eq!(table.read_source, DataSource::Legacy);
    assert_eq!(table.write_source, DataSource::Legacy);
    assert_eq!(table.rollback_date, Some(t + minutes(10)));
    assert_eq!(table.drift_percentage, 0.002);
    assert!(
        table
            .rollback_reason
            .as_deref()
            .is_some_and(|r| r.contains("drift"))
    );

    let trail = h.engine.audit_trail("orders").await.unwrap();
    let rollback = trail
        .iter()
        .rev()
        .find(|e| e.transition == Some(Transition::CutoverToRolledBack))
        .expect("rollback audit entry");
    assert_eq!(rollback.status, AuditStatus::Success);
    assert_eq!(rollback.actor, cutover_lib::services::SYSTEM_ACTOR);
    assert_eq!(rollback.details["trigger"], "drift_detected");
    assert_eq!(rollback.details["system_initiated"], true);

    assert!(matches!(events.next().await.unwrap().event, CutoverEvent::JobFinished(_)));
    assert!(matches!(
        events.next().await.unwrap().event,
        CutoverEvent::TransitionCommitted(ref p) if p.transition == Transition::CutoverToRolledBack
    ));
    assert!(matches!(
        events.next().await.unwrap().event,
        CutoverEvent::RolledBack(ref p) if p.trigger == RollbackTrigger::DriftDetected
    ));

    let result = h.engine.request_advance("orders", OPERATOR, t + minutes(11)).await;
    assert!(
        matches!(result, Err(AppError::Advance(ref e)) if e.code() == "TERMINAL_STATE"),
        "rolled back table must stay terminal"
    );
}

/// Integrity issues during cutover also force a rollback.
#[tokio::test]
async fn test_integrity_issues_during_cutover_roll_back() {
    let h = harness().await;
    let t = t0();

    h.into_cutover("orders", t).await;
    h.new.set_issues("orders", &["3 orders.customer_id values missing in customers.id"]);
    h.reconcile("orders", JobType::DriftCheck, t + minutes(2)).await;

    let table = h.engine.get_status("orders").await.unwrap();
    assert_eq!(table.status, CutoverStatus::RolledBack);
    assert_eq!(table.read_source, DataSource::Legacy);
    assert_eq!(table.write_source, DataSource::Legacy);

    let trail = h.engine.audit_trail("orders").await.unwrap();
    let rollback = trail
        .iter()
        .find(|e| e.transition == Some(Transition::CutoverToRolledBack))
        .expect("rollback audit entry");
    assert_eq!(rollback.details["trigger"], "integrity_issues");
}

/// Reads stay on the legacy store until the soak period has elapsed.
#[tokio::test]
async fn test_reads_do_not_switch_before_soak() {
    let h = harness().await;
    let t = t0();

    h.into_cutover("orders", t).await;
    h.reconcile("orders", JobType::DriftCheck, t + minutes(2)).await;

    let table = h.engine.get_status("orders").await.unwrap();
    assert_eq!(table.status, CutoverStatus::Cutover);
    assert_eq!(table.read_source, DataSource::Legacy);
    assert_eq!(table.read_switched_at, None);

    let result = h.engine.request_advance("orders", OPERATOR, t + minutes(3)).await;
    assert!(matches!(result, Err(AppError::Advance(ref e)) if e.code() == "VALIDATION_FAILED"));
}

/// Completion needs a reconciliation that finished after the read switch.
#[tokio::test]
async fn test_completion_requires_reconciliation_after_read_switch() {
    let h = harness().await;
    let t = t0();

    h.into_cutover("orders", t).await;
    h.reconcile("orders", JobType::DriftCheck, t + minutes(5)).await;

    let result = h.engine.request_advance("orders", OPERATOR, t + minutes(6)).await;
    assert!(matches!(result, Err(AppError::Advance(ref e)) if e.code() == "VALIDATION_FAILED"));

    let table = h.engine.get_status("orders").await.unwrap();
    assert_eq!(table.status, CutoverStatus::Cutover);
    assert_eq!(table.read_source, DataSource::Supabase);
}

/// A failed attempt can be registered again as attempt 2 with a fresh checklist.
#[tokio::test]
async fn test_reregister_after_rollback_starts_new_attempt() {
    let h = harness().await;
    let t = t0();

    h.into_cutover("orders", t).await;
    h.engine
        .rollback("orders", "load test failed", OPERATOR, t + minutes(1))
        .await
        .expect("Failed to roll back");

    let second = h.register("orders", t + minutes(2)).await;
    assert_eq!(second.attempt, 2);
    assert_eq!(second.status, CutoverStatus::Pending);
    assert_eq!(second.read_source, DataSource::Legacy);
    assert_eq!(second.write_source, DataSource::Legacy);

    let checklist = h.engine.get_checklist("orders").await.unwrap();
    assert!(!checklist.all_satisfied);
    assert_eq!(checklist.unsatisfied().len(), 8);
}
