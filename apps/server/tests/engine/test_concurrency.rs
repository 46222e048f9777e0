//! Optimistic concurrency on transitions.

use std::sync::Arc;

use tokio::sync::Barrier;

use cutover_lib::error::{AdvanceError, AppError};
use cutover_lib::models::{AuditStatus, ChecklistGate, CutoverStatus, JobType, Transition};

use super::test_helpers::*;

/// Two advances from the same snapshot: exactly one wins.
#[tokio::test]
async fn test_concurrent_advance_exactly_one_wins() {
    let h = harness().await;
    let t = t0();

    h.seed("orders", SEEDED_ROWS);
    h.register("orders", t).await;
    h.mark_operator_gates("orders", t).await;
    h.reconcile("orders", JobType::Full, t).await;
    let snapshot = h.engine.get_status("orders").await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let first = {
        let barrier = barrier.clone();
        let engine = h.engine.clone();
        let snapshot = snapshot.clone();
        async move {
            barrier.wait().await;
            engine.advance_from(&snapshot, "alice", t).await
        }
    };
    let second = {
        let barrier = barrier.clone();
        let engine = h.engine.clone();
        let snapshot = snapshot.clone();
        async move {
            barrier.wait().await;
            engine.advance_from(&snapshot, "bob", t).await
        }
    };

    let (a, b) = tokio::join!(first, second);
    let results = [a, b];

    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(AppError::Advance(AdvanceError::ConcurrentTransition { .. }))
            )
        })
        .count();
    assert_eq!(wins, 1, "exactly one advance must commit");
    assert_eq!(conflicts, 1, "the loser must see ConcurrentTransition");

    let table = h.engine.get_status("orders").await.unwrap();
    assert_eq!(table.status, CutoverStatus::Ready);
    assert_eq!(table.version, snapshot.version + 1);

    let trail = h.engine.audit_trail("orders").await.unwrap();
    let committed = trail
        .iter()
        .filter(|e| e.transition == Some(Transition::PendingToReady))
        .filter(|e| e.status == AuditStatus::Success)
        .count();
    let rejected = trail
        .iter()
        .filter(|e| e.transition == Some(Transition::PendingToReady))
        .filter(|e| e.status == AuditStatus::Failure)
        .count();
    assert_eq!(committed, 1);
    assert_eq!(rejected, 1);
}

/// A stale snapshot is rejected even without a race.
#[tokio::test]
async fn test_stale_snapshot_rejected() {
    let h = harness().await;
    let t = t0();

    h.seed("orders", SEEDED_ROWS);
    h.register("orders", t).await;
    h.mark_operator_gates("orders", t).await;
    h.reconcile("orders", JobType::Full, t).await;
    let stale = h.engine.get_status("orders").await.unwrap();

    h.engine.request_advance("orders", OPERATOR, t).await.unwrap();

    let result = h.engine.advance_from(&stale, OPERATOR, t).await;
    match result {
        Err(AppError::Advance(AdvanceError::ConcurrentTransition { expected, version, .. })) => {
            assert_eq!(expected, CutoverStatus::Pending);
            assert_eq!(version, stale.version);
        }
        other => panic!("expected ConcurrentTransition, got {:?}", other),
    }
}

/// Clearing a gate while an advance is in flight: the table may reach
/// `ready` only if the advance committed before the gate was cleared.
#[tokio::test]
async fn test_gate_cleared_during_advance_never_yields_ready_on_open_checklist() {
    for _ in 0..10 {
        let h = harness().await;
        let t = t0();

        h.seed("orders", SEEDED_ROWS);
        h.register("orders", t).await;
        h.mark_operator_gates("orders", t).await;
        h.reconcile("orders", JobType::Full, t).await;

        let (advanced, cleared) = tokio::join!(
            h.engine.request_advance("orders", OPERATOR, t + minutes(1)),
            h.engine.mark_checklist_gate(
                "orders",
                ChecklistGate::BackupComplete,
                false,
                OPERATOR,
                t + minutes(1),
            ),
        );
        let cleared = cleared.unwrap();
        assert!(!cleared.all_satisfied);

        let trail = h.engine.audit_trail("orders").await.unwrap();
        let clear_seq = trail
            .iter()
            .find(|e| e.details["gate"] == "backup_complete" && e.details["value"] == false)
            .map(|e| e.sequence)
            .unwrap();
        let ready_seq = trail
            .iter()
            .find(|e| {
                e.transition == Some(Transition::PendingToReady) && e.status == AuditStatus::Success
            })
            .map(|e| e.sequence);

        let table = h.engine.get_status("orders").await.unwrap();
        match advanced {
            Ok(_) => {
                assert_eq!(table.status, CutoverStatus::Ready);
                assert!(ready_seq.is_some_and(|ready| ready < clear_seq));
            }
            Err(err) => {
                assert!(matches!(
                    err,
                    AppError::Advance(
                        AdvanceError::ConcurrentTransition { .. }
                            | AdvanceError::ChecklistIncomplete { .. }
                    )
                ));
                assert_eq!(table.status, CutoverStatus::Pending);
                assert!(ready_seq.is_none());
            }
        }
    }
}

/// Marking a gate moves the row version, so a snapshot read before the mark
/// can no longer advance.
#[tokio::test]
async fn test_gate_change_invalidates_earlier_snapshot() {
    let h = harness().await;
    let t = t0();

    h.seed("orders", SEEDED_ROWS);
    h.register("orders", t).await;
    h.mark_operator_gates("orders", t).await;
    h.reconcile("orders", JobType::Full, t).await;
    let snapshot = h.engine.get_status("orders").await.unwrap();

    h.engine
        .mark_checklist_gate("orders", ChecklistGate::BackupComplete, false, OPERATOR, t)
        .await
        .unwrap();
    assert_eq!(
        h.engine.get_status("orders").await.unwrap().version,
        snapshot.version + 1
    );

    let result = h.engine.advance_from(&snapshot, OPERATOR, t).await;
    assert!(matches!(
        result,
        Err(AppError::Advance(AdvanceError::ConcurrentTransition { .. }))
    ));
    assert_eq!(
        h.engine.get_status("orders").await.unwrap().status,
        CutoverStatus::Pending
    );
}
