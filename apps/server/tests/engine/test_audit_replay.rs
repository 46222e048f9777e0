//! Hash-chained audit log and replay.

use sea_orm::ConnectionTrait;

use cutover_lib::error::AppError;
use cutover_lib::models::{CutoverStatus, JobType, Transition};
use cutover_lib::services::audit::GENESIS_HASH;

use super::test_helpers::*;

async fn completed_table(h: &Harness, name: &str) {
    let t = t0();
    h.into_cutover(name, t).await;
    h.reconcile(name, JobType::DriftCheck, t + minutes(5)).await;
    h.reconcile(name, JobType::DriftCheck, t + minutes(10)).await;
    h.engine
        .request_advance(name, OPERATOR, t + minutes(10))
        .await
        .expect("Failed to complete cutover");
}

#[tokio::test]
async fn test_chain_links_every_entry() {
    let h = harness().await;
    completed_table(&h, "orders").await;

    let trail = h.engine.audit_trail("orders").await.unwrap();
    assert!(!trail.is_empty());
    assert_eq!(trail[0].prev_hash, GENESIS_HASH);
    for (i, pair) in trail.windows(2).enumerate() {
        assert_eq!(pair[1].prev_hash, pair[0].entry_hash, "link {} broken", i + 1);
        assert_eq!(pair[1].sequence, pair[0].sequence + 1);
    }
}

#[tokio::test]
async fn test_replay_reconstructs_final_status() {
    let h = harness().await;
    completed_table(&h, "orders").await;

    let replay = h.engine.replay_audit("orders").await.unwrap();
    assert!(replay.chain_valid);
    assert!(replay.violations.is_empty(), "{:?}", replay.violations);
    assert_eq!(replay.final_status, Some(CutoverStatus::Completed));
    assert_eq!(
        replay.transitions,
        vec![
            Transition::PendingToReady,
            Transition::ReadyToCutover,
            Transition::ReadSwitch,
            Transition::CutoverToCompleted,
        ]
    );
    assert_eq!(
        replay.final_status,
        Some(h.engine.get_status("orders").await.unwrap().status)
    );
}

/// Rejected requests are recorded but never replayed as transitions.
#[tokio::test]
async fn test_rejections_are_recorded_but_not_replayed() {
    let h = harness().await;
    let t = t0();
    h.register("orders", t).await;

    let result = h.engine.request_advance("orders", OPERATOR, t).await;
    assert!(matches!(result, Err(AppError::Advance(_))));

    let trail = h.engine.audit_trail("orders").await.unwrap();
    let rejection = trail.last().unwrap();
    assert_eq!(rejection.details["code"], "CHECKLIST_INCOMPLETE");
    assert!(rejection.error_message.is_some());

    let replay = h.engine.replay_audit("orders").await.unwrap();
    assert!(replay.chain_valid);
    assert!(replay.transitions.is_empty());
    assert_eq!(replay.final_status, Some(CutoverStatus::Pending));
}

#[tokio::test]
async fn test_replay_spans_attempts() {
    let h = harness().await;
    let t = t0();
    h.into_cutover("orders", t).await;
    h.engine
        .rollback("orders", "rehearsal", OPERATOR, t + minutes(1))
        .await
        .unwrap();
    h.register("orders", t + minutes(2)).await;

    let replay = h.engine.replay_audit("orders").await.unwrap();
    assert!(replay.chain_valid);
    assert!(replay.violations.is_empty(), "{:?}", replay.violations);
    assert_eq!(replay.final_status, Some(CutoverStatus::Pending));
    assert_eq!(
        replay.transitions,
        vec![
            Transition::PendingToReady,
            Transition::ReadyToCutover,
            Transition::CutoverToRolledBack,
        ]
    );
}

#[tokio::test]
async fn test_tampering_breaks_the_chain() {
    let h = harness().await;
    completed_table(&h, "orders").await;

    h.engine
        .pool()
        .connection()
        .execute_unprepared(
            "UPDATE cutover_audit_entries SET actor = 'mallory' WHERE table_name = 'orders' AND sequence = 2",
        )
        .await
        .unwrap();

    let replay = h.engine.replay_audit("orders").await.unwrap();
    assert!(!replay.chain_valid);
    assert!(replay.violations.iter().any(|v| v.starts_with("entry 2:")));
}

#[tokio::test]
async fn test_replay_of_unknown_table_is_not_found() {
    let h = harness().await;
    let result = h.engine.replay_audit("nothing_here").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
