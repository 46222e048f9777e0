//! State machine rules, routing per state and the overview.

use chrono::{DateTime, Utc};

use cutover_lib::error::{AdvanceError, AppError};
use cutover_lib::models::{CutoverEvent, CutoverStatus, DataSource, JobType};

use super::test_helpers::*;

#[tokio::test]
async fn test_register_validates_names() {
    let h = harness().await;
    let t = t0();

    for bad in ["", "Orders", "1orders", "orders-archive", "orders; drop table x"] {
        let result = h.engine.register_table(bad, OPERATOR, t).await;
        assert!(
            matches!(result, Err(AppError::InvalidInput(_))),
            "'{}' should be rejected",
            bad
        );
    }

    let long = "a".repeat(64);
    assert!(matches!(
        h.engine.register_table(&long, OPERATOR, t).await,
        Err(AppError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_register_rejects_live_attempt() {
    let h = harness().await;
    let t = t0();
    h.register("orders", t).await;

    let again = h.engine.register_table("orders", OPERATOR, t).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_unknown_table_is_not_found() {
    let h = harness().await;
    let t = t0();

    assert!(matches!(h.engine.get_status("ghost").await, Err(AppError::NotFound(_))));
    assert!(matches!(
        h.engine.request_advance("ghost", OPERATOR, t).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.engine.routing_policy("ghost", t).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.engine
            .trigger_reconciliation("ghost", JobType::Full, OPERATOR, t)
            .await,
        Err(AppError::NotFound(_))
    ));
}

/// Routing matches the status at every step of the lifecycle.
#[tokio::test]
async fn test_routing_follows_lifecycle() {
    let h = harness().await;
    let t = t0();

    let routing = |at: DateTime<Utc>| {
        let engine = h.engine.clone();
        async move {
            let policy = engine.routing_policy("orders", at).await.unwrap();
            (policy.read_source, policy.write_source)
        }
    };

    h.seed("orders", SEEDED_ROWS);
    h.register("orders", t - minutes(60)).await;
    assert_eq!(
        routing(t - minutes(60)).await,
        (DataSource::Legacy, DataSource::Legacy)
    );

    h.mark_operator_gates("orders", t - minutes(60)).await;
    h.reconcile("orders", JobType::Full, t - minutes(60)).await;
    h.engine
        .request_advance("orders", OPERATOR, t - minutes(60))
        .await
        .unwrap();
    assert_eq!(
        routing(t - minutes(60)).await,
        (DataSource::Legacy, DataSource::Legacy)
    );

    h.open_window(&["orders"], t, t + minutes(30)).await;
    h.engine.request_advance("orders", OPERATOR, t).await.unwrap();
    assert_eq!(
        routing(t).await,
        (DataSource::Legacy, DataSource::Dual)
    );

    h.reconcile("orders", JobType::DriftCheck, t + minutes(5)).await;
    assert_eq!(
        routing(t + minutes(5)).await,
        (DataSource::Supabase, DataSource::Dual)
    );

    h.reconcile("orders", JobType::DriftCheck, t + minutes(10)).await;
    h.engine
        .request_advance("orders", OPERATOR, t + minutes(10))
        .await
        .unwrap();
    assert_eq!(
        routing(t + minutes(10)).await,
        (DataSource::Supabase, DataSource::Supabase)
    );
}

#[tokio::test]
async fn test_completed_table_is_terminal() {
    let h = harness().await;
    let t = t0();
    h.into_cutover("orders", t).await;
    h.reconcile("orders", JobType::DriftCheck, t + minutes(5)).await;
    h.reconcile("orders", JobType::DriftCheck, t + minutes(10)).await;
    h.engine
        .request_advance("orders", OPERATOR, t + minutes(10))
        .await
        .unwrap();

    let result = h.engine.request_advance("orders", OPERATOR, t + minutes(11)).await;
    match result {
        Err(AppError::Advance(AdvanceError::TerminalState { status, .. })) => {
            assert_eq!(status, CutoverStatus::Completed);
        }
        other => panic!("expected TerminalState, got {:?}", other),
    }

    // A completed table cannot be registered again or frozen.
    assert!(matches!(
        h.engine.register_table("orders", OPERATOR, t + minutes(12)).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        h.engine
            .schedule_freeze_window(
                &["orders".to_string()],
                t + minutes(20),
                t + minutes(40),
                "",
                OPERATOR,
                t + minutes(12),
            )
            .await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_overview_counts_current_attempts() {
    let h = harness().await;
    let t = t0();

    h.into_cutover("orders", t).await;
    h.reconcile("orders", JobType::DriftCheck, t + minutes(5)).await;
    h.reconcile("orders", JobType::DriftCheck, t + minutes(10)).await;
    h.engine
        .request_advance("orders", OPERATOR, t + minutes(10))
        .await
        .unwrap();

    h.prepare_ready("customers", t).await;
    h.register("invoices", t).await;
    h.into_cutover("payments", t + minutes(60)).await;
    h.engine
        .rollback("payments", "abort", OPERATOR, t + minutes(61))
        .await
        .unwrap();

    let overview = h.engine.overview().await.unwrap();
    assert_eq!(overview.total_tables, 4);
    assert_eq!(overview.pending, 1);
    assert_eq!(overview.ready, 1);
    assert_eq!(overview.cutover, 0);
    assert_eq!(overview.completed, 1);
    assert_eq!(overview.rolled_back, 1);
    assert_eq!(overview.progress_percentage, 25.0);
}

#[tokio::test]
async fn test_events_follow_commits() {
    let h = harness().await;
    let t = t0();
    let mut events = h.engine.subscribe();

    h.register("orders", t).await;
    let registered = events.recv().await.unwrap();
    assert!(matches!(registered.event, CutoverEvent::TableRegistered(ref p) if p.table_name == "orders"));
    assert_eq!(registered.timestamp, t);

    // Rejections publish nothing.
    let _ = h.engine.request_advance("orders", OPERATOR, t).await;
    assert!(events.try_recv().is_err());
}
