//! HTTP surface under `/api/v1`.

use actix_web::{App, http::StatusCode, test, web};
use serde_json::{Value, json};

use cutover_lib::api;
use cutover_lib::auth::AdminKey;
use cutover_lib::config::{ACTOR_HEADER, ADMIN_KEY_HEADER};
use cutover_lib::services::CutoverEngine;

use super::test_helpers::*;

/// Operator key used in tests.
pub const TEST_ADMIN_KEY: &str = "test-admin-key-for-engine-suite";

macro_rules! test_app {
    ($engine:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($engine))
                .app_data(web::Data::new(AdminKey::new(Some(
                    TEST_ADMIN_KEY.to_string(),
                ))))
                .service(web::scope("/api/v1").configure(api::configure_api_routes)),
        )
        .await
    };
}

fn authed(req: test::TestRequest) -> test::TestRequest {
    req.insert_header((ADMIN_KEY_HEADER, TEST_ADMIN_KEY))
        .insert_header((ACTOR_HEADER, OPERATOR))
}

async fn engine() -> CutoverEngine {
    harness().await.engine
}

#[actix_rt::test]
async fn test_health_needs_no_key() {
    let app = test_app!(engine().await);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/ready").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ready");
}

#[actix_rt::test]
async fn test_ready_reports_unreachable_store() {
    let h = harness().await;
    h.legacy.set_mode(ProbeMode::Unavailable);
    let app = test_app!(h.engine.clone());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/ready").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["legacy_store"], "unreachable");
    assert_eq!(body["new_store"], "connected");
}

#[actix_rt::test]
async fn test_operator_routes_require_key_and_actor() {
    let app = test_app!(engine().await);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/tables").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/tables")
            .insert_header((ADMIN_KEY_HEADER, "wrong-key"))
            .insert_header((ACTOR_HEADER, OPERATOR))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/tables")
            .insert_header((ADMIN_KEY_HEADER, TEST_ADMIN_KEY))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, authed(test::TestRequest::get().uri("/api/v1/tables")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn test_register_and_inspect_table() {
    let app = test_app!(engine().await);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables"))
            .set_json(json!({ "name": "orders" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "orders");
    assert_eq!(body["attempt"], 1);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["created_by"], OPERATOR);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables"))
            .set_json(json!({ "name": "orders" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables"))
            .set_json(json!({ "name": "Orders; DROP" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/tables/orders/routing")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["read_source"], "legacy");
    assert_eq!(body["write_source"], "legacy");
    assert_eq!(body["writes_frozen"], false);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/tables/customers")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_advance_rejection_carries_code() {
    let app = test_app!(engine().await);

    test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables"))
            .set_json(json!({ "name": "orders" }))
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables/orders/advance")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "CHECKLIST_INCOMPLETE");
    assert!(body["message"].as_str().unwrap().contains("backup_complete"));

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables/orders/rollback"))
            .set_json(json!({ "reason": "abort" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "INVALID_TRANSITION");
}

#[actix_rt::test]
async fn test_checklist_gate_routes() {
    let app = test_app!(engine().await);

    test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables"))
            .set_json(json!({ "name": "orders" }))
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::put().uri("/api/v1/tables/orders/checklist/backup_complete"))
            .set_json(json!({ "value": true }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["backup_complete"], true);
    assert_eq!(body["all_satisfied"], false);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::put().uri("/api/v1/tables/orders/checklist/data_consistency"))
            .set_json(json!({ "value": true }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::put().uri("/api/v1/tables/orders/checklist/coffee_ready"))
            .set_json(json!({ "value": true }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/tables/orders/checklist")).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["backup_complete"], true);
    assert_eq!(body["data_consistency"], false);
}

#[actix_rt::test]
async fn test_reconciliation_and_audit_routes() {
    let h = harness().await;
    h.seed("orders", SEEDED_ROWS);
    let engine = h.engine.clone();
    let app = test_app!(h.engine.clone());

    test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables"))
            .set_json(json!({ "name": "orders" }))
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables/orders/reconciliations"))
            .set_json(json!({ "job_type": "full" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let job: Value = test::read_body_json(resp).await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["triggered_by"], OPERATOR);

    let ran = engine.run_due_jobs(chrono::Utc::now()).await.unwrap();
    assert_eq!(ran.len(), 1);

    let uri = format!("/api/v1/reconciliations/{}", job["id"].as_str().unwrap());
    let resp = test::call_service(&app, authed(test::TestRequest::get().uri(&uri)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "completed");

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/tables/orders/reconciliations?status=completed"))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total"], 1);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/tables/orders/audit/replay")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["chain_valid"], true);
    assert_eq!(body["final_status"], "pending");

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/overview")).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total_tables"], 1);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["open_alerts"], 0);
}

#[actix_rt::test]
async fn test_freeze_window_routes() {
    let app = test_app!(engine().await);
    let now = chrono::Utc::now();

    test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables"))
            .set_json(json!({ "name": "orders" }))
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/freeze-windows"))
            .set_json(json!({
                "tables": ["orders"],
                "start_time": now - chrono::Duration::minutes(1),
                "end_time": now + chrono::Duration::minutes(30),
                "description": "orders cutover",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let window: Value = test::read_body_json(resp).await;
    assert_eq!(window["status"], "scheduled");
    let id = window["id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri(&format!("/api/v1/freeze-windows/{id}/activate")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "active");

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/tables/orders/routing")).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["writes_frozen"], true);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri(&format!("/api/v1/freeze-windows/{id}/cancel")))
            .set_json(json!({ "reason": "" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri(&format!("/api/v1/freeze-windows/{id}/cancel")))
            .set_json(json!({ "reason": "postponed" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "cancelled");
}

#[actix_rt::test]
async fn test_alert_and_listing_routes() {
    let h = harness().await;
    h.seed("orders", SEEDED_ROWS);
    h.register("orders", t0()).await;
    h.new.set_mode(ProbeMode::QueryFails);
    let app = test_app!(h.engine.clone());

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::post().uri("/api/v1/tables/orders/reconciliations"))
            .set_json(json!({ "job_type": "full" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    h.engine.run_due_jobs(chrono::Utc::now()).await.unwrap();

    let resp = test::call_service(&app, authed(test::TestRequest::get().uri("/api/v1/alerts")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let alerts: Value = test::read_body_json(resp).await;
    assert_eq!(alerts.as_array().map(Vec::len), Some(1));
    assert_eq!(alerts[0]["table_name"], "orders");
    assert_eq!(alerts[0]["blocking_alert"], true);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/tables/orders/audit")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let trail: Value = test::read_body_json(resp).await;
    assert!(trail.as_array().is_some_and(|entries| entries.len() >= 2));
    assert_eq!(trail[0]["sequence"], 1);

    let resp = test::call_service(
        &app,
        authed(test::TestRequest::get().uri("/api/v1/freeze-windows")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let windows: Value = test::read_body_json(resp).await;
    assert_eq!(windows, json!([]));
}
