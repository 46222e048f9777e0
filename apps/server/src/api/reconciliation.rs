//! Reconciliation job API handlers.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::AppResult;
use crate::models::{
    JobListQuery, JobListResponse, JobStatus, ReconciliationJob, TriggerReconciliationRequest,
};
use crate::services::CutoverEngine;

/// Filters for a table's job history.
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct TableJobsQuery {
    pub status: Option<JobStatus>,
    /// Maximum number of jobs (default: 50, max: 200).
    pub limit: Option<u64>,
}

/// Queue a reconciliation job for a table.
#[utoipa::path(
    post,
    path = "/api/v1/tables/{name}/reconciliations",
    tag = "Reconciliation",
    params(("name" = String, Path, description = "Table name")),
    request_body = TriggerReconciliationRequest,
    responses(
        (status = 202, description = "Job queued", body = ReconciliationJob),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
        (status = 422, description = "Table is in a terminal state", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn trigger_reconciliation(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
    body: web::Json<TriggerReconciliationRequest>,
) -> AppResult<HttpResponse> {
    let job = engine
        .trigger_reconciliation(&path.into_inner(), body.job_type, &auth.actor, Utc::now())
        .await?;
    Ok(HttpResponse::Accepted().json(job))
}

/// Job history of a table, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/tables/{name}/reconciliations",
    tag = "Reconciliation",
    params(
        ("name" = String, Path, description = "Table name"),
        TableJobsQuery,
    ),
    responses(
        (status = 200, description = "Jobs", body = JobListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn list_table_jobs(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
    query: web::Query<TableJobsQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let jobs = engine
        .list_jobs(&JobListQuery {
            table: Some(path.into_inner()),
            status: query.status,
            limit: query.limit,
        })
        .await?;
    Ok(HttpResponse::Ok().json(jobs))
}

/// Get one reconciliation job.
#[utoipa::path(
    get,
    path = "/api/v1/reconciliations/{id}",
    tag = "Reconciliation",
    params(("id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job", body = ReconciliationJob),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn get_job(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job = engine.get_job(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(job))
}

/// Jobs whose retries ran out and that no later job has cleared.
#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    tag = "Reconciliation",
    responses(
        (status = 200, description = "Open blocking alerts", body = Vec<ReconciliationJob>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn list_alerts(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
) -> AppResult<HttpResponse> {
    let alerts = engine.list_blocking_alerts().await?;
    Ok(HttpResponse::Ok().json(alerts))
}

/// Configure reconciliation routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/tables/{name}/reconciliations")
            .route(web::get().to(list_table_jobs))
            .route(web::post().to(trigger_reconciliation)),
    )
    .service(web::resource("/reconciliations/{id}").route(web::get().to(get_job)))
    .service(web::resource("/alerts").route(web::get().to(list_alerts)));
}
