//! Cutover table API handlers.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use tracing::info;

use crate::auth::OperatorAuth;
use crate::error::AppResult;
use crate::models::{
    AuditEntry, AuditReplay, CutoverTable, CutoverTableListResponse, RegisterTableRequest,
    RollbackRequest, RoutingPolicy,
};
use crate::services::CutoverEngine;

/// Register a table for migration.
///
/// Creates attempt 1, or the next attempt when the current one was rolled back.
#[utoipa::path(
    post,
    path = "/api/v1/tables",
    tag = "Tables",
    request_body = RegisterTableRequest,
    responses(
        (status = 201, description = "Table registered", body = CutoverTable),
        (status = 400, description = "Invalid table name", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 409, description = "Current attempt is still live", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn register_table(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    body: web::Json<RegisterTableRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let table = engine
        .register_table(req.name.trim(), &auth.actor, Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(table))
}

/// List the current attempt of every registered table.
#[utoipa::path(
    get,
    path = "/api/v1/tables",
    tag = "Tables",
    responses(
        (status = 200, description = "Registered tables", body = CutoverTableListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn list_tables(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
) -> AppResult<HttpResponse> {
    let tables = engine.list_tables().await?;
    let total = tables.len() as u64;
    Ok(HttpResponse::Ok().json(CutoverTableListResponse { tables, total }))
}

/// Status snapshot of a table.
#[utoipa::path(
    get,
    path = "/api/v1/tables/{name}",
    tag = "Tables",
    params(("name" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Current attempt", body = CutoverTable),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn get_table(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let table = engine.get_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(table))
}

/// Routing policy the data-access layer must follow for a table.
#[utoipa::path(
    get,
    path = "/api/v1/tables/{name}/routing",
    tag = "Tables",
    params(("name" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Read and write sources", body = RoutingPolicy),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn get_routing(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let policy = engine
        .routing_policy(&path.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(policy))
}

/// Attempt the next forward transition.
///
/// A rejection names the precondition that failed.
#[utoipa::path(
    post,
    path = "/api/v1/tables/{name}/advance",
    tag = "Tables",
    params(("name" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Transition committed", body = CutoverTable),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
        (status = 409, description = "Concurrent transition; re-fetch and retry", body = crate::error::ErrorResponse),
        (status = 422, description = "Precondition failed or terminal state", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn advance_table(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let name = path.into_inner();
    let table = engine
        .request_advance(&name, &auth.actor, Utc::now())
        .await?;
    info!(table = %name, status = %table.status, actor = %auth.actor, "Advance requested via API");
    Ok(HttpResponse::Ok().json(table))
}

/// Roll a table in `cutover` back to the legacy store.
#[utoipa::path(
    post,
    path = "/api/v1/tables/{name}/rollback",
    tag = "Tables",
    params(("name" = String, Path, description = "Table name")),
    request_body = RollbackRequest,
    responses(
        (status = 200, description = "Table rolled back", body = CutoverTable),
        (status = 400, description = "Missing reason", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
        (status = 409, description = "Concurrent transition", body = crate::error::ErrorResponse),
        (status = 422, description = "Table is not in cutover", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn rollback_table(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
    body: web::Json<RollbackRequest>,
) -> AppResult<HttpResponse> {
    let table = engine
        .rollback(&path.into_inner(), &body.reason, &auth.actor, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(table))
}

/// Audit trail of a table across all attempts, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/tables/{name}/audit",
    tag = "Audit",
    params(("name" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Audit entries", body = Vec<AuditEntry>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn get_audit_trail(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let entries = engine.audit_trail(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// Verify the hash chain and replay transitions against the allowed edges.
#[utoipa::path(
    get,
    path = "/api/v1/tables/{name}/audit/replay",
    tag = "Audit",
    params(("name" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Replay result", body = AuditReplay),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "No audit entries", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn replay_audit(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let replay = engine.replay_audit(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(replay))
}

/// Configure table routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/tables")
            .route(web::get().to(list_tables))
            .route(web::post().to(register_table)),
    )
    .service(web::resource("/tables/{name}").route(web::get().to(get_table)))
    .service(web::resource("/tables/{name}/routing").route(web::get().to(get_routing)))
    .service(web::resource("/tables/{name}/advance").route(web::post().to(advance_table)))
    .service(web::resource("/tables/{name}/rollback").route(web::post().to(rollback_table)))
    .service(web::resource("/tables/{name}/audit").route(web::get().to(get_audit_trail)))
    .service(web::resource("/tables/{name}/audit/replay").route(web::get().to(replay_audit)));
}
