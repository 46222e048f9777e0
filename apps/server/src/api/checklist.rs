//! Checklist API handlers.

use actix_web::{HttpResponse, web};
use chrono::Utc;

use crate::auth::OperatorAuth;
use crate::error::{AppError, AppResult};
use crate::models::{Checklist, ChecklistGate, MarkGateRequest};
use crate::services::CutoverEngine;

/// Checklist of a table's current attempt.
#[utoipa::path(
    get,
    path = "/api/v1/tables/{name}/checklist",
    tag = "Checklist",
    params(("name" = String, Path, description = "Table name")),
    responses(
        (status = 200, description = "Checklist gates", body = Checklist),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn get_checklist(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let checklist = engine.get_checklist(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(checklist))
}

/// Attest one operator-driven gate.
///
/// `data_consistency` and `referential_integrity` follow reconciliation results
/// and are rejected here.
#[utoipa::path(
    put,
    path = "/api/v1/tables/{name}/checklist/{gate}",
    tag = "Checklist",
    params(
        ("name" = String, Path, description = "Table name"),
        ("gate" = String, Path, description = "Gate name, e.g. backup_complete"),
    ),
    request_body = MarkGateRequest,
    responses(
        (status = 200, description = "Updated checklist", body = Checklist),
        (status = 400, description = "Unknown or system-driven gate", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
        (status = 409, description = "Table is in a terminal state", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn mark_gate(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<(String, String)>,
    body: web::Json<MarkGateRequest>,
) -> AppResult<HttpResponse> {
    let (name, gate) = path.into_inner();
    let gate = ChecklistGate::parse(&gate).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "unknown checklist gate '{}', expected one of: {}",
            gate,
            ChecklistGate::ALL.map(|g| g.as_str()).join(", ")
        ))
    })?;

    let checklist = engine
        .mark_checklist_gate(&name, gate, body.value, &auth.actor, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(checklist))
}

/// Configure checklist routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/tables/{name}/checklist").route(web::get().to(get_checklist)))
        .service(
            web::resource("/tables/{name}/checklist/{gate}").route(web::put().to(mark_gate)),
        );
}
