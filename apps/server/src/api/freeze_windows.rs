//! Freeze window API handlers.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::AppResult;
use crate::models::{CancelFreezeWindowRequest, FreezeWindow, ScheduleFreezeWindowRequest};
use crate::services::CutoverEngine;

/// Schedule a freeze window.
///
/// Rejected when it overlaps an open window on any shared table.
#[utoipa::path(
    post,
    path = "/api/v1/freeze-windows",
    tag = "Freeze Windows",
    request_body = ScheduleFreezeWindowRequest,
    responses(
        (status = 201, description = "Window scheduled", body = FreezeWindow),
        (status = 400, description = "Invalid interval or tables", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Table not registered", body = crate::error::ErrorResponse),
        (status = 409, description = "Overlapping window", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn schedule_window(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    body: web::Json<ScheduleFreezeWindowRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let window = engine
        .schedule_freeze_window(
            &req.tables,
            req.start_time,
            req.end_time,
            &req.description,
            &auth.actor,
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Created().json(window))
}

/// List all freeze windows by start time.
#[utoipa::path(
    get,
    path = "/api/v1/freeze-windows",
    tag = "Freeze Windows",
    responses(
        (status = 200, description = "Freeze windows", body = Vec<FreezeWindow>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn list_windows(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
) -> AppResult<HttpResponse> {
    let windows = engine.list_freeze_windows().await?;
    Ok(HttpResponse::Ok().json(windows))
}

/// Activate a scheduled window. Denied before its start time.
#[utoipa::path(
    post,
    path = "/api/v1/freeze-windows/{id}/activate",
    tag = "Freeze Windows",
    params(("id" = Uuid, Path, description = "Freeze window ID")),
    responses(
        (status = 200, description = "Window active", body = FreezeWindow),
        (status = 400, description = "Outside the window interval", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Window not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Window is not scheduled", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn activate_window(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let window = engine
        .activate_freeze_window(path.into_inner(), &auth.actor, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(window))
}

/// Complete an active window. Covered tables still in cutover roll back.
#[utoipa::path(
    post,
    path = "/api/v1/freeze-windows/{id}/complete",
    tag = "Freeze Windows",
    params(("id" = Uuid, Path, description = "Freeze window ID")),
    responses(
        (status = 200, description = "Window completed", body = FreezeWindow),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Window not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Window is not active", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn complete_window(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let window = engine
        .complete_freeze_window(path.into_inner(), &auth.actor, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(window))
}

/// Cancel a scheduled or active window.
#[utoipa::path(
    post,
    path = "/api/v1/freeze-windows/{id}/cancel",
    tag = "Freeze Windows",
    params(("id" = Uuid, Path, description = "Freeze window ID")),
    request_body = CancelFreezeWindowRequest,
    responses(
        (status = 200, description = "Window cancelled", body = FreezeWindow),
        (status = 400, description = "Missing reason", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Window not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Window already closed", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn cancel_window(
    auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
    path: web::Path<Uuid>,
    body: web::Json<CancelFreezeWindowRequest>,
) -> AppResult<HttpResponse> {
    let window = engine
        .cancel_freeze_window(path.into_inner(), &body.reason, &auth.actor, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(window))
}

/// Configure freeze window routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/freeze-windows")
            .route(web::get().to(list_windows))
            .route(web::post().to(schedule_window)),
    )
    .service(web::resource("/freeze-windows/{id}/activate").route(web::post().to(activate_window)))
    .service(web::resource("/freeze-windows/{id}/complete").route(web::post().to(complete_window)))
    .service(web::resource("/freeze-windows/{id}/cancel").route(web::post().to(cancel_window)));
}
