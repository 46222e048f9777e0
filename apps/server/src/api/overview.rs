//! Migration overview endpoint.

use actix_web::{HttpResponse, web};

use crate::auth::OperatorAuth;
use crate::error::AppResult;
use crate::models::CutoverOverview;
use crate::services::CutoverEngine;

/// Table counts per status and overall progress.
#[utoipa::path(
    get,
    path = "/api/v1/overview",
    tag = "Overview",
    responses(
        (status = 200, description = "Migration summary", body = CutoverOverview),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn get_overview(
    _auth: OperatorAuth,
    engine: web::Data<CutoverEngine>,
) -> AppResult<HttpResponse> {
    let overview = engine.overview().await?;
    Ok(HttpResponse::Ok().json(overview))
}

/// Configure overview routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/overview").route(web::get().to(get_overview)));
}
