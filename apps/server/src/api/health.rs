//! Health check endpoints.

use actix_web::{HttpResponse, get, web};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::services::{CutoverEngine, ProbeError};

/// Health check response.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// Readiness check response.
///
/// `degraded` means the engine database is up but a store is unreachable;
/// reconciliation jobs fail with `SourceUnavailable` until it returns.
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    status: &'static str,
    database: &'static str,
    legacy_store: &'static str,
    new_store: &'static str,
}

fn reachability(result: &Result<(), ProbeError>) -> &'static str {
    match result {
        Ok(()) => "connected",
        Err(_) => "unreachable",
    }
}

/// Liveness: 200 while the process is serving.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness: the engine database must answer; store outages degrade.
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready or degraded", body = ReadyResponse),
        (status = 503, description = "Engine database unavailable", body = crate::error::ErrorResponse)
    )
)]
#[get("/ready")]
pub async fn ready(engine: web::Data<CutoverEngine>) -> HttpResponse {
    if let Err(e) = engine.pool().ping().await {
        warn!("Readiness check failed: {}", e);
        return HttpResponse::ServiceUnavailable().json(crate::error::ErrorResponse {
            error: "NOT_READY".to_string(),
            message: "Engine database connection failed".to_string(),
        });
    }

    let (legacy, new) = engine.detector().ping_stores().await;
    let degraded = legacy.is_err() || new.is_err();
    HttpResponse::Ok().json(ReadyResponse {
        status: if degraded { "degraded" } else { "ready" },
        database: "connected",
        legacy_store: reachability(&legacy),
        new_store: reachability(&new),
    })
}

/// Configure health routes.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}
