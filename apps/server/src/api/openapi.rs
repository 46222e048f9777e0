//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::config::ADMIN_KEY_HEADER;
use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Source-of-Truth Cutover Engine",
        version = "0.1.0",
        description = "Moves tables from a legacy store to a new store through checklist, freeze window and drift gates, with reconciliation and a hash-chained audit log"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Overview
        api::overview::get_overview,
        // Tables
        api::tables::register_table,
        api::tables::list_tables,
        api::tables::get_table,
        api::tables::get_routing,
        api::tables::advance_table,
        api::tables::rollback_table,
        // Audit
        api::tables::get_audit_trail,
        api::tables::replay_audit,
        // Checklist
        api::checklist::get_checklist,
        api::checklist::mark_gate,
        // Reconciliation
        api::reconciliation::trigger_reconciliation,
        api::reconciliation::list_table_jobs,
        api::reconciliation::get_job,
        api::reconciliation::list_alerts,
        // Freeze windows
        api::freeze_windows::schedule_window,
        api::freeze_windows::list_windows,
        api::freeze_windows::activate_window,
        api::freeze_windows::complete_window,
        api::freeze_windows::cancel_window,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Tables
            models::CutoverStatus,
            models::DataSource,
            models::ValidationStatus,
            models::IntegrityStatus,
            models::Transition,
            models::CutoverTable,
            models::CutoverTableListResponse,
            models::RoutingPolicy,
            models::RegisterTableRequest,
            models::RollbackRequest,
            models::CutoverOverview,
            // Checklist
            models::ChecklistGate,
            models::Checklist,
            models::MarkGateRequest,
            // Reconciliation
            models::JobType,
            models::JobStatus,
            models::ReconciliationJob,
            models::JobListResponse,
            models::TriggerReconciliationRequest,
            api::reconciliation::TableJobsQuery,
            // Freeze windows
            models::FreezeWindowStatus,
            models::FreezeWindow,
            models::ScheduleFreezeWindowRequest,
            models::CancelFreezeWindowRequest,
            // Audit
            models::AuditOperation,
            models::AuditStatus,
            models::AuditEntry,
            models::AuditReplay,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Overview", description = "Migration summary"),
        (name = "Tables", description = "Cutover state machine and routing"),
        (name = "Checklist", description = "Pre-cutover checklist gates"),
        (name = "Reconciliation", description = "Drift measurement jobs and alerts"),
        (name = "Freeze Windows", description = "Write-freeze scheduling"),
        (name = "Audit", description = "Hash-chained audit log")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add operator key security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(ADMIN_KEY_HEADER),
                    ),
                ),
            );
        }
    }
}
