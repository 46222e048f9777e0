//! API endpoint modules.

pub mod checklist;
pub mod freeze_windows;
pub mod health;
pub mod openapi;
pub mod overview;
pub mod reconciliation;
pub mod tables;

use actix_web::web;

pub use checklist::configure_routes as configure_checklist_routes;
pub use freeze_windows::configure_routes as configure_freeze_window_routes;
pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use overview::configure_routes as configure_overview_routes;
pub use reconciliation::configure_routes as configure_reconciliation_routes;
pub use tables::configure_routes as configure_table_routes;

/// Every `/api/v1` route.
pub fn configure_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health_routes)
        .configure(configure_overview_routes)
        .configure(configure_table_routes)
        .configure(configure_checklist_routes)
        .configure(configure_reconciliation_routes)
        .configure(configure_freeze_window_routes);
}
