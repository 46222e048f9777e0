//! Domain models for the cutover engine.

pub mod audit_entry;
pub mod checklist;
pub mod cutover_table;
pub mod event;
pub mod freeze_window;
pub mod reconciliation_job;

// Re-export commonly used types
pub use audit_entry::{AuditEntry, AuditOperation, AuditReplay, AuditStatus, NewAuditEntry};
pub use checklist::{Checklist, ChecklistGate, MarkGateRequest};
pub use cutover_table::{
    CutoverOverview, CutoverStatus, CutoverTable, CutoverTableListResponse, DataSource,
    IntegrityStatus, RegisterTableRequest, RollbackRequest, RollbackTrigger, RoutingPolicy,
    Transition, ValidationStatus,
};
pub use event::{CutoverEvent, CutoverEventMessage};
pub use freeze_window::{
    CancelFreezeWindowRequest, FreezeWindow, FreezeWindowStatus, ScheduleFreezeWindowRequest,
};
pub use reconciliation_job::{
    JobListQuery, JobListResponse, JobStatus, JobType, ReconciliationJob,
    TriggerReconciliationRequest,
};

/// Longest table name accepted (PostgreSQL identifier limit).
pub const MAX_TABLE_NAME_LEN: usize = 63;

/// Table names are lowercase SQL identifiers.
pub fn validate_table_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > MAX_TABLE_NAME_LEN {
        return Err(format!(
            "table name must be 1-{MAX_TABLE_NAME_LEN} characters, got {}",
            name.len()
        ));
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(format!(
            "table name '{name}' must be a lowercase identifier ([a-z_][a-z0-9_]*)"
        ));
    }
    Ok(())
}
