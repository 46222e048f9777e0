//! SeaORM entity definitions.

pub mod cutover_audit_entry;
pub mod cutover_checklist;
pub mod cutover_table;
pub mod freeze_window;
pub mod freeze_window_table;
pub mod reconciliation_job;
