//! Business logic services.

pub mod audit;
pub mod checklist;
pub mod drift_detector;
pub mod engine;
pub mod event_broadcaster;
pub mod freeze_window;
pub mod reconciliation;
pub mod state_machine;
pub mod store_probe;

pub use drift_detector::{DriftDetector, DriftReport, DriftScope};
pub use engine::{CutoverEngine, EngineSettings, SYSTEM_ACTOR};
pub use event_broadcaster::{EventBroadcaster, TableSubscription};
pub use freeze_window::{FreezeTickReport, start_freeze_window_task};
pub use reconciliation::{
    ExponentialBackoff, ReconciliationPolicy, ReconciliationTickReport, start_reconciliation_task,
};
pub use store_probe::{ForeignKeyCheck, ProbeError, SqlStoreProbe, StoreProbe};
