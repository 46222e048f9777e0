//! Cutover table domain models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::cutover_table;
use crate::error::{AppError, AppResult};

/// Lifecycle status of one cutover attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CutoverStatus {
    Pending,
    Ready,
    Cutover,
    Completed,
    RolledBack,
}

impl CutoverStatus {
    pub const ALL: [CutoverStatus; 5] = [
        Self::Pending,
        Self::Ready,
        Self::Cutover,
        Self::Completed,
        Self::RolledBack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Cutover => "cutover",
            Self::Completed => "completed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "cutover" => Some(Self::Cutover),
            "completed" => Some(Self::Completed),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack)
    }

    /// The only status edges the state machine may take.
    pub fn can_transition_to(&self, next: CutoverStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Ready)
                | (Self::Ready, Self::Cutover)
                | (Self::Cutover, Self::Completed)
                | (Self::Cutover, Self::RolledBack)
        )
    }
}

impl std::fmt::Display for CutoverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Physical store a read or write is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Legacy,
    Supabase,
    Dual,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Supabase => "supabase",
            Self::Dual => "dual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "legacy" => Some(Self::Legacy),
            "supabase" => Some(Self::Supabase),
            "dual" => Some(Self::Dual),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest reconciliation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Referential-integrity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    Pending,
    Clean,
    Issues,
}

impl IntegrityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Clean => "clean",
            Self::Issues => "issues",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "clean" => Some(Self::Clean),
            "issues" => Some(Self::Issues),
            _ => None,
        }
    }
}

/// Named state-machine step recorded in the audit log.
///
/// `ReadSwitch` does not change status: it is the second half of
/// `ready -> cutover`, moving reads once the dual-write soak is clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    PendingToReady,
    ReadyToCutover,
    ReadSwitch,
    CutoverToCompleted,
    CutoverToRolledBack,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingToReady => "pending_to_ready",
            Self::ReadyToCutover => "ready_to_cutover",
            Self::ReadSwitch => "read_switch",
            Self::CutoverToCompleted => "cutover_to_completed",
            Self::CutoverToRolledBack => "cutover_to_rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_to_ready" => Some(Self::PendingToReady),
            "ready_to_cutover" => Some(Self::ReadyToCutover),
            "read_switch" => Some(Self::ReadSwitch),
            "cutover_to_completed" => Some(Self::CutoverToCompleted),
            "cutover_to_rolled_back" => Some(Self::CutoverToRolledBack),
            _ => None,
        }
    }

    pub fn from_status(&self) -> CutoverStatus {
        match self {
            Self::PendingToReady => CutoverStatus::Pending,
            Self::ReadyToCutover => CutoverStatus::Ready,
            Self::ReadSwitch | Self::CutoverToCompleted | Self::CutoverToRolledBack => {
                CutoverStatus::Cutover
            }
        }
    }

    pub fn to_status(&self) -> CutoverStatus {
        match self {
            Self::PendingToReady => CutoverStatus::Ready,
            Self::ReadyToCutover | Self::ReadSwitch => CutoverStatus::Cutover,
            Self::CutoverToCompleted => CutoverStatus::Completed,
            Self::CutoverToRolledBack => CutoverStatus::RolledBack,
        }
    }

    /// The forward step an advance request attempts from `status`.
    pub fn advance_from(status: CutoverStatus) -> Option<Self> {
        match status {
            CutoverStatus::Pending => Some(Self::PendingToReady),
            CutoverStatus::Ready => Some(Self::ReadyToCutover),
            CutoverStatus::Cutover => Some(Self::CutoverToCompleted),
            CutoverStatus::Completed | CutoverStatus::RolledBack => None,
        }
    }
}

/// What drove a table into `rolled_back`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTrigger {
    /// Operator request or operator cancellation of the cutover.
    Operator,
    /// Reconciliation found record-count drift during cutover.
    DriftDetected,
    /// Reconciliation found referential-integrity issues during cutover.
    IntegrityIssues,
    /// Freeze window reached its end before the table completed.
    FreezeWindowExpired,
    /// Freeze window was closed early by an operator.
    FreezeWindowClosed,
    /// Freeze window was cancelled.
    FreezeWindowCancelled,
}

impl RollbackTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::DriftDetected => "drift_detected",
            Self::IntegrityIssues => "integrity_issues",
            Self::FreezeWindowExpired => "freeze_window_expired",
            Self::FreezeWindowClosed => "freeze_window_closed",
            Self::FreezeWindowCancelled => "freeze_window_cancelled",
        }
    }

    pub fn is_system_initiated(&self) -> bool {
        !matches!(self, Self::Operator)
    }
}

/// Snapshot of one cutover attempt.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CutoverTable {
    pub id: Uuid,
    pub name: String,
    pub attempt: i32,
    pub status: CutoverStatus,
    pub read_source: DataSource,
    pub write_source: DataSource,
    pub validation_status: ValidationStatus,
    /// Fraction in [0, 1], 4 decimal places.
    pub drift_percentage: f64,
    pub record_count_legacy: i64,
    pub record_count_new: i64,
    pub record_count_difference: i64,
    pub referential_integrity_status: IntegrityStatus,
    pub referential_integrity_issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dual_write_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_switched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconciled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutover_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<String>,
    /// Row version for optimistic concurrency.
    pub version: i32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CutoverTable {
    /// Convert a database row into the typed model.
    pub fn from_model(m: cutover_table::Model) -> AppResult<Self> {
        let corrupt =
            |field: &str, value: &str| AppError::Database(format!("cutover_tables.{field} holds unknown value '{value}'"));

        let issues: Vec<String> =
            serde_json::from_value(m.referential_integrity_issues.clone()).unwrap_or_default();

        Ok(Self {
            id: m.id,
            status: CutoverStatus::parse(&m.status).ok_or_else(|| corrupt("status", &m.status))?,
            read_source: DataSource::parse(&m.read_source)
                .ok_or_else(|| corrupt("read_source", &m.read_source))?,
            write_source: DataSource::parse(&m.write_source)
                .ok_or_else(|| corrupt("write_source", &m.write_source))?,
            validation_status: ValidationStatus::parse(&m.validation_status)
                .ok_or_else(|| corrupt("validation_status", &m.validation_status))?,
            referential_integrity_status: IntegrityStatus::parse(&m.referential_integrity_status)
                .ok_or_else(|| {
                    corrupt(
                        "referential_integrity_status",
                        &m.referential_integrity_status,
                    )
                })?,
            referential_integrity_issues: issues,
            name: m.name,
            attempt: m.attempt,
            drift_percentage: m.drift_percentage,
            record_count_legacy: m.record_count_legacy,
            record_count_new: m.record_count_new,
            record_count_difference: m.record_count_difference,
            dual_write_started_at: m.dual_write_started_at,
            read_switched_at: m.read_switched_at,
            last_reconciled_at: m.last_reconciled_at,
            cutover_date: m.cutover_date,
            rollback_date: m.rollback_date,
            rollback_reason: m.rollback_reason,
            version: m.version,
            created_by: m.created_by,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }

    /// Exact zero drift: equal counts and no integrity issues.
    pub fn has_zero_drift(&self) -> bool {
        self.record_count_difference == 0
            && self.drift_percentage == 0.0
            && self.referential_integrity_status == IntegrityStatus::Clean
    }

    /// Routing policy derived from the row (freeze state filled in by the engine).
    pub fn routing(&self, writes_frozen: bool) -> RoutingPolicy {
        RoutingPolicy {
            table_name: self.name.clone(),
            status: self.status,
            read_source: self.read_source,
            write_source: self.write_source,
            writes_frozen,
        }
    }
}

/// Routing answer consulted by the data-access layer on every read/write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RoutingPolicy {
    pub table_name: String,
    pub status: CutoverStatus,
    pub read_source: DataSource,
    pub write_source: DataSource,
    /// Writes must be rejected while an active freeze window covers the table.
    pub writes_frozen: bool,
}

/// Request to register a table for migration.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterTableRequest {
    pub name: String,
}

/// Request to roll a table back.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RollbackRequest {
    pub reason: String,
}

/// List of cutover tables.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CutoverTableListResponse {
    pub tables: Vec<CutoverTable>,
    pub total: u64,
}

/// Read-only migration summary for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CutoverOverview {
    pub total_tables: u64,
    pub pending: u64,
    pub ready: u64,
    pub cutover: u64,
    pub completed: u64,
    pub rolled_back: u64,
    /// Share of tables in `completed`, 0-100 with 2 decimal places.
    pub progress_percentage: f64,
    pub active_freeze_windows: u64,
    pub open_alerts: u64,
}

impl CutoverOverview {
    /// Build the per-status counts from the current attempt of every table.
    pub fn from_statuses(statuses: impl IntoIterator<Item = CutoverStatus>) -> Self {
        let mut overview = Self::default();
        for status in statuses {
            overview.total_tables += 1;
            match status {
                CutoverStatus::Pending => overview.pending += 1,
                CutoverStatus::Ready => overview.ready += 1,
                CutoverStatus::Cutover => overview.cutover += 1,
                CutoverStatus::Completed => overview.completed += 1,
                CutoverStatus::RolledBack => overview.rolled_back += 1,
            }
        }
        overview.progress_percentage = if overview.total_tables == 0 {
            0.0
        } else {
            let raw = overview.completed as f64 / overview.total_tables as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };
        overview
    }
}
