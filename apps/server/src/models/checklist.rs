//! Cutover checklist models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::cutover_checklist;

/// One of the eight validation gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistGate {
    DataConsistency,
    ReferentialIntegrity,
    PerformanceValidation,
    SecurityValidation,
    BackupComplete,
    FreezeWindowScheduled,
    TeamNotified,
    RollbackPlanReady,
}

impl ChecklistGate {
    pub const ALL: [ChecklistGate; 8] = [
        Self::DataConsistency,
        Self::ReferentialIntegrity,
        Self::PerformanceValidation,
        Self::SecurityValidation,
        Self::BackupComplete,
        Self::FreezeWindowScheduled,
        Self::TeamNotified,
        Self::RollbackPlanReady,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataConsistency => "data_consistency",
            Self::ReferentialIntegrity => "referential_integrity",
            Self::PerformanceValidation => "performance_validation",
            Self::SecurityValidation => "security_validation",
            Self::BackupComplete => "backup_complete",
            Self::FreezeWindowScheduled => "freeze_window_scheduled",
            Self::TeamNotified => "team_notified",
            Self::RollbackPlanReady => "rollback_plan_ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|gate| gate.as_str() == s)
    }

    /// Gates set from reconciliation results. Operators attest the other six.
    pub fn is_system_driven(&self) -> bool {
        matches!(self, Self::DataConsistency | Self::ReferentialIntegrity)
    }
}

impl std::fmt::Display for ChecklistGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Checklist state for one cutover attempt.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Checklist {
    pub table_name: String,
    pub data_consistency: bool,
    pub referential_integrity: bool,
    pub performance_validation: bool,
    pub security_validation: bool,
    pub backup_complete: bool,
    pub freeze_window_scheduled: bool,
    pub team_notified: bool,
    pub rollback_plan_ready: bool,
    pub all_satisfied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
}

impl Checklist {
    pub fn gate(&self, gate: ChecklistGate) -> bool {
        match gate {
            ChecklistGate::DataConsistency => self.data_consistency,
            ChecklistGate::ReferentialIntegrity => self.referential_integrity,
            ChecklistGate::PerformanceValidation => self.performance_validation,
            ChecklistGate::SecurityValidation => self.security_validation,
            ChecklistGate::BackupComplete => self.backup_complete,
            ChecklistGate::FreezeWindowScheduled => self.freeze_window_scheduled,
            ChecklistGate::TeamNotified => self.team_notified,
            ChecklistGate::RollbackPlanReady => self.rollback_plan_ready,
        }
    }

    /// Gates still false, in declaration order.
    pub fn unsatisfied(&self) -> Vec<ChecklistGate> {
        ChecklistGate::ALL
            .into_iter()
            .filter(|gate| !self.gate(*gate))
            .collect()
    }
}

impl From<cutover_checklist::Model> for Checklist {
    fn from(m: cutover_checklist::Model) -> Self {
        let mut checklist = Self {
            table_name: m.table_name,
            data_consistency: m.data_consistency,
            referential_integrity: m.referential_integrity,
            performance_validation: m.performance_validation,
            security_validation: m.security_validation,
            backup_complete: m.backup_complete,
            freeze_window_scheduled: m.freeze_window_scheduled,
            team_notified: m.team_notified,
            rollback_plan_ready: m.rollback_plan_ready,
            all_satisfied: false,
            completed_at: m.completed_at,
            completed_by: m.completed_by,
        };
        checklist.all_satisfied = checklist.unsatisfied().is_empty();
        checklist
    }
}

/// Request body for marking a single gate.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MarkGateRequest {
    pub value: bool,
}
