//! Freeze window models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::freeze_window;
use crate::error::{AppError, AppResult};

/// Freeze window lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FreezeWindowStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl FreezeWindowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Scheduled and active windows still claim their tables.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Active)
    }
}

impl std::fmt::Display for FreezeWindowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time-bounded interval during which writes to the listed tables are frozen.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FreezeWindow {
    pub id: Uuid,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: FreezeWindowStatus,
    pub affected_tables: Vec<String>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl FreezeWindow {
    pub fn from_model(m: freeze_window::Model, mut affected_tables: Vec<String>) -> AppResult<Self> {
        let status = FreezeWindowStatus::parse(&m.status).ok_or_else(|| {
            AppError::Database(format!(
                "freeze_windows.status holds unknown value '{}'",
                m.status
            ))
        })?;
        affected_tables.sort();

        Ok(Self {
            id: m.id,
            description: m.description,
            start_time: m.start_time,
            end_time: m.end_time,
            status,
            affected_tables,
            created_by: m.created_by,
            activated_at: m.activated_at,
            completed_at: m.completed_at,
            cancelled_at: m.cancelled_at,
            cancel_reason: m.cancel_reason,
            version: m.version,
            created_at: m.created_at,
        })
    }

    /// Half-open interval overlap: `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    pub fn covers(&self, table: &str) -> bool {
        self.affected_tables.iter().any(|t| t == table)
    }

    pub fn shares_tables(&self, tables: &[String]) -> bool {
        tables.iter().any(|t| self.covers(t))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at < self.end_time
    }
}

/// Request to schedule a freeze window.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleFreezeWindowRequest {
    pub tables: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

/// Request to cancel a freeze window.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CancelFreezeWindowRequest {
    pub reason: String,
}
