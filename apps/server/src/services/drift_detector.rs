//! Drift detection between the legacy and new stores.
//!
//! The detector only measures. Whether a given drift is acceptable is decided
//! by the callers (checklist gate, state machine policy).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::store_probe::{ProbeError, StoreProbe};
use crate::error::DriftError;
use crate::models::JobType;

/// Name reported for the legacy store.
pub const LEGACY_STORE: &str = "legacy";
/// Name reported for the new store.
pub const NEW_STORE: &str = "supabase";

/// How much of the table a run looks at. Counts and aggregate integrity
/// checks are always compared; the scope decides what counts as progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftScope {
    /// Whole table; progress is the legacy row count.
    Full,
    /// Rows changed since the watermark (whole table when there is none).
    Incremental { since: Option<DateTime<Utc>> },
    /// Aggregate counts only; no rows are walked.
    CountOnly,
}

impl DriftScope {
    pub fn for_job(job_type: JobType, watermark: Option<DateTime<Utc>>) -> Self {
        match job_type {
            JobType::Full => Self::Full,
            JobType::Incremental => Self::Incremental { since: watermark },
            JobType::DriftCheck => Self::CountOnly,
        }
    }
}

/// Measured divergence for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub table: String,
    pub record_count_legacy: i64,
    pub record_count_new: i64,
    /// Absolute count difference.
    pub record_count_difference: i64,
    /// `|legacy - new| / max(legacy, 1)`, 4 decimal places, capped at 1.
    pub drift_percentage: f64,
    /// Issue descriptions prefixed with the store they were found in.
    pub integrity_issues: Vec<String>,
    pub records_processed: i64,
}

impl DriftReport {
    pub fn integrity_clean(&self) -> bool {
        self.integrity_issues.is_empty()
    }

    /// Exact equality of counts and no integrity issues.
    pub fn is_zero(&self) -> bool {
        self.record_count_difference == 0 && self.integrity_clean()
    }
}

/// Round to 4 decimal places.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Drift fraction between two counts.
pub fn drift_fraction(legacy: i64, new: i64) -> f64 {
    let difference = (legacy - new).unsigned_abs() as f64;
    let denominator = legacy.max(1) as f64;
    round4(difference / denominator).min(1.0)
}

fn into_drift_error(store: &str, table: &str, err: ProbeError) -> DriftError {
    match err {
        ProbeError::Unavailable(message) => DriftError::SourceUnavailable {
            store: store.to_string(),
            table: table.to_string(),
            message,
        },
        ProbeError::Query(message) => DriftError::Query {
            store: store.to_string(),
            table: table.to_string(),
            message,
        },
    }
}

/// Compares one table across the two stores.
pub struct DriftDetector {
    legacy: Arc<dyn StoreProbe>,
    new: Arc<dyn StoreProbe>,
}

impl DriftDetector {
    pub fn new(legacy: Arc<dyn StoreProbe>, new: Arc<dyn StoreProbe>) -> Self {
        Self { legacy, new }
    }

    /// Reachability of the legacy and new stores, in that order.
    pub async fn ping_stores(&self) -> (Result<(), ProbeError>, Result<(), ProbeError>) {
        tokio::join!(self.legacy.ping(), self.new.ping())
    }

    /// Measure drift for `table`. Any unreachable store fails the run with
    /// `SourceUnavailable`; it is never reported as drift.
    pub async fn detect(&self, table: &str, scope: DriftScope) -> Result<DriftReport, DriftError> {
        let (legacy_count, new_count) = tokio::try_join!(
            async {
                self.legacy
                    .record_count(table)
                    .await
                    .map_err(|e| into_drift_error(LEGACY_STORE, table, e))
            },
            async {
                self.new
                    .record_count(table)
                    .await
                    .map_err(|e| into_drift_error(NEW_STORE, table, e))
            },
        )?;

        let (legacy_issues, new_issues) = tokio::try_join!(
            async {
                self.legacy
                    .integrity_issues(table)
                    .await
                    .map_err(|e| into_drift_error(LEGACY_STORE, table, e))
            },
            async {
                self.new
                    .integrity_issues(table)
                    .await
                    .map_err(|e| into_drift_error(NEW_STORE, table, e))
            },
        )?;

        let records_processed = match scope {
            DriftScope::Full | DriftScope::Incremental { since: None } => legacy_count,
            DriftScope::Incremental { since: Some(since) } => self
                .legacy
                .changed_since(table, since)
                .await
                .map_err(|e| into_drift_error(LEGACY_STORE, table, e))?,
            DriftScope::CountOnly => 0,
        };

        let integrity_issues: Vec<String> = legacy_issues
            .into_iter()
            .map(|issue| format!("{LEGACY_STORE}: {issue}"))
            .chain(
                new_issues
                    .into_iter()
                    .map(|issue| format!("{NEW_STORE}: {issue}")),
            )
            .collect();

        let report = DriftReport {
            table: table.to_string(),
            record_count_legacy: legacy_count,
            record_count_new: new_count,
            record_count_difference: (legacy_count - new_count).abs(),
            drift_percentage: drift_fraction(legacy_count, new_count),
            integrity_issues,
            records_processed,
        };

        debug!(
            table = %table,
            legacy = report.record_count_legacy,
            new = report.record_count_new,
            drift = report.drift_percentage,
            issues = report.integrity_issues.len(),
            "Drift measured"
        );

        Ok(report)
    }
}
