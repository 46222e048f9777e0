//! Cutover engine facade.
//!
//! Every operator and data-access operation is a method on [`CutoverEngine`];
//! the implementations live in the sibling modules as `impl CutoverEngine`
//! blocks. Operations take the acting identity and the current time
//! explicitly.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::info;

use super::drift_detector::{DriftDetector, LEGACY_STORE, NEW_STORE};
use super::event_broadcaster::{EventBroadcaster, TableSubscription};
use super::reconciliation::ReconciliationPolicy;
use super::store_probe::{SqlStoreProbe, StoreProbe};
use crate::config::{Config, defaults};
use crate::db::{DbPool, cutover_tables};
use crate::entity::cutover_table;
use crate::error::{AppError, AppResult};
use crate::models::{CutoverEvent, CutoverEventMessage};

/// Actor recorded for system-initiated operations.
pub const SYSTEM_ACTOR: &str = "system";

/// Tunables for the engine's policies.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Zero-drift dual-write period required before reads move to the new store.
    pub dual_write_soak: Duration,
    /// Highest drift fraction that still yields `validation_status = passed`.
    pub ready_drift_threshold: f64,
    pub reconciliation: ReconciliationPolicy,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dual_write_soak: Duration::seconds(config.freeze.dual_write_soak_secs as i64),
            ready_drift_threshold: config.reconciliation.ready_drift_threshold,
            reconciliation: ReconciliationPolicy::from_settings(&config.reconciliation),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dual_write_soak: Duration::seconds(defaults::DEV_DUAL_WRITE_SOAK_SECS as i64),
            ready_drift_threshold: defaults::DEV_READY_DRIFT_THRESHOLD,
            reconciliation: ReconciliationPolicy::default(),
        }
    }
}

/// Source-of-truth cutover and reconciliation engine.
#[derive(Clone)]
pub struct CutoverEngine {
    pub(crate) pool: DbPool,
    pub(crate) detector: Arc<DriftDetector>,
    pub(crate) broadcaster: EventBroadcaster,
    pub(crate) settings: EngineSettings,
}

impl CutoverEngine {
    pub fn new(
        pool: DbPool,
        detector: Arc<DriftDetector>,
        broadcaster: EventBroadcaster,
        settings: EngineSettings,
    ) -> Self {
        Self {
            pool,
            detector,
            broadcaster,
            settings,
        }
    }

    /// Engine wired to the stores named in `config`. Store connections are
    /// lazy; an unreachable store only fails the jobs that touch it.
    pub async fn from_config(pool: DbPool, config: &Config) -> AppResult<Self> {
        let stores = &config.stores;
        let timeout = StdDuration::from_secs(stores.query_timeout_secs);

        let probe = |store: &'static str, url: String| {
            let delta_column = stores.delta_column.clone();
            let checks = stores.integrity_checks.clone();
            async move {
                SqlStoreProbe::connect(&url, delta_column, checks, timeout)
                    .await
                    .map(|p| Arc::new(p) as Arc<dyn StoreProbe>)
                    .map_err(|e| AppError::Database(format!("Failed to open {} store: {}", store, e)))
            }
        };

        let legacy = probe(LEGACY_STORE, stores.legacy_url.clone()).await?;
        let new = probe(NEW_STORE, stores.new_url.clone()).await?;
        info!(
            integrity_checks = stores.integrity_checks.len(),
            delta_column = %stores.delta_column,
            "Store probes configured"
        );

        Ok(Self::new(
            pool,
            Arc::new(DriftDetector::new(legacy, new)),
            EventBroadcaster::new(),
            EngineSettings::from_config(config),
        ))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn detector(&self) -> &DriftDetector {
        &self.detector
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CutoverEventMessage> {
        self.broadcaster.subscribe()
    }

    /// Receive events for one table published after this call.
    pub fn subscribe_table(&self, table: &str) -> TableSubscription {
        self.broadcaster.subscribe_table(table)
    }

    /// Publish an event for a change that has already committed.
    pub(crate) fn publish(&self, event: CutoverEvent, now: DateTime<Utc>) {
        self.broadcaster.send(CutoverEventMessage::new(event, now));
    }

    /// Current attempt row for `name`, or `NotFound`.
    pub(crate) async fn current_row(&self, name: &str) -> AppResult<cutover_table::Model> {
        cutover_tables::find_current(self.pool.connection(), name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cutover table '{}'", name)))
    }
}
