//! Shared test helpers for the engine suite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use cutover_lib::db::DbPool;
use cutover_lib::models::{ChecklistGate, CutoverTable, FreezeWindow, JobType, ReconciliationJob};
use cutover_lib::services::{
    CutoverEngine, DriftDetector, EngineSettings, EventBroadcaster, ProbeError, StoreProbe,
};

/// Actor used for operator requests in tests.
pub const OPERATOR: &str = "alice";

/// Rows seeded into both stores by `prepare_ready`.
pub const SEEDED_ROWS: i64 = 1000;

/// How a scripted probe answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    #[default]
    Healthy,
    Unavailable,
    QueryFails,
    Hang,
}

#[derive(Default)]
struct ProbeState {
    counts: HashMap<String, i64>,
    changed: HashMap<String, i64>,
    issues: HashMap<String, Vec<String>>,
    mode: ProbeMode,
}

/// In-memory store probe whose answers the test controls.
#[derive(Default)]
pub struct ScriptedProbe {
    state: Mutex<ProbeState>,
}

impl ScriptedProbe {
    pub fn set_count(&self, table: &str, count: i64) {
        self.state.lock().unwrap().counts.insert(table.to_string(), count);
    }

    pub fn set_changed(&self, table: &str, changed: i64) {
        self.state.lock().unwrap().changed.insert(table.to_string(), changed);
    }

    pub fn set_issues(&self, table: &str, issues: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .issues
            .insert(table.to_string(), issues.iter().map(|s| s.to_string()).collect());
    }

    pub fn set_mode(&self, mode: ProbeMode) {
        self.state.lock().unwrap().mode = mode;
    }

    fn mode(&self) -> ProbeMode {
        self.state.lock().unwrap().mode
    }

    async fn gate(&self) -> Result<(), ProbeError> {
        match self.mode() {
            ProbeMode::Healthy => Ok(()),
            ProbeMode::Unavailable => Err(ProbeError::Unavailable("connection refused".to_string())),
            ProbeMode::QueryFails => Err(ProbeError::Query("relation does not exist".to_string())),
            ProbeMode::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl StoreProbe for ScriptedProbe {
    async fn record_count(&self, table: &str) -> Result<i64, ProbeError> {
        self.gate().await?;
        Ok(self.state.lock().unwrap().counts.get(table).copied().unwrap_or(0))
    }

    async fn changed_since(&self, table: &str, _since: DateTime<Utc>) -> Result<i64, ProbeError> {
        self.gate().await?;
        Ok(self.state.lock().unwrap().changed.get(table).copied().unwrap_or(0))
    }

    async fn integrity_issues(&self, table: &str) -> Result<Vec<String>, ProbeError> {
        self.gate().await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .issues
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), ProbeError> {
        self.gate().await
    }
}

/// Engine wired to scripted probes.
pub struct Harness {
    pub engine: CutoverEngine,
    pub legacy: Arc<ScriptedProbe>,
    pub new: Arc<ScriptedProbe>,
}

/// Harness with default settings (300s soak, zero ready threshold).
pub async fn harness() -> Harness {
    harness_with(EngineSettings::default()).await
}

pub async fn harness_with(settings: EngineSettings) -> Harness {
    let pool = DbPool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let legacy = Arc::new(ScriptedProbe::default());
    let new = Arc::new(ScriptedProbe::default());
    let detector = Arc::new(DriftDetector::new(legacy.clone(), new.clone()));
    let engine = CutoverEngine::new(pool, detector, EventBroadcaster::new(), settings);
    Harness {
        engine,
        legacy,
        new,
    }
}

/// Fixed reference instant, truncated to whole seconds.
pub fn t0() -> DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::seconds(1))
        .expect("Failed to truncate timestamp")
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

/// The six gates operators attest by hand.
pub fn operator_gates() -> Vec<ChecklistGate> {
    ChecklistGate::ALL
        .into_iter()
        .filter(|gate| !gate.is_system_driven())
        .collect()
}

impl Harness {
    /// Seed both stores with the same row count.
    pub fn seed(&self, table: &str, rows: i64) {
        self.legacy.set_count(table, rows);
        self.new.set_count(table, rows);
    }

    pub async fn register(&self, name: &str, at: DateTime<Utc>) -> CutoverTable {
        self.engine
            .register_table(name, OPERATOR, at)
            .await
            .expect("Failed to register table")
    }

    pub async fn mark_operator_gates(&self, name: &str, at: DateTime<Utc>) {
        for gate in operator_gates() {
            self.engine
                .mark_checklist_gate(name, gate, true, OPERATOR, at)
                .await
                .expect("Failed to mark gate");
        }
    }

    /// Trigger a job and run it immediately.
    pub async fn reconcile(&self, name: &str, job_type: JobType, at: DateTime<Utc>) -> ReconciliationJob {
        let job = self
            .engine
            .trigger_reconciliation(name, job_type, OPERATOR, at)
            .await
            .expect("Failed to trigger reconciliation");
        self.engine
            .run_job(job.id, at)
            .await
            .expect("Failed to run reconciliation job")
    }

    /// Register, seed, attest and reconcile `name`, then advance it to ready.
    pub async fn prepare_ready(&self, name: &str, at: DateTime<Utc>) -> CutoverTable {
        self.seed(name, SEEDED_ROWS);
        self.register(name, at).await;
        self.mark_operator_gates(name, at).await;
        self.reconcile(name, JobType::Full, at).await;
        self.engine
            .request_advance(name, OPERATOR, at)
            .await
            .expect("Failed to advance to ready")
    }

    /// Schedule a window over `tables` ahead of `start` and activate it at `start`.
    pub async fn open_window(
        &self,
        tables: &[&str],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> FreezeWindow {
        let tables: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        let window = self
            .engine
            .schedule_freeze_window(&tables, start, end, "test window", OPERATOR, start - minutes(10))
            .await
            .expect("Failed to schedule freeze window");
        self.engine
            .activate_freeze_window(window.id, OPERATOR, start)
            .await
            .expect("Failed to activate freeze window")
    }

    /// Bring `name` into `cutover` at `at` under a 30 minute window.
    pub async fn into_cutover(&self, name: &str, at: DateTime<Utc>) -> CutoverTable {
        self.prepare_ready(name, at - minutes(60)).await;
        self.open_window(&[name], at, at + minutes(30)).await;
        self.engine
            .request_advance(name, OPERATOR, at)
            .await
            .expect("Failed to advance to cutover")
    }
}
