//! In-memory persistence backend.
//!
//! Used by tests and by runs configured without a database. Mirrors the
//! `PostgreSQL` backend's semantics, including atomic step+messages
//! persistence and `running -> paused` recovery. A failure-injection
//! counter lets tests exercise the engine's retry-then-error path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use emosim_types::{
    AgentId, AgentSummary, MessageRecord, Run, RunId, RunStatus, Scenario, ScenarioId, StepRecord,
};

use crate::error::DbError;

#[derive(Debug, Default)]
struct Inner {
    scenarios: BTreeMap<ScenarioId, Scenario>,
    runs: BTreeMap<RunId, Run>,
    agents: BTreeMap<RunId, Vec<AgentSummary>>,
    steps: BTreeMap<RunId, Vec<StepRecord>>,
    messages: BTreeMap<RunId, Vec<MessageRecord>>,
}

/// The in-memory store. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    fail_next: Arc<AtomicU32>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` persistence operations fail (test hook for
    /// the engine's retry-then-error path).
    pub fn inject_failures(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    fn consume_injected_failure(&self) -> Result<(), DbError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(DbError::Injected);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a test thread panicked mid-write; the
        // data is still the best available.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert a scenario.
    pub fn insert_scenario(&self, scenario: &Scenario) -> Result<(), DbError> {
        self.lock().scenarios.insert(scenario.id, scenario.clone());
        Ok(())
    }

    /// Load a scenario.
    pub fn get_scenario(&self, id: ScenarioId) -> Result<Scenario, DbError> {
        self.lock()
            .scenarios
            .get(&id)
            .cloned()
            .ok_or(DbError::ScenarioNotFound(id))
    }

    /// Insert a run.
    pub fn insert_run(&self, run: &Run) -> Result<(), DbError> {
        self.lock().runs.insert(run.id, run.clone());
        Ok(())
    }

    /// Update a run.
    pub fn update_run(&self, run: &Run) -> Result<(), DbError> {
        let mut inner = self.lock();
        if !inner.runs.contains_key(&run.id) {
            return Err(DbError::RunNotFound(run.id));
        }
        inner.runs.insert(run.id, run.clone());
        Ok(())
    }

    /// Load a run.
    pub fn get_run(&self, id: RunId) -> Result<Run, DbError> {
        self.lock().runs.get(&id).cloned().ok_or(DbError::RunNotFound(id))
    }

    /// List runs, newest first, optionally filtered by scenario.
    pub fn list_runs(
        &self,
        scenario: Option<ScenarioId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Run>, DbError> {
        let inner = self.lock();
        let mut runs: Vec<Run> = inner
            .runs
            .values()
            .filter(|r| scenario.map_or(true, |s| r.scenario_id == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs.into_iter().skip(offset).take(limit).collect())
    }

    /// Upsert agent summaries for a run.
    pub fn upsert_agents(&self, run_id: RunId, agents: &[AgentSummary]) -> Result<(), DbError> {
        self.lock().agents.insert(run_id, agents.to_vec());
        Ok(())
    }

    /// Agent summaries for a run.
    pub fn get_agents(&self, run_id: RunId) -> Result<Vec<AgentSummary>, DbError> {
        Ok(self.lock().agents.get(&run_id).cloned().unwrap_or_default())
    }

    /// Persist one step and its messages atomically.
    pub fn persist_step(
        &self,
        step: &StepRecord,
        messages: &[MessageRecord],
    ) -> Result<(), DbError> {
        self.consume_injected_failure()?;
        let mut inner = self.lock();
        inner.steps.entry(step.run_id).or_default().push(step.clone());
        inner
            .messages
            .entry(step.run_id)
            .or_default()
            .extend(messages.iter().cloned());
        Ok(())
    }

    /// Steps of a run, chronological.
    pub fn get_steps(
        &self,
        run_id: RunId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StepRecord>, DbError> {
        Ok(self
            .lock()
            .steps
            .get(&run_id)
            .map(|steps| steps.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    /// Messages of a run, chronological, optionally filtered by sender.
    pub fn get_messages(
        &self,
        run_id: RunId,
        agent: Option<AgentId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageRecord>, DbError> {
        Ok(self
            .lock()
            .messages
            .get(&run_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| agent.map_or(true, |a| m.from_agent_id == Some(a)))
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Reset runs left in `running` to `paused`. Returns affected ids.
    pub fn recover_interrupted_runs(&self) -> Result<Vec<RunId>, DbError> {
        let mut inner = self.lock();
        let mut recovered = Vec::new();
        for run in inner.runs.values_mut() {
            if run.status == RunStatus::Running {
                run.status = RunStatus::Paused;
                recovered.push(run.id);
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use emosim_types::StepMetrics;

    fn sample_run(status: RunStatus) -> Run {
        Run {
            id: RunId::new(),
            scenario_id: ScenarioId::new(),
            status,
            current_step: 0,
            max_steps: Some(10),
            seed: 42,
            world_state: serde_json::json!({}),
            metrics: serde_json::json!({}),
            evaluation: serde_json::json!({}),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn sample_step(run_id: RunId, index: u64) -> StepRecord {
        StepRecord {
            run_id,
            step_index: index,
            world_state: serde_json::json!({}),
            actions: Vec::new(),
            metrics: StepMetrics::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn run_roundtrip() {
        let store = MemoryStore::new();
        let run = sample_run(RunStatus::Pending);
        store.insert_run(&run).expect("insert");
        assert_eq!(store.get_run(run.id).expect("get").id, run.id);
    }

    #[test]
    fn update_missing_run_is_error() {
        let store = MemoryStore::new();
        let run = sample_run(RunStatus::Pending);
        assert!(matches!(
            store.update_run(&run),
            Err(DbError::RunNotFound(_))
        ));
    }

    #[test]
    fn steps_accumulate_in_order() {
        let store = MemoryStore::new();
        let run = sample_run(RunStatus::Running);
        store.insert_run(&run).expect("insert");
        for i in 1..=3 {
            store
                .persist_step(&sample_step(run.id, i), &[])
                .expect("persist");
        }
        let steps = store.get_steps(run.id, 100, 0).expect("steps");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].step_index, 3);
    }

    #[test]
    fn injected_failures_consume_then_clear() {
        let store = MemoryStore::new();
        let run = sample_run(RunStatus::Running);
        store.insert_run(&run).expect("insert");
        store.inject_failures(1);
        assert!(store.persist_step(&sample_step(run.id, 1), &[]).is_err());
        assert!(store.persist_step(&sample_step(run.id, 1), &[]).is_ok());
    }

    #[test]
    fn recovery_resets_running_to_paused() {
        let store = MemoryStore::new();
        let running = sample_run(RunStatus::Running);
        let done = sample_run(RunStatus::Completed);
        store.insert_run(&running).expect("insert");
        store.insert_run(&done).expect("insert");

        let recovered = store.recover_interrupted_runs().expect("recover");
        assert_eq!(recovered, vec![running.id]);
        assert_eq!(
            store.get_run(running.id).expect("get").status,
            RunStatus::Paused
        );
        assert_eq!(
            store.get_run(done.id).expect("get").status,
            RunStatus::Completed
        );
    }

    #[test]
    fn list_runs_filters_by_scenario() {
        let store = MemoryStore::new();
        let run_a = sample_run(RunStatus::Pending);
        let run_b = sample_run(RunStatus::Pending);
        store.insert_run(&run_a).expect("insert");
        store.insert_run(&run_b).expect("insert");
        let filtered = store
            .list_runs(Some(run_a.scenario_id), 10, 0)
            .expect("list");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, run_a.id);
    }
}
