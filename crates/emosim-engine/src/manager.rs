//! The run manager: the control API consumed by UIs and CLIs.
//!
//! Allocates runs from scenarios, spawns one engine task per started run,
//! relays control commands, and hands out event-stream subscriptions.
//! Runs are independent; the manager never shares mutable state between
//! them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::info;

use emosim_db::PersistBackend;
use emosim_oracle::LlmOracle;
use emosim_types::{
    AgentId, AgentSummary, ControlAction, MessageRecord, Run, RunId, RunStatus, Scenario,
    ScenarioId, StepRecord,
};

use crate::control::EngineControl;
use crate::emitter::{EventEmitter, EventStream, DEFAULT_BUFFER};
use crate::engine::{EngineConfig, SimulationEngine};
use crate::error::EngineError;

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// Maximum records returned.
    pub limit: usize,
    /// Records skipped.
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Per-run control and streaming endpoints held by the manager.
struct RunHandle {
    control: Arc<EngineControl>,
    emitter: Arc<EventEmitter>,
    scenario: Scenario,
}

/// Manages the lifecycle of all runs in this process.
pub struct RunManager {
    store: Arc<PersistBackend>,
    oracle: Arc<LlmOracle>,
    config: EngineConfig,
    runs: Mutex<BTreeMap<RunId, Arc<RunHandle>>>,
}

impl RunManager {
    /// Create a manager over a store and an oracle.
    pub fn new(store: Arc<PersistBackend>, oracle: Arc<LlmOracle>, config: EngineConfig) -> Self {
        Self {
            store,
            oracle,
            config,
            runs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a scenario so runs can be created from it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scenario`] on validation failure or
    /// [`EngineError::Persistence`] if the write fails.
    pub async fn register_scenario(&self, scenario: &Scenario) -> Result<(), EngineError> {
        scenario.validate()?;
        self.store.insert_scenario(scenario).await?;
        Ok(())
    }

    /// Allocate a run in `pending` from a stored scenario.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the scenario is unknown or
    /// the run cannot be written.
    pub async fn create_run(
        &self,
        scenario_id: ScenarioId,
        seed: Option<u64>,
        max_steps: Option<u64>,
    ) -> Result<Run, EngineError> {
        let scenario = self.store.get_scenario(scenario_id).await?;
        scenario.validate()?;

        let seed = seed.unwrap_or_else(|| rand::rng().random());
        let run = Run {
            id: RunId::new(),
            scenario_id,
            status: RunStatus::Pending,
            current_step: 0,
            max_steps: max_steps.or(scenario.config.max_steps),
            seed,
            world_state: serde_json::to_value(&scenario.config.initial_state)
                .unwrap_or_default(),
            metrics: serde_json::json!({}),
            evaluation: serde_json::json!({}),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.store.insert_run(&run).await?;

        let handle = Arc::new(RunHandle {
            control: Arc::new(EngineControl::new(Duration::from_millis(
                scenario.config.tick_delay_ms,
            ))),
            emitter: Arc::new(EventEmitter::new()),
            scenario,
        });
        self.lock().insert(run.id, handle);
        info!(run_id = %run.id, seed, "run created");
        Ok(run)
    }

    /// Apply a control command to a run. Invalid transitions error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RunNotFound`] for unknown runs and
    /// [`EngineError::InvalidTransition`] for commands illegal in the
    /// run's current status.
    pub async fn control_run(
        &self,
        run_id: RunId,
        action: ControlAction,
    ) -> Result<RunStatus, EngineError> {
        let handle = self.handle(run_id)?;
        let run = self.store.get_run(run_id).await?;
        let status = run.status;

        match action {
            ControlAction::Start => {
                if status != RunStatus::Pending {
                    return Err(EngineError::InvalidTransition {
                        from: status,
                        action,
                    });
                }
                let engine = SimulationEngine::new(
                    run,
                    &handle.scenario,
                    Arc::clone(&self.oracle),
                    Arc::clone(&self.store),
                    Arc::clone(&handle.emitter),
                    Arc::clone(&handle.control),
                    self.config.clone(),
                )?;
                tokio::spawn(engine.run());
                Ok(RunStatus::Running)
            }
            ControlAction::Pause => {
                if status != RunStatus::Running {
                    return Err(EngineError::InvalidTransition {
                        from: status,
                        action,
                    });
                }
                handle.control.pause();
                Ok(RunStatus::Paused)
            }
            ControlAction::Resume => {
                if status != RunStatus::Paused {
                    return Err(EngineError::InvalidTransition {
                        from: status,
                        action,
                    });
                }
                handle.control.resume();
                Ok(RunStatus::Running)
            }
            ControlAction::Stop => {
                if status.is_terminal() {
                    return Err(EngineError::InvalidTransition {
                        from: status,
                        action,
                    });
                }
                if status == RunStatus::Pending {
                    // Abandoned before start: out-of-band cancellation,
                    // no engine to signal.
                    let mut cancelled = run;
                    cancelled.status = RunStatus::Cancelled;
                    cancelled.completed_at = Some(Utc::now());
                    self.store.update_run(&cancelled).await?;
                    return Ok(RunStatus::Cancelled);
                }
                handle.control.request_stop();
                Ok(RunStatus::Stopped)
            }
            ControlAction::Step => {
                if status != RunStatus::Paused {
                    return Err(EngineError::InvalidTransition {
                        from: status,
                        action,
                    });
                }
                handle.control.request_step();
                Ok(RunStatus::Paused)
            }
        }
    }

    /// The run record.
    pub async fn get_run(&self, run_id: RunId) -> Result<Run, EngineError> {
        Ok(self.store.get_run(run_id).await?)
    }

    /// Runs, newest first, optionally filtered by scenario.
    pub async fn list_runs(
        &self,
        scenario: Option<ScenarioId>,
        page: Page,
    ) -> Result<Vec<Run>, EngineError> {
        Ok(self.store.list_runs(scenario, page.limit, page.offset).await?)
    }

    /// Agent summaries with live dynamic state (as of the last persisted
    /// step).
    pub async fn get_agents(&self, run_id: RunId) -> Result<Vec<AgentSummary>, EngineError> {
        Ok(self.store.get_agents(run_id).await?)
    }

    /// Step records, chronological.
    pub async fn get_steps(&self, run_id: RunId, page: Page) -> Result<Vec<StepRecord>, EngineError> {
        Ok(self.store.get_steps(run_id, page.limit, page.offset).await?)
    }

    /// Messages, chronological, optionally filtered by sender.
    pub async fn get_messages(
        &self,
        run_id: RunId,
        agent: Option<AgentId>,
        page: Page,
    ) -> Result<Vec<MessageRecord>, EngineError> {
        Ok(self
            .store
            .get_messages(run_id, agent, page.limit, page.offset)
            .await?)
    }

    /// Subscribe to a run's event stream.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RunNotFound`] for unknown runs.
    pub fn subscribe(&self, run_id: RunId) -> Result<EventStream, EngineError> {
        Ok(self.handle(run_id)?.emitter.subscribe(DEFAULT_BUFFER))
    }

    /// The emitter for a run (used by the observer layer).
    pub fn emitter(&self, run_id: RunId) -> Result<Arc<EventEmitter>, EngineError> {
        Ok(Arc::clone(&self.handle(run_id)?.emitter))
    }

    fn handle(&self, run_id: RunId) -> Result<Arc<RunHandle>, EngineError> {
        self.lock()
            .get(&run_id)
            .cloned()
            .ok_or(EngineError::RunNotFound(run_id))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<RunId, Arc<RunHandle>>> {
        self.runs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
