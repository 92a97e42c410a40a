//! The unified persistence backend the engine talks to.
//!
//! Uses enum dispatch instead of a trait object because the `PostgreSQL`
//! methods are async and async trait methods are not dyn-compatible.
//! The in-memory variant serves tests and database-less runs with the
//! same semantics.

use emosim_types::{
    AgentId, AgentSummary, MessageRecord, Run, RunId, Scenario, ScenarioId, StepRecord,
};

use crate::error::DbError;
use crate::memory::MemoryStore;
use crate::postgres::PgStore;

/// A persistence backend for runs, steps, and messages.
pub enum PersistBackend {
    /// `PostgreSQL` via sqlx.
    Postgres(PgStore),
    /// In-process store.
    Memory(MemoryStore),
}

impl PersistBackend {
    /// Create an in-memory backend.
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// Insert a scenario.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn insert_scenario(&self, scenario: &Scenario) -> Result<(), DbError> {
        match self {
            Self::Postgres(store) => store.insert_scenario(scenario).await,
            Self::Memory(store) => store.insert_scenario(scenario),
        }
    }

    /// Load a scenario.
    pub async fn get_scenario(&self, id: ScenarioId) -> Result<Scenario, DbError> {
        match self {
            Self::Postgres(store) => store.get_scenario(id).await,
            Self::Memory(store) => store.get_scenario(id),
        }
    }

    /// Insert a run.
    pub async fn insert_run(&self, run: &Run) -> Result<(), DbError> {
        match self {
            Self::Postgres(store) => store.insert_run(run).await,
            Self::Memory(store) => store.insert_run(run),
        }
    }

    /// Update a run.
    pub async fn update_run(&self, run: &Run) -> Result<(), DbError> {
        match self {
            Self::Postgres(store) => store.update_run(run).await,
            Self::Memory(store) => store.update_run(run),
        }
    }

    /// Load a run.
    pub async fn get_run(&self, id: RunId) -> Result<Run, DbError> {
        match self {
            Self::Postgres(store) => store.get_run(id).await,
            Self::Memory(store) => store.get_run(id),
        }
    }

    /// List runs, newest first.
    pub async fn list_runs(
        &self,
        scenario: Option<ScenarioId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Run>, DbError> {
        match self {
            Self::Postgres(store) => {
                store
                    .list_runs(
                        scenario,
                        i64::try_from(limit).unwrap_or(i64::MAX),
                        i64::try_from(offset).unwrap_or(0),
                    )
                    .await
            }
            Self::Memory(store) => store.list_runs(scenario, limit, offset),
        }
    }

    /// Upsert agent summaries for a run.
    pub async fn upsert_agents(
        &self,
        run_id: RunId,
        agents: &[AgentSummary],
    ) -> Result<(), DbError> {
        match self {
            Self::Postgres(store) => store.upsert_agents(run_id, agents).await,
            Self::Memory(store) => store.upsert_agents(run_id, agents),
        }
    }

    /// Agent summaries for a run.
    pub async fn get_agents(&self, run_id: RunId) -> Result<Vec<AgentSummary>, DbError> {
        match self {
            Self::Postgres(store) => store.get_agents(run_id).await,
            Self::Memory(store) => store.get_agents(run_id),
        }
    }

    /// Persist one step and its messages atomically.
    pub async fn persist_step(
        &self,
        step: &StepRecord,
        messages: &[MessageRecord],
    ) -> Result<(), DbError> {
        match self {
            Self::Postgres(store) => store.persist_step(step, messages).await,
            Self::Memory(store) => store.persist_step(step, messages),
        }
    }

    /// Steps of a run, chronological.
    pub async fn get_steps(
        &self,
        run_id: RunId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StepRecord>, DbError> {
        match self {
            Self::Postgres(store) => {
                store
                    .get_steps(
                        run_id,
                        i64::try_from(limit).unwrap_or(i64::MAX),
                        i64::try_from(offset).unwrap_or(0),
                    )
                    .await
            }
            Self::Memory(store) => store.get_steps(run_id, limit, offset),
        }
    }

    /// Messages of a run, chronological.
    pub async fn get_messages(
        &self,
        run_id: RunId,
        agent: Option<AgentId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageRecord>, DbError> {
        match self {
            Self::Postgres(store) => {
                store
                    .get_messages(
                        run_id,
                        agent,
                        i64::try_from(limit).unwrap_or(i64::MAX),
                        i64::try_from(offset).unwrap_or(0),
                    )
                    .await
            }
            Self::Memory(store) => store.get_messages(run_id, agent, limit, offset),
        }
    }

    /// Reset runs left in `running` to `paused`.
    pub async fn recover_interrupted_runs(&self) -> Result<Vec<RunId>, DbError> {
        match self {
            Self::Postgres(store) => store.recover_interrupted_runs().await,
            Self::Memory(store) => store.recover_interrupted_runs(),
        }
    }
}
