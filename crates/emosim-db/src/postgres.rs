//! `PostgreSQL` backend: connection pool, schema migration, and the
//! queries behind the persistence boundary.
//!
//! A step record and all messages published during that step are written
//! in one transaction; partial persistence of a tick is impossible. On
//! startup, [`PgStore::recover_interrupted_runs`] resets any run left in
//! `running` back to `paused` so it can be resumed from its last
//! persisted step.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use emosim_types::{
    AgentSummary, MessageRecord, Run, RunId, RunStatus, Scenario, ScenarioId, StepRecord,
};

use crate::error::DbError;
use crate::rows::{message_from_row, run_from_row, step_from_row};

/// Connection configuration for `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum pool connections.
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| String::from("postgresql://localhost:5432/emosim")),
            max_connections: 8,
        }
    }
}

/// Schema migration, applied idempotently at startup.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS scenarios (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    config JSONB NOT NULL,
    agent_templates JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS runs (
    id UUID PRIMARY KEY,
    scenario_id UUID NOT NULL REFERENCES scenarios(id),
    status TEXT NOT NULL,
    current_step BIGINT NOT NULL DEFAULT 0,
    max_steps BIGINT,
    seed BIGINT NOT NULL,
    world_state JSONB NOT NULL DEFAULT '{}'::jsonb,
    metrics JSONB NOT NULL DEFAULT '{}'::jsonb,
    evaluation JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL,
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS run_agents (
    id UUID PRIMARY KEY,
    run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    state JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS steps (
    run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    step_index BIGINT NOT NULL,
    world_state JSONB NOT NULL,
    actions JSONB NOT NULL,
    metrics JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (run_id, step_index)
);

CREATE TABLE IF NOT EXISTS messages (
    id UUID PRIMARY KEY,
    run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    from_agent_id UUID,
    from_name TEXT NOT NULL,
    to_target JSONB NOT NULL,
    message_type TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    step_index BIGINT NOT NULL,
    seq BIGINT NOT NULL,
    sent_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_steps_run ON steps (run_id, step_index);
CREATE INDEX IF NOT EXISTS idx_messages_run ON messages (run_id, step_index, seq);
";

/// Serialize a [`RunStatus`] to its wire string.
pub(crate) fn status_to_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Stopped => "stopped",
        RunStatus::Cancelled => "cancelled",
        RunStatus::Error => "error",
    }
}

/// Parse a wire string back into a [`RunStatus`].
pub(crate) fn status_from_str(s: &str) -> Result<RunStatus, DbError> {
    match s {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "paused" => Ok(RunStatus::Paused),
        "completed" => Ok(RunStatus::Completed),
        "stopped" => Ok(RunStatus::Stopped),
        "cancelled" => Ok(RunStatus::Cancelled),
        "error" => Ok(RunStatus::Error),
        other => Err(DbError::Corrupt(format!("unknown run status '{other}'"))),
    }
}

/// The `PostgreSQL`-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run the schema migration.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the connection or migration fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the idempotent schema migration.
    async fn migrate(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::debug!("schema migration applied");
        Ok(())
    }

    /// Insert a scenario.
    pub async fn insert_scenario(&self, scenario: &Scenario) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO scenarios (id, name, description, config, agent_templates)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (id) DO NOTHING",
        )
        .bind(scenario.id.into_inner())
        .bind(&scenario.name)
        .bind(&scenario.description)
        .bind(serde_json::to_value(&scenario.config)?)
        .bind(serde_json::to_value(&scenario.agent_templates)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a scenario.
    pub async fn get_scenario(&self, id: ScenarioId) -> Result<Scenario, DbError> {
        let row = sqlx::query(
            r"SELECT id, name, description, config, agent_templates FROM scenarios WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::ScenarioNotFound(id))?;

        Ok(Scenario {
            id: ScenarioId::from(row.get::<Uuid, _>("id")),
            name: row.get("name"),
            description: row.get("description"),
            config: serde_json::from_value(row.get("config"))?,
            agent_templates: serde_json::from_value(row.get("agent_templates"))?,
        })
    }

    /// Insert a newly allocated run.
    pub async fn insert_run(&self, run: &Run) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO runs (id, scenario_id, status, current_step, max_steps, seed,
                                world_state, metrics, evaluation, created_at, started_at, completed_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(run.id.into_inner())
        .bind(run.scenario_id.into_inner())
        .bind(status_to_str(run.status))
        .bind(i64::try_from(run.current_step).unwrap_or(i64::MAX))
        .bind(run.max_steps.map(|m| i64::try_from(m).unwrap_or(i64::MAX)))
        .bind(run.seed as i64)
        .bind(&run.world_state)
        .bind(&run.metrics)
        .bind(&run.evaluation)
        .bind(run.created_at)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update a run's mutable fields.
    pub async fn update_run(&self, run: &Run) -> Result<(), DbError> {
        let result = sqlx::query(
            r"UPDATE runs SET status = $2, current_step = $3, world_state = $4,
                              metrics = $5, evaluation = $6, started_at = $7, completed_at = $8
              WHERE id = $1",
        )
        .bind(run.id.into_inner())
        .bind(status_to_str(run.status))
        .bind(i64::try_from(run.current_step).unwrap_or(i64::MAX))
        .bind(&run.world_state)
        .bind(&run.metrics)
        .bind(&run.evaluation)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::RunNotFound(run.id));
        }
        Ok(())
    }

    /// Load a run.
    pub async fn get_run(&self, id: RunId) -> Result<Run, DbError> {
        let row = sqlx::query(
            r"SELECT id, scenario_id, status, current_step, max_steps, seed, world_state,
                     metrics, evaluation, created_at, started_at, completed_at
              FROM runs WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::RunNotFound(id))?;
        run_from_row(&row)
    }

    /// List runs, newest first, optionally filtered by scenario.
    pub async fn list_runs(
        &self,
        scenario: Option<ScenarioId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>, DbError> {
        let rows = match scenario {
            Some(scenario_id) => {
                sqlx::query(
                    r"SELECT id, scenario_id, status, current_step, max_steps, seed, world_state,
                             metrics, evaluation, created_at, started_at, completed_at
                      FROM runs WHERE scenario_id = $1
                      ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(scenario_id.into_inner())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"SELECT id, scenario_id, status, current_step, max_steps, seed, world_state,
                             metrics, evaluation, created_at, started_at, completed_at
                      FROM runs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(run_from_row).collect()
    }

    /// Upsert agent summaries for a run.
    pub async fn upsert_agents(
        &self,
        run_id: RunId,
        agents: &[AgentSummary],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for agent in agents {
            sqlx::query(
                r"INSERT INTO run_agents (id, run_id, name, role, is_active, state)
                  VALUES ($1, $2, $3, $4, $5, $6)
                  ON CONFLICT (id) DO UPDATE SET is_active = $5, state = $6",
            )
            .bind(agent.id.into_inner())
            .bind(run_id.into_inner())
            .bind(&agent.name)
            .bind(serde_json::to_value(agent.role)?.as_str().unwrap_or("human").to_owned())
            .bind(agent.is_active)
            .bind(serde_json::to_value(&agent.state)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Agent summaries for a run.
    pub async fn get_agents(&self, run_id: RunId) -> Result<Vec<AgentSummary>, DbError> {
        let rows = sqlx::query(
            r"SELECT id, name, role, is_active, state FROM run_agents WHERE run_id = $1 ORDER BY name",
        )
        .bind(run_id.into_inner())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.get("role");
                Ok(AgentSummary {
                    id: emosim_types::AgentId::from(row.get::<Uuid, _>("id")),
                    name: row.get("name"),
                    role: serde_json::from_value(serde_json::Value::String(role))?,
                    is_active: row.get("is_active"),
                    state: serde_json::from_value(row.get("state"))?,
                })
            })
            .collect()
    }

    /// Persist one step record together with all messages of that step,
    /// atomically.
    pub async fn persist_step(
        &self,
        step: &StepRecord,
        messages: &[MessageRecord],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO steps (run_id, step_index, world_state, actions, metrics, created_at)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (run_id, step_index) DO NOTHING",
        )
        .bind(step.run_id.into_inner())
        .bind(i64::try_from(step.step_index).unwrap_or(i64::MAX))
        .bind(&step.world_state)
        .bind(serde_json::to_value(&step.actions)?)
        .bind(serde_json::to_value(step.metrics)?)
        .bind(step.created_at)
        .execute(&mut *tx)
        .await?;

        for message in messages {
            sqlx::query(
                r"INSERT INTO messages (id, run_id, from_agent_id, from_name, to_target,
                                        message_type, content, metadata, step_index, seq, sent_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                  ON CONFLICT (id) DO NOTHING",
            )
            .bind(message.id.into_inner())
            .bind(message.run_id.into_inner())
            .bind(message.from_agent_id.map(emosim_types::AgentId::into_inner))
            .bind(&message.from_name)
            .bind(serde_json::to_value(&message.to_target)?)
            .bind(
                serde_json::to_value(message.message_type)?
                    .as_str()
                    .unwrap_or("broadcast")
                    .to_owned(),
            )
            .bind(&message.content)
            .bind(serde_json::to_value(&message.metadata)?)
            .bind(i64::try_from(message.step_index).unwrap_or(i64::MAX))
            .bind(i64::try_from(message.seq).unwrap_or(i64::MAX))
            .bind(message.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            run_id = %step.run_id,
            step = step.step_index,
            messages = messages.len(),
            "step persisted"
        );
        Ok(())
    }

    /// Steps of a run, chronological.
    pub async fn get_steps(
        &self,
        run_id: RunId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StepRecord>, DbError> {
        let rows = sqlx::query(
            r"SELECT run_id, step_index, world_state, actions, metrics, created_at
              FROM steps WHERE run_id = $1 ORDER BY step_index LIMIT $2 OFFSET $3",
        )
        .bind(run_id.into_inner())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(step_from_row).collect()
    }

    /// Messages of a run, chronological, optionally filtered by sender.
    pub async fn get_messages(
        &self,
        run_id: RunId,
        agent: Option<emosim_types::AgentId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let rows = match agent {
            Some(agent_id) => {
                sqlx::query(
                    r"SELECT id, run_id, from_agent_id, from_name, to_target, message_type,
                             content, metadata, step_index, seq, sent_at
                      FROM messages WHERE run_id = $1 AND from_agent_id = $2
                      ORDER BY step_index, seq LIMIT $3 OFFSET $4",
                )
                .bind(run_id.into_inner())
                .bind(agent_id.into_inner())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"SELECT id, run_id, from_agent_id, from_name, to_target, message_type,
                             content, metadata, step_index, seq, sent_at
                      FROM messages WHERE run_id = $1
                      ORDER BY step_index, seq LIMIT $2 OFFSET $3",
                )
                .bind(run_id.into_inner())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(message_from_row).collect()
    }

    /// Reset runs left in `running` by a previous process to `paused`.
    /// Returns the affected run ids.
    pub async fn recover_interrupted_runs(&self) -> Result<Vec<RunId>, DbError> {
        let rows = sqlx::query(
            r"UPDATE runs SET status = 'paused' WHERE status = 'running' RETURNING id",
        )
        .fetch_all(&self.pool)
        .await?;
        let ids: Vec<RunId> = rows
            .iter()
            .map(|row| RunId::from(row.get::<Uuid, _>("id")))
            .collect();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "interrupted runs reset to paused");
        }
        Ok(ids)
    }
}

/// Parse a timestamp column that may be null.
pub(crate) fn opt_timestamp(
    row: &sqlx::postgres::PgRow,
    column: &str,
) -> Option<DateTime<Utc>> {
    row.try_get(column).ok()
}
