//! Row-to-DTO conversion for the `PostgreSQL` backend.

use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use emosim_types::{
    AgentId, MessageId, MessageRecord, Run, RunId, ScenarioId, StepRecord,
};

use crate::error::DbError;
use crate::postgres::{opt_timestamp, status_from_str};

/// Convert a `runs` row into a [`Run`].
pub(crate) fn run_from_row(row: &PgRow) -> Result<Run, DbError> {
    let status: String = row.get("status");
    Ok(Run {
        id: RunId::from(row.get::<Uuid, _>("id")),
        scenario_id: ScenarioId::from(row.get::<Uuid, _>("scenario_id")),
        status: status_from_str(&status)?,
        current_step: row.get::<i64, _>("current_step").max(0) as u64,
        max_steps: row
            .get::<Option<i64>, _>("max_steps")
            .map(|m| m.max(0) as u64),
        seed: row.get::<i64, _>("seed") as u64,
        world_state: row.get("world_state"),
        metrics: row.get("metrics"),
        evaluation: row.get("evaluation"),
        created_at: row.get("created_at"),
        started_at: opt_timestamp(row, "started_at"),
        completed_at: opt_timestamp(row, "completed_at"),
    })
}

/// Convert a `steps` row into a [`StepRecord`].
pub(crate) fn step_from_row(row: &PgRow) -> Result<StepRecord, DbError> {
    Ok(StepRecord {
        run_id: RunId::from(row.get::<Uuid, _>("run_id")),
        step_index: row.get::<i64, _>("step_index").max(0) as u64,
        world_state: row.get("world_state"),
        actions: serde_json::from_value(row.get("actions"))?,
        metrics: serde_json::from_value(row.get("metrics"))?,
        created_at: row.get("created_at"),
    })
}

/// Convert a `messages` row into a [`MessageRecord`].
pub(crate) fn message_from_row(row: &PgRow) -> Result<MessageRecord, DbError> {
    let message_type: String = row.get("message_type");
    Ok(MessageRecord {
        id: MessageId::from(row.get::<Uuid, _>("id")),
        run_id: RunId::from(row.get::<Uuid, _>("run_id")),
        from_agent_id: row
            .get::<Option<Uuid>, _>("from_agent_id")
            .map(AgentId::from),
        from_name: row.get("from_name"),
        to_target: serde_json::from_value(row.get("to_target"))?,
        message_type: serde_json::from_value(serde_json::Value::String(message_type))?,
        content: row.get("content"),
        metadata: serde_json::from_value(row.get("metadata"))?,
        step_index: row.get::<i64, _>("step_index").max(0) as u64,
        seq: row.get::<i64, _>("seq").max(0) as u64,
        timestamp: row.get("sent_at"),
    })
}
