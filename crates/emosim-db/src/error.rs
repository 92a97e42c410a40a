//! Error types for the persistence layer.

use emosim_types::{RunId, ScenarioId};

/// Errors raised by the persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization of a persisted value failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested run does not exist.
    #[error("run {0} not found")]
    RunNotFound(RunId),

    /// The requested scenario does not exist.
    #[error("scenario {0} not found")]
    ScenarioNotFound(ScenarioId),

    /// An injected failure from the in-memory backend (test hook).
    #[error("injected persistence failure")]
    Injected,

    /// A stored value did not round-trip through its wire format.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}
