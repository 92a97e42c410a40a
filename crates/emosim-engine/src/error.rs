//! Engine error types.

use emosim_types::{ControlAction, RunId, RunStatus, ScenarioError};

/// Errors raised by the engine and the run manager.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The scenario failed validation.
    #[error("scenario validation failed: {0}")]
    Scenario(#[from] ScenarioError),

    /// A control command is illegal in the run's current status.
    #[error("cannot apply {action:?} while run is {from:?}")]
    InvalidTransition {
        /// Current status.
        from: RunStatus,
        /// The rejected command.
        action: ControlAction,
    },

    /// The requested run is not managed here.
    #[error("run {0} not found")]
    RunNotFound(RunId),

    /// Persistence failed beyond the retry budget.
    #[error("persistence failed: {0}")]
    Persistence(#[from] emosim_db::DbError),

    /// A world invariant was violated (fatal).
    #[error("world invariant violated: {0}")]
    World(#[from] emosim_world::WorldError),
}
