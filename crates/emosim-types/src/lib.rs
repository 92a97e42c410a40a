//! Shared types for the EmotionSim simulation workspace.
//!
//! Every crate in the workspace speaks in these types: strongly-typed
//! identifiers, the closed enums (roles, statuses, actions, events), the
//! scenario template model, run/step/message records, and the agent
//! response schema.
//!
//! # Modules
//!
//! - [`ids`] -- UUID v7 newtypes plus string-keyed location/item ids.
//! - [`enums`] -- roles, statuses, action and message types.
//! - [`persona`] -- Big-Five persona data for human agents.
//! - [`scenario`] -- scenario templates and validation.
//! - [`agent`] -- agent dynamic state and summaries.
//! - [`run`] -- run, step, and message records.
//! - [`response`] -- the structured per-tick agent response.
//! - [`events`] -- event types and the stream envelope.

pub mod agent;
pub mod enums;
pub mod events;
pub mod ids;
pub mod persona;
pub mod response;
pub mod run;
pub mod scenario;

pub use agent::{clamp_vital, AgentDynamicState, AgentSummary, TravelPlan, VITAL_RANGE};
pub use enums::{
    ActionType, AgentRole, ControlAction, ConversationStatus, MessageType, RunStatus, Sentiment,
    TaskStatus,
};
pub use events::{EventEnvelope, EventType};
pub use ids::{
    AgentId, ConversationId, ItemId, LocationId, MessageId, RunId, ScenarioId, TaskId, VoteId,
};
pub use persona::{BehaviorModifiers, BigFive, Persona};
pub use response::{AgentAction, AgentMessage, AgentResponse, StateChanges};
pub use run::{ActionRecord, MessageRecord, MessageTarget, Run, StepMetrics, StepRecord};
pub use scenario::{
    AgentTemplate, DynamicsBound, InitialState, Item, Location, LocationEffects, Scenario,
    ScenarioError, WorldConfig, DISTANCE_RANGE, MAX_HAZARD_LEVEL,
};
