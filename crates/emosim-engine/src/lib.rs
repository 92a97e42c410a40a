//! The EmotionSim simulation engine.
//!
//! One engine drives one run: a deterministic, controllable tick loop
//! over LLM-backed agents. The engine exclusively owns the world state,
//! agent dynamic states, message bus, conversation manager, cooperation
//! coordinator, step counter, and run status; observers hold read-only
//! views through the event stream and the persisted records.
//!
//! # Modules
//!
//! - [`control`] -- pause/resume/stop/step via atomics and [`tokio::sync::Notify`].
//! - [`emitter`] -- event fan-out with per-subscriber buffers and
//!   block-don't-drop backpressure.
//! - [`core`] -- the engine-owned run state.
//! - [`actions`] -- action execution with role guards.
//! - [`engine`] -- the tick loop and lifecycle.
//! - [`manager`] -- the control API (create/control/query/subscribe).
//! - [`error`] -- shared error type.

pub mod actions;
pub mod control;
pub mod core;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod manager;

pub use control::{EngineControl, WaitOutcome};
pub use core::RunCore;
pub use emitter::{EventEmitter, EventStream, DEFAULT_BUFFER};
pub use engine::{EngineConfig, SimulationEngine};
pub use error::EngineError;
pub use manager::{Page, RunManager};
