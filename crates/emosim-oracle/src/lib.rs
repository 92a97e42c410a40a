//! LLM oracle layer for EmotionSim.
//!
//! The engine treats any text-producing backend as an abstract oracle:
//! `(system, context, temperature)` in, a token stream plus final text
//! out. This crate provides the HTTP backends (OpenAI-compatible with SSE
//! streaming, Anthropic), a deterministic scripted oracle for tests, and
//! the parser that turns raw text into the typed agent response.
//!
//! # Modules
//!
//! - [`oracle`] -- request type and the enum-dispatch [`LlmOracle`].
//! - [`backends`] -- HTTP backends.
//! - [`scripted`] -- the deterministic scripted oracle.
//! - [`parse`] -- multi-strategy response parsing.
//! - [`error`] -- shared error type.

pub mod backends;
pub mod error;
pub mod oracle;
pub mod parse;
pub mod scripted;

pub use backends::{AnthropicBackend, BackendConfig, OpenAiBackend};
pub use error::OracleError;
pub use oracle::{LlmOracle, OracleRequest, TokenSink};
pub use parse::parse_agent_response;
pub use scripted::ScriptedOracle;
