//! Error types for oracle backends and parsing.

/// Errors raised by the oracle layer.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The HTTP call failed or the response could not be extracted.
    #[error("oracle backend error: {0}")]
    Backend(String),

    /// The response text could not be parsed into the agent schema.
    #[error("oracle parse error: {0}")]
    Parse(String),

    /// A scripted oracle had no entry and no default for the request.
    #[error("no scripted response for agent '{agent}' at tick {tick}")]
    NotScripted {
        /// The requesting agent's name.
        agent: String,
        /// The tick of the request.
        tick: u64,
    },
}
