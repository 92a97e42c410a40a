//! The oracle abstraction: one request in, a token stream plus final text
//! out.
//!
//! Uses enum dispatch instead of trait objects because async methods are
//! not dyn-compatible. Tokens are forwarded to an optional sink as they
//! arrive; they exist for observers only -- the returned text is the
//! authoritative payload (the two may differ when a backend emits
//! thinking tokens or coarse chunks).

use tokio::sync::mpsc;

use crate::backends::{AnthropicBackend, OpenAiBackend};
use crate::error::OracleError;
use crate::scripted::ScriptedOracle;

/// Sink for streamed tokens. The engine forwards each token to the event
/// emitter as a `stream_token` event.
pub type TokenSink = mpsc::Sender<String>;

/// One oracle invocation.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Model identifier from the agent template.
    pub model: String,
    /// System prompt establishing the agent's identity.
    pub system: String,
    /// The assembled per-tick context.
    pub context: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Requesting agent's display name (used by scripted oracles).
    pub agent: String,
    /// Tick of the request (used by scripted oracles).
    pub tick: u64,
}

/// An LLM backend that can answer an [`OracleRequest`].
pub enum LlmOracle {
    /// OpenAI-compatible chat completions API (OpenAI, Ollama, DeepSeek).
    OpenAi(OpenAiBackend),
    /// Anthropic Messages API.
    Anthropic(AnthropicBackend),
    /// Deterministic scripted responses for tests and replays.
    Scripted(ScriptedOracle),
}

impl LlmOracle {
    /// Send a request and return the final response text, forwarding
    /// tokens to `tokens` as they arrive.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Backend`] if the call fails or the response
    /// cannot be extracted.
    pub async fn generate(
        &self,
        request: &OracleRequest,
        tokens: Option<&TokenSink>,
    ) -> Result<String, OracleError> {
        match self {
            Self::OpenAi(backend) => backend.complete(request, tokens).await,
            Self::Anthropic(backend) => backend.complete(request, tokens).await,
            Self::Scripted(backend) => backend.complete(request, tokens).await,
        }
    }

    /// Human-readable backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
            Self::Scripted(_) => "scripted",
        }
    }
}
