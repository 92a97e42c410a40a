//! Deterministic scripted oracle for tests and replays.
//!
//! Responses are keyed by `(agent name, tick)`. Requests with no entry
//! fall back to the default response (an empty, do-nothing response
//! unless overridden). The response text is also streamed word-by-word
//! into the token sink so streaming paths are exercised in tests.

use std::collections::BTreeMap;

use crate::error::OracleError;
use crate::oracle::{OracleRequest, TokenSink};

/// A scripted oracle mapping `(agent, tick)` to canned JSON responses.
#[derive(Debug, Clone)]
pub struct ScriptedOracle {
    responses: BTreeMap<(String, u64), String>,
    default_response: Option<String>,
}

impl ScriptedOracle {
    /// Create a scripted oracle whose default is the empty response
    /// (no actions, no message).
    pub fn new() -> Self {
        Self {
            responses: BTreeMap::new(),
            default_response: Some(String::from("{}")),
        }
    }

    /// Create a scripted oracle with no fallback: unscripted requests
    /// error, which is useful for asserting exactly who gets called.
    pub fn strict() -> Self {
        Self {
            responses: BTreeMap::new(),
            default_response: None,
        }
    }

    /// Script a JSON response for an agent at a tick.
    #[must_use]
    pub fn with_response(
        mut self,
        agent: impl Into<String>,
        tick: u64,
        response: serde_json::Value,
    ) -> Self {
        self.responses
            .insert((agent.into(), tick), response.to_string());
        self
    }

    /// Script the same JSON response for an agent at every tick in a
    /// range.
    #[must_use]
    pub fn with_response_range(
        mut self,
        agent: impl Into<String>,
        ticks: core::ops::RangeInclusive<u64>,
        response: serde_json::Value,
    ) -> Self {
        let agent = agent.into();
        let text = response.to_string();
        for tick in ticks {
            self.responses.insert((agent.clone(), tick), text.clone());
        }
        self
    }

    /// Override the default response.
    #[must_use]
    pub fn with_default(mut self, response: serde_json::Value) -> Self {
        self.default_response = Some(response.to_string());
        self
    }

    /// Answer a request from the script.
    pub(crate) async fn complete(
        &self,
        request: &OracleRequest,
        tokens: Option<&TokenSink>,
    ) -> Result<String, OracleError> {
        let key = (request.agent.clone(), request.tick);
        let text = match self.responses.get(&key) {
            Some(text) => text.clone(),
            None => self
                .default_response
                .clone()
                .ok_or_else(|| OracleError::NotScripted {
                    agent: request.agent.clone(),
                    tick: request.tick,
                })?,
        };

        if let Some(sink) = tokens {
            for word in text.split_inclusive(' ') {
                let _ = sink.send(word.to_owned()).await;
            }
        }

        Ok(text)
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(agent: &str, tick: u64) -> OracleRequest {
        OracleRequest {
            model: String::from("test"),
            system: String::new(),
            context: String::new(),
            temperature: 0.7,
            agent: agent.to_owned(),
            tick,
        }
    }

    #[tokio::test]
    async fn scripted_response_is_returned_for_matching_key() {
        let oracle = ScriptedOracle::new().with_response(
            "Ada",
            1,
            serde_json::json!({"reasoning": "scripted"}),
        );
        let text = oracle.complete(&request("Ada", 1), None).await.expect("text");
        assert!(text.contains("scripted"));
    }

    #[tokio::test]
    async fn unscripted_request_falls_back_to_default() {
        let oracle = ScriptedOracle::new();
        let text = oracle.complete(&request("Ada", 9), None).await.expect("text");
        assert_eq!(text, "{}");
    }

    #[tokio::test]
    async fn strict_oracle_errors_on_unscripted_request() {
        let oracle = ScriptedOracle::strict();
        let result = oracle.complete(&request("Ada", 1), None).await;
        assert!(matches!(result, Err(OracleError::NotScripted { .. })));
    }

    #[tokio::test]
    async fn tokens_concatenate_to_response_text() {
        let oracle = ScriptedOracle::new().with_response(
            "Ada",
            1,
            serde_json::json!({"reasoning": "two words"}),
        );
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let text = oracle
            .complete(&request("Ada", 1), Some(&tx))
            .await
            .expect("text");
        drop(tx);

        let mut streamed = String::new();
        while let Some(token) = rx.recv().await {
            streamed.push_str(&token);
        }
        assert_eq!(streamed, text);
    }

    #[tokio::test]
    async fn range_scripting_covers_every_tick() {
        let oracle = ScriptedOracle::strict().with_response_range(
            "Ada",
            1..=3,
            serde_json::json!({}),
        );
        for tick in 1..=3 {
            assert!(oracle.complete(&request("Ada", tick), None).await.is_ok());
        }
        assert!(oracle.complete(&request("Ada", 4), None).await.is_err());
    }
}
