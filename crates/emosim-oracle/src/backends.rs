//! HTTP oracle backends.
//!
//! The OpenAI-compatible backend speaks the chat completions API and
//! streams SSE deltas when a token sink is attached. The Anthropic backend
//! speaks the Messages API; it does not stream -- when a sink is attached
//! the full text is forwarded as one chunk (tokens are for observers only,
//! the returned text stays authoritative either way).

use futures::StreamExt;

use crate::error::OracleError;
use crate::oracle::{OracleRequest, TokenSink};

/// Configuration for an HTTP oracle backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://localhost:11434/v1` or
    /// `https://api.anthropic.com/v1`.
    pub api_url: String,
    /// API key; ignored by servers that do not check it.
    pub api_key: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: String::from("http://localhost:11434/v1"),
            api_key: String::from("ollama"),
            max_tokens: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

/// Backend for OpenAI-compatible chat completions APIs.
///
/// Works with OpenAI, Ollama, and DeepSeek endpoints. Sends requests to
/// `{api_url}/chat/completions`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Send a request; streams deltas into `tokens` when attached.
    pub(crate) async fn complete(
        &self,
        request: &OracleRequest,
        tokens: Option<&TokenSink>,
    ) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.config.api_url);
        let streaming = tokens.is_some();

        let body = serde_json::json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.context}
            ],
            "temperature": request.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": {"type": "json_object"},
            "stream": streaming,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unable to read error body"));
            return Err(OracleError::Backend(format!(
                "server returned {status}: {error_body}"
            )));
        }

        if let Some(sink) = tokens {
            return consume_sse_stream(response, sink).await;
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::Backend(format!("response parse failed: {e}")))?;
        extract_chat_content(&json)
    }
}

/// Read an SSE stream of chat completion chunks, forwarding each delta to
/// the sink and accumulating the full text.
async fn consume_sse_stream(
    response: reqwest::Response,
    sink: &TokenSink,
) -> Result<String, OracleError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut collected = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| OracleError::Backend(format!("stream read failed: {e}")))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // SSE events are newline-delimited; process complete lines only.
        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            let line = line.trim();
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() || payload == "[DONE]" {
                continue;
            }
            let Ok(json) = serde_json::from_str::<serde_json::Value>(payload) else {
                continue;
            };
            if let Some(delta) = json
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(serde_json::Value::as_str)
            {
                if !delta.is_empty() {
                    collected.push_str(delta);
                    // A dropped receiver means the observer went away;
                    // generation still completes.
                    let _ = sink.send(delta.to_owned()).await;
                }
            }
        }
    }

    if collected.is_empty() {
        return Err(OracleError::Backend(String::from(
            "stream produced no content",
        )));
    }
    Ok(collected)
}

/// Extract the text content from a chat completions response.
fn extract_chat_content(json: &serde_json::Value) -> Result<String, OracleError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            OracleError::Backend(String::from(
                "response missing choices[0].message.content",
            ))
        })
}

// ---------------------------------------------------------------------------
// Anthropic Messages API backend
// ---------------------------------------------------------------------------

/// Backend for the Anthropic Messages API.
///
/// Anthropic differs from the chat completions shape: `x-api-key` header,
/// top-level `system` field, and `content[0].text` in the response.
pub struct AnthropicBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Send a request. The full text is forwarded as one chunk when a
    /// sink is attached.
    pub(crate) async fn complete(
        &self,
        request: &OracleRequest,
        tokens: Option<&TokenSink>,
    ) -> Result<String, OracleError> {
        let url = format!("{}/messages", self.config.api_url);

        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": self.config.max_tokens,
            "system": request.system,
            "temperature": request.temperature,
            "messages": [
                {"role": "user", "content": request.context}
            ]
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unable to read error body"));
            return Err(OracleError::Backend(format!(
                "server returned {status}: {error_body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::Backend(format!("response parse failed: {e}")))?;
        let text = extract_anthropic_content(&json)?;

        if let Some(sink) = tokens {
            let _ = sink.send(text.clone()).await;
        }
        Ok(text)
    }
}

/// Extract the text content from an Anthropic Messages API response.
fn extract_anthropic_content(json: &serde_json::Value) -> Result<String, OracleError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| OracleError::Backend(String::from("response missing content[0].text")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_chat_content_valid() {
        let json = serde_json::json!({
            "choices": [{
                "message": {"content": "{\"actions\": []}"}
            }]
        });
        assert_eq!(
            extract_chat_content(&json).expect("content"),
            "{\"actions\": []}"
        );
    }

    #[test]
    fn extract_chat_content_missing_is_error() {
        let json = serde_json::json!({"choices": []});
        assert!(extract_chat_content(&json).is_err());
    }

    #[test]
    fn extract_anthropic_content_valid() {
        let json = serde_json::json!({
            "content": [{"type": "text", "text": "hello"}]
        });
        assert_eq!(extract_anthropic_content(&json).expect("content"), "hello");
    }

    #[test]
    fn extract_anthropic_content_missing_is_error() {
        let json = serde_json::json!({"content": []});
        assert!(extract_anthropic_content(&json).is_err());
    }
}
