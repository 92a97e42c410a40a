//! Parsing oracle output into the typed agent response.
//!
//! The oracle is untrusted: raw text arrives that is hopefully JSON.
//! Several recovery strategies run in order before giving up:
//!
//! 1. Direct `serde_json` deserialization.
//! 2. Extraction from a markdown code block.
//! 3. Trailing-comma stripping, plain and inside a code block.
//!
//! If nothing parses, non-empty text becomes a broadcast message (the
//! agent said *something*, it just was not structured); empty text becomes
//! the do-nothing response. Individual malformed actions are skipped
//! without discarding the rest of the response.

use std::collections::BTreeMap;

use tracing::warn;

use emosim_types::{AgentAction, AgentMessage, AgentResponse, MessageType, StateChanges};

/// Parse an oracle response string into a validated [`AgentResponse`].
pub fn parse_agent_response(raw: &str) -> AgentResponse {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return AgentResponse::empty();
    }

    if let Some(response) = try_strategies(trimmed) {
        return response;
    }

    warn!(raw = trimmed, "unstructured oracle output, treating as broadcast message");
    AgentResponse {
        actions: Vec::new(),
        message: Some(AgentMessage {
            content: trimmed.to_owned(),
            to_target: String::from("broadcast"),
            message_type: MessageType::Broadcast,
            metadata: BTreeMap::new(),
        }),
        state_changes: StateChanges::default(),
        reasoning: String::new(),
    }
}

/// Run the JSON recovery strategies in order.
fn try_strategies(trimmed: &str) -> Option<AgentResponse> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Some(convert(value));
    }

    if let Some(inner) = extract_json_from_codeblock(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(inner) {
            return Some(convert(value));
        }
        let cleaned = strip_trailing_commas(inner);
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) {
            return Some(convert(value));
        }
    }

    let cleaned = strip_trailing_commas(trimmed);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) {
        return Some(convert(value));
    }

    None
}

/// Convert a parsed JSON value into the typed response, skipping
/// malformed parts instead of failing the whole response.
fn convert(value: serde_json::Value) -> AgentResponse {
    let mut response = AgentResponse::empty();

    if let Some(actions) = value.get("actions").and_then(serde_json::Value::as_array) {
        for raw_action in actions {
            match parse_action(raw_action) {
                Some(action) => response.actions.push(action),
                None => warn!(action = %raw_action, "skipping malformed action"),
            }
        }
    }

    if let Some(raw_message) = value.get("message") {
        if !raw_message.is_null() {
            match serde_json::from_value::<AgentMessage>(raw_message.clone()) {
                Ok(message) => response.message = Some(message),
                Err(e) => warn!(error = %e, "skipping malformed message"),
            }
        }
    }

    if let Some(raw_changes) = value.get("state_changes") {
        match serde_json::from_value::<StateChanges>(raw_changes.clone()) {
            Ok(changes) => response.state_changes = changes,
            Err(e) => warn!(error = %e, "skipping malformed state_changes"),
        }
    }

    if let Some(reasoning) = value.get("reasoning").and_then(serde_json::Value::as_str) {
        response.reasoning = reasoning.to_owned();
    }

    response
}

/// Parse one action value, normalizing the `action_type` spelling first
/// (models like to emit `"Move"`, `"JOIN CONVERSATION"`, etc.).
fn parse_action(raw: &serde_json::Value) -> Option<AgentAction> {
    let mut candidate = raw.clone();
    if let Some(kind) = candidate.get("action_type").and_then(serde_json::Value::as_str) {
        let normalized = kind.trim().to_lowercase().replace([' ', '-'], "_");
        if let Some(obj) = candidate.as_object_mut() {
            obj.insert(
                String::from("action_type"),
                serde_json::Value::String(normalized),
            );
        }
    }
    serde_json::from_value::<AgentAction>(candidate).ok()
}

/// Extract the contents of the first markdown code block, if any.
fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip a language tag like ```json
    let body_start = after_fence.find('\n').map_or(0, |i| i + 1);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Remove trailing commas before `}` or `]`.
fn strip_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            // Look ahead past whitespace for a closing bracket.
            let mut lookahead = chars.clone();
            let mut skipped = false;
            while let Some(&next) = lookahead.peek() {
                if next.is_whitespace() {
                    lookahead.next();
                } else {
                    skipped = matches!(next, '}' | ']');
                    break;
                }
            }
            if skipped {
                continue;
            }
        }
        result.push(c);
    }
    result
}
