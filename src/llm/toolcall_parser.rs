//! Best-effort JSON-in-text tool call parser (§4.1, §9).
//!
//! Some models (particularly smaller local ones through Ollama) occasionally
//! emit a tool call as JSON embedded in plain text instead of using the
//! provider's structured tool-calling field. This is a legacy compatibility
//! shim, isolated from the main completion path and exercised only when a
//! provider's structured `tool_calls` come back empty but the content looks
//! like it was trying to call one.
//!
//! Recognized shapes, in order of preference:
//! 1. A bare JSON object: `{"name": "...", "arguments": {...}}`
//! 2. The same, wrapped in a markdown code fence (```json ... ```` or ``` ... ```)
//! 3. A `function:` wrapper: `{"function": {"name": "...", "arguments": {...}}}`

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::types::ToolCall;

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

fn bare_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// Try to recover a single tool call from free-text model output. Returns
/// `None` if nothing resembling a tool call can be found.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    if let Some(caps) = code_fence_re().captures(text) {
        if let Some(call) = try_parse_json(&caps[1]) {
            return Some(call);
        }
    }
    if let Some(m) = bare_object_re().find(text) {
        if let Some(call) = try_parse_json(m.as_str()) {
            return Some(call);
        }
    }
    None
}

fn try_parse_json(candidate: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    extract_from_value(&value)
}

fn extract_from_value(value: &Value) -> Option<ToolCall> {
    // `{"function": {"name": ..., "arguments": ...}}` wrapper.
    if let Some(func) = value.get("function") {
        return build_call(func);
    }
    // Bare `{"name": ..., "arguments": ...}`.
    if value.get("name").is_some() {
        return build_call(value);
    }
    None
}

fn build_call(value: &Value) -> Option<ToolCall> {
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = value.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        arguments,
    })
}
