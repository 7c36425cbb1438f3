// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The LLM CLI's newline-delimited streaming JSON protocol (`SPEC_FULL.md`
//! §4.6). Unknown fields are tolerated; a line that doesn't parse as one of
//! these three shapes is skipped rather than treated as fatal.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum LlmEvent {
    System,
    Assistant { message: AssistantMessage },
    Result(Box<ResultChunk>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultChunk {
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub duration_api_ms: u64,
    #[serde(default)]
    pub num_turns: u64,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, rename = "modelUsage")]
    pub model_usage: HashMap<String, ModelUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelUsage {
    #[serde(default, rename = "costUSD")]
    pub cost_usd: f64,
    #[serde(default, rename = "inputTokens")]
    pub input_tokens: u64,
    #[serde(default, rename = "outputTokens")]
    pub output_tokens: u64,
}

/// Attempts to parse a single line of subprocess stdout as an `LlmEvent`.
/// Malformed or unrecognized lines are skipped, not fatal, matching the
/// original line-by-line tolerant scan. Dispatches on the `type` field by
/// hand rather than via a tagged-enum derive, since a `system` chunk's
/// payload varies and should be ignored rather than strictly validated.
pub fn parse_event_line(line: &str) -> Option<LlmEvent> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    match value.get("type").and_then(serde_json::Value::as_str)? {
        "system" => Some(LlmEvent::System),
        "assistant" => {
            let message: AssistantMessage =
                serde_json::from_value(value.get("message")?.clone()).ok()?;
            Some(LlmEvent::Assistant { message })
        }
        "result" => {
            let chunk: ResultChunk = serde_json::from_value(value).ok()?;
            Some(LlmEvent::Result(Box::new(chunk)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assistant_tool_use() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"a.md"}}]}}"#;
        match parse_event_line(line).unwrap() {
            LlmEvent::Assistant { message } => {
                assert_eq!(message.content.len(), 1);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn parses_result_chunk_with_usage() {
        let line = r#"{"type":"result","is_error":false,"result":"done","session_id":"s1","total_cost_usd":0.5,"duration_ms":100,"duration_api_ms":80,"num_turns":3,"usage":{"input_tokens":10,"output_tokens":20},"modelUsage":{"model-a":{"costUSD":0.5,"inputTokens":10,"outputTokens":20}}}"#;
        match parse_event_line(line).unwrap() {
            LlmEvent::Result(chunk) => {
                assert_eq!(chunk.session_id, "s1");
                assert_eq!(chunk.usage.input_tokens, 10);
                assert_eq!(chunk.model_usage.len(), 1);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn garbage_line_returns_none() {
        assert!(parse_event_line("not json").is_none());
    }

    #[test]
    fn system_line_ignored_but_parses() {
        assert!(matches!(
            parse_event_line(r#"{"type":"system","subtype":"init"}"#).unwrap(),
            LlmEvent::System
        ));
    }
}
