// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invokes the LLM CLI as a subprocess in streaming mode and folds its
//! newline-delimited JSON protocol into a single result (`SPEC_FULL.md`
//! §4.6). The variable this module exists to strip is `CLAUDECODE`: without
//! it the subprocess believes it is itself running inside an agent session
//! and changes its own behavior.

use crate::event::{parse_event_line, ContentItem, LlmEvent, ResultChunk};
use async_trait::async_trait;
use mesh_core::CoordinationError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

/// Environment variable the wrapped CLI uses to detect it's being invoked
/// from within an existing agent session; must never be inherited by the
/// subprocess we spawn.
const INHERITED_SESSION_ENV: &str = "CLAUDECODE";

#[derive(Debug, Clone)]
pub struct LlmInvocation {
    pub binary: String,
    pub prompt: String,
    pub system_prompt_file: Option<String>,
    pub model: Option<String>,
    pub resume_session_id: Option<String>,
    pub timeout: Duration,
}

/// One observed tool call, surfaced to a caller-supplied event sink for
/// progress logging. Mirrors the original's per-tool detail extraction.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Tool { name: String, detail: String },
    Text { content: String },
}

pub trait EventSink: Send {
    fn on_event(&mut self, event: AgentEvent);
}

impl EventSink for () {
    fn on_event(&mut self, _event: AgentEvent) {}
}

impl<F: FnMut(AgentEvent) + Send> EventSink for F {
    fn on_event(&mut self, event: AgentEvent) {
        self(event)
    }
}

/// Executes one LLM CLI invocation. Abstracted so the worker/verifier/
/// summarizer loop in [`crate::runner`] can be driven by a scripted fake in
/// daemon tests, the same shape as `DirectoryClient`/`DevBoxProvisioner` in
/// the adjacent crates.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &LlmInvocation,
        sink: &mut dyn EventSink,
    ) -> Result<ResultChunk, CoordinationError>;
}

/// Spawns the real LLM CLI as a subprocess.
#[derive(Debug, Clone, Default)]
pub struct SubprocessAgentRunner;

#[async_trait]
impl AgentRunner for SubprocessAgentRunner {
    async fn run(
        &self,
        invocation: &LlmInvocation,
        sink: &mut dyn EventSink,
    ) -> Result<ResultChunk, CoordinationError> {
        run_llm(invocation, sink).await
    }
}

/// Runs the LLM CLI in streaming mode and returns the terminal `result`
/// chunk. Falls back to scanning captured lines backwards for the last
/// `result`-typed line if the process exits without emitting one.
async fn run_llm(
    invocation: &LlmInvocation,
    sink: &mut dyn EventSink,
) -> Result<ResultChunk, CoordinationError> {
    let mut command = Command::new(&invocation.binary);
    command
        .arg("--print")
        .arg("--output-format")
        .arg("stream-json")
        .arg("--verbose")
        .arg("--include-partial-messages")
        .arg("--dangerously-skip-permissions");

    if let Some(session_id) = &invocation.resume_session_id {
        command.arg("--resume").arg(session_id);
    }
    if let Some(system_prompt_file) = &invocation.system_prompt_file {
        command.arg("--system-prompt-file").arg(system_prompt_file);
    }
    if let Some(model) = &invocation.model {
        command.arg("--model").arg(model);
    }
    command.arg("-p").arg(&invocation.prompt);

    command.env_remove(INHERITED_SESSION_ENV);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| CoordinationError::LlmSubprocessFailure(format!("spawn failed: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CoordinationError::LlmSubprocessFailure("no stdout pipe".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();

    let mut captured_lines = Vec::new();
    let mut result: Option<ResultChunk> = None;

    let read_loop = async {
        while let Ok(Some(line)) = lines.next_line().await {
            captured_lines.push(line.clone());
            match parse_event_line(&line) {
                Some(LlmEvent::Assistant { message }) => {
                    for item in message.content {
                        match item {
                            ContentItem::ToolUse { name, input } => {
                                sink.on_event(AgentEvent::Tool {
                                    detail: tool_detail(&name, &input),
                                    name,
                                });
                            }
                            ContentItem::Text { text } => {
                                sink.on_event(AgentEvent::Text { content: text });
                            }
                            ContentItem::Other => {}
                        }
                    }
                }
                Some(LlmEvent::Result(chunk)) => {
                    result = Some(*chunk);
                    break;
                }
                Some(LlmEvent::System) | None => {}
            }
        }
    };

    if timeout(invocation.timeout, read_loop).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
        tracing::warn!(
            binary = %invocation.binary,
            timeout_secs = invocation.timeout.as_secs(),
            "llm subprocess hard-killed after exceeding timeout"
        );
        return Err(CoordinationError::LlmSubprocessFailure(format!(
            "subprocess exceeded {}s timeout",
            invocation.timeout.as_secs()
        )));
    }

    let status = child
        .wait()
        .await
        .map_err(|e| CoordinationError::LlmSubprocessFailure(format!("wait failed: {e}")))?;

    if let Some(chunk) = result {
        if chunk.is_error {
            tracing::warn!(session_id = %chunk.session_id, "llm subprocess reported is_error=true");
        }
        return Ok(chunk);
    }

    tracing::warn!(
        binary = %invocation.binary,
        status = %status,
        "llm subprocess exited without a result chunk; scanning captured output"
    );

    // Primary signal missing: scan captured lines backwards for a result chunk.
    for line in captured_lines.iter().rev() {
        if let Some(LlmEvent::Result(chunk)) = parse_event_line(line) {
            return Ok(*chunk);
        }
    }

    if status.success() {
        Err(CoordinationError::LlmSubprocessFailure(
            "subprocess exited 0 without emitting a result chunk".to_string(),
        ))
    } else {
        Err(CoordinationError::LlmSubprocessFailure(format!(
            "subprocess exited with {status}"
        )))
    }
}

fn tool_detail(name: &str, input: &serde_json::Value) -> String {
    match name {
        "Write" | "Read" | "Edit" => input
            .get("file_path")
            .and_then(serde_json::Value::as_str)
            .and_then(|p| p.rsplit('/').next())
            .unwrap_or("?")
            .to_string(),
        "Bash" => input
            .get("command")
            .and_then(serde_json::Value::as_str)
            .map(|c| c.chars().take(50).collect())
            .unwrap_or_default(),
        "WebSearch" => input
            .get("query")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("?")
            .to_string(),
        "WebFetch" => input
            .get("url")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("?")
            .to_string(),
        "Glob" | "Grep" => input
            .get("pattern")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("?")
            .to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_tool_detail_truncates_to_fifty_chars() {
        let input = serde_json::json!({"command": "a".repeat(100)});
        assert_eq!(tool_detail("Bash", &input).len(), 50);
    }

    #[test]
    fn write_tool_detail_is_basename() {
        let input = serde_json::json!({"file_path": "/a/b/c.md"});
        assert_eq!(tool_detail("Write", &input), "c.md");
    }

    #[test]
    fn unknown_tool_detail_is_empty() {
        let input = serde_json::json!({});
        assert_eq!(tool_detail("SomeOtherTool", &input), "");
    }
}
