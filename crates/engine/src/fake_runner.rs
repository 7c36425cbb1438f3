// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A scripted [`AgentRunner`] double: each call to `run` pops the next
//! queued response, so daemon tests can drive the worker/verifier loop
//! through a fixed sequence of phase outcomes without a real subprocess.

use crate::event::ResultChunk;
use crate::subprocess::{AgentRunner, EventSink, LlmInvocation};
use async_trait::async_trait;
use mesh_core::CoordinationError;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub struct FakeAgentRunner {
    responses: Mutex<VecDeque<Result<ResultChunk, CoordinationError>>>,
}

impl FakeAgentRunner {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues the next response `run` will return, in call order.
    pub fn push(&self, response: Result<ResultChunk, CoordinationError>) {
        self.responses.lock().push_back(response);
    }

    pub fn push_result(&self, result_text: impl Into<String>) {
        self.push(Ok(ResultChunk {
            result: result_text.into(),
            ..Default::default()
        }));
    }
}

impl Default for FakeAgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRunner for FakeAgentRunner {
    async fn run(
        &self,
        _invocation: &LlmInvocation,
        _sink: &mut dyn EventSink,
    ) -> Result<ResultChunk, CoordinationError> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CoordinationError::LlmSubprocessFailure(
                "FakeAgentRunner exhausted its scripted responses".to_string(),
            )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> LlmInvocation {
        LlmInvocation {
            binary: "fake".to_string(),
            prompt: "do it".to_string(),
            system_prompt_file: None,
            model: None,
            resume_session_id: None,
            timeout: std::time::Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn returns_queued_responses_in_order() {
        let runner = FakeAgentRunner::new();
        runner.push_result("first");
        runner.push_result("second");

        let mut sink = ();
        let first = runner.run(&invocation(), &mut sink).await.unwrap();
        let second = runner.run(&invocation(), &mut sink).await.unwrap();
        assert_eq!(first.result, "first");
        assert_eq!(second.result, "second");
    }

    #[tokio::test]
    async fn exhausted_queue_returns_a_subprocess_failure() {
        let runner = FakeAgentRunner::new();
        let mut sink = ();
        let err = runner.run(&invocation(), &mut sink).await.unwrap_err();
        assert!(matches!(err, CoordinationError::LlmSubprocessFailure(_)));
    }
}
