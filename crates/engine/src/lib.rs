// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The autonomous-agent engine: drives a task through worker, verifier, and
//! summarizer phases by shelling out to the LLM CLI, and writes the
//! resulting session-folder artifacts (`SPEC_FULL.md` §4.5/§4.6).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod event;
mod phases;
mod runner;
mod session;
mod stats;
mod subprocess;
mod verdict;

#[cfg(any(test, feature = "test-support"))]
mod fake_runner;
#[cfg(any(test, feature = "test-support"))]
pub use fake_runner::FakeAgentRunner;

pub use event::{parse_event_line, AssistantMessage, ContentItem, LlmEvent, ModelUsage, ResultChunk, Usage};
pub use phases::{run_summarizer_phase, run_verifier_phase, run_worker_phase, WorkerOutcome, MAX_ITERATIONS};
pub use runner::{run_task_loop, CancellationCheck, LoopResult, TaskLoopParams, TerminalOutcome};
pub use session::{
    build_session_summary, capture_git_history, render_session_log, write_result_and_transcript,
    write_session_log, write_session_summary_file, write_task_prompt_files, PhaseSummary,
    SessionSummary, GIT_LOG_TIMEOUT,
};
pub use stats::{extract_phase_stats, merge_phase_stats, AccumulatedStats, ModelStats, PhaseStats, TokenStats};
pub use subprocess::{AgentEvent, AgentRunner, EventSink, LlmInvocation, SubprocessAgentRunner};
pub use verdict::{read_verdict, Verdict, VerdictOutcome, VERDICT_FILE_NAME};
