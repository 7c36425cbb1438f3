// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The top-level worker/verifier/summarizer iteration loop (`SPEC_FULL.md`
//! §4.5/§4.6). Owns only phase sequencing and stats accumulation; writing
//! session-folder artifacts for the terminal outcome is the caller's job
//! (see [`crate::session`]) so this loop stays free of I/O policy concerns.

use crate::phases::{run_summarizer_phase, run_verifier_phase, run_worker_phase, WorkerOutcome, MAX_ITERATIONS};
use crate::session::PhaseSummary;
use crate::stats::{merge_phase_stats, AccumulatedStats};
use crate::subprocess::{AgentRunner, EventSink};
use async_trait::async_trait;
use mesh_core::CoordinationError;
use std::path::Path;
use std::time::Duration;

/// Polled before every iteration and again at verification entry
/// (`SPEC_FULL.md` §5 Cancellation). Implemented by the daemon crate against
/// the directory store's task row.
#[async_trait]
pub trait CancellationCheck: Send + Sync {
    async fn is_canceled(&self) -> Result<bool, CoordinationError>;
}

#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    Completed { summary: String },
    WaitingForInput { reason: String, summary: String },
    Failed { reason: String },
    Canceled,
}

pub struct TaskLoopParams<'a> {
    pub binary: &'a str,
    pub work_dir: &'a Path,
    pub task_name: &'a str,
    pub verification_file_name: &'a str,
    pub phase_timeout: Duration,
    pub max_iterations: u32,
    pub file_links: &'a [(String, String)],
}

pub struct LoopResult {
    pub outcome: TerminalOutcome,
    pub accumulated: AccumulatedStats,
    pub phases: Vec<PhaseSummary>,
    pub last_worker_output: String,
}

impl Default for TaskLoopParams<'_> {
    fn default() -> Self {
        Self {
            binary: "",
            work_dir: Path::new("."),
            task_name: "TASK.md",
            verification_file_name: "VERIFICATION.md",
            phase_timeout: Duration::from_secs(3600),
            max_iterations: MAX_ITERATIONS,
            file_links: &[],
        }
    }
}

/// Runs the worker/verifier/summarizer loop to completion. `session_id` is
/// threaded through so each phase resumes the prior phase's conversation
/// once one has been established.
pub async fn run_task_loop(
    params: &TaskLoopParams<'_>,
    runner: &dyn AgentRunner,
    cancellation: &dyn CancellationCheck,
    sink: &mut dyn EventSink,
) -> Result<LoopResult, CoordinationError> {
    let mut accumulated = AccumulatedStats::default();
    let mut phases = Vec::new();
    let mut verifier_feedback: Option<String> = None;
    let mut session_id: Option<String> = None;
    let mut last_worker_output = String::new();

    for iteration in 1..=params.max_iterations {
        if cancellation.is_canceled().await? {
            return Ok(LoopResult {
                outcome: TerminalOutcome::Canceled,
                accumulated,
                phases,
                last_worker_output,
            });
        }

        let (worker_outcome, worker_stats) = run_worker_phase(
            runner,
            params.binary,
            params.work_dir,
            params.task_name,
            verifier_feedback.as_deref(),
            params.phase_timeout,
            session_id.clone(),
            sink,
        )
        .await?;
        if !worker_stats.session_id.is_empty() {
            session_id = Some(worker_stats.session_id.clone());
        }
        merge_phase_stats(&mut accumulated, &worker_stats);
        phases.push(PhaseSummary {
            phase: format!("worker_{iteration}"),
            cost_usd: worker_stats.cost_usd,
            duration_ms: worker_stats.duration_ms,
            turns: worker_stats.num_turns,
        });

        match worker_outcome {
            WorkerOutcome::Blocked(reason) => {
                last_worker_output = reason.clone();
                let (summary, summarizer_stats) = run_summarizer_phase(
                    runner,
                    params.binary,
                    params.work_dir,
                    params.file_links,
                    params.phase_timeout,
                    session_id.clone(),
                    sink,
                )
                .await?;
                merge_phase_stats(&mut accumulated, &summarizer_stats);
                phases.push(PhaseSummary {
                    phase: "summarizer".to_string(),
                    cost_usd: summarizer_stats.cost_usd,
                    duration_ms: summarizer_stats.duration_ms,
                    turns: summarizer_stats.num_turns,
                });
                return Ok(LoopResult {
                    outcome: TerminalOutcome::WaitingForInput { reason, summary },
                    accumulated,
                    phases,
                    last_worker_output,
                });
            }
            WorkerOutcome::Done(output) => {
                last_worker_output = output.clone();

                if cancellation.is_canceled().await? {
                    return Ok(LoopResult {
                        outcome: TerminalOutcome::Canceled,
                        accumulated,
                        phases,
                        last_worker_output,
                    });
                }

                let (verdict, verifier_stats) = run_verifier_phase(
                    runner,
                    params.binary,
                    params.work_dir,
                    params.verification_file_name,
                    &output,
                    params.phase_timeout,
                    session_id.clone(),
                    sink,
                )
                .await?;
                if !verifier_stats.session_id.is_empty() {
                    session_id = Some(verifier_stats.session_id.clone());
                }
                merge_phase_stats(&mut accumulated, &verifier_stats);
                phases.push(PhaseSummary {
                    phase: format!("verifier_{iteration}"),
                    cost_usd: verifier_stats.cost_usd,
                    duration_ms: verifier_stats.duration_ms,
                    turns: verifier_stats.num_turns,
                });

                if verdict.approved {
                    let (summary, summarizer_stats) = run_summarizer_phase(
                        runner,
                        params.binary,
                        params.work_dir,
                        params.file_links,
                        params.phase_timeout,
                        session_id.clone(),
                        sink,
                    )
                    .await?;
                    merge_phase_stats(&mut accumulated, &summarizer_stats);
                    phases.push(PhaseSummary {
                        phase: "summarizer".to_string(),
                        cost_usd: summarizer_stats.cost_usd,
                        duration_ms: summarizer_stats.duration_ms,
                        turns: summarizer_stats.num_turns,
                    });
                    return Ok(LoopResult {
                        outcome: TerminalOutcome::Completed { summary },
                        accumulated,
                        phases,
                        last_worker_output,
                    });
                }
                verifier_feedback = Some(verdict.feedback);
            }
        }
    }

    Ok(LoopResult {
        outcome: TerminalOutcome::Failed {
            reason: "Max iterations reached".to_string(),
        },
        accumulated,
        phases,
        last_worker_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_runner::FakeAgentRunner;

    struct NeverCanceled;

    #[async_trait]
    impl CancellationCheck for NeverCanceled {
        async fn is_canceled(&self) -> Result<bool, CoordinationError> {
            Ok(false)
        }
    }

    struct AlwaysCanceled;

    #[async_trait]
    impl CancellationCheck for AlwaysCanceled {
        async fn is_canceled(&self) -> Result<bool, CoordinationError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn cancellation_check_short_circuits_before_any_phase_runs() {
        let params = TaskLoopParams {
            binary: "/nonexistent-llm-binary-for-test",
            ..Default::default()
        };
        let mut sink = ();
        let runner = FakeAgentRunner::new();
        let result = run_task_loop(&params, &runner, &AlwaysCanceled, &mut sink).await.unwrap();
        assert!(matches!(result.outcome, TerminalOutcome::Canceled));
        assert!(result.phases.is_empty());
    }

    #[tokio::test]
    async fn non_canceled_check_runs_without_panicking() {
        let checker = NeverCanceled;
        assert!(!checker.is_canceled().await.unwrap());
    }
}
