// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Writes the human- and machine-readable artifacts a task's session folder
//! accumulates: the prompt that was run, the accumulated stats, a
//! markdown session log, and the raw result/transcript/git history.

use crate::stats::AccumulatedStats;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub turns: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub task_id: String,
    pub dev_box: String,
    pub working_dir: String,
    pub total_duration_ms: u64,
    pub total_cost_usd: f64,
    pub total_api_duration_ms: u64,
    pub total_turns: u64,
    pub tokens: crate::stats::TokenStats,
    pub model_usage: std::collections::HashMap<String, crate::stats::ModelStats>,
    pub num_sub_agents: usize,
    pub phases: Vec<PhaseSummary>,
    pub terminal_status: String,
    pub result_preview: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub fn build_session_summary(
    task_id: &str,
    terminal_status: &str,
    working_dir: &str,
    dev_box: &str,
    accumulated: &AccumulatedStats,
    phases: &[PhaseSummary],
    result_text: &str,
    session_id: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> SessionSummary {
    let num_sub_agents = accumulated.model_usage.len().saturating_sub(1);
    SessionSummary {
        session_id: session_id.to_string(),
        task_id: task_id.to_string(),
        dev_box: dev_box.to_string(),
        working_dir: working_dir.to_string(),
        total_duration_ms: accumulated.total_duration_ms,
        total_cost_usd: accumulated.total_cost_usd,
        total_api_duration_ms: accumulated.total_api_duration_ms,
        total_turns: accumulated.total_turns,
        tokens: accumulated.tokens.clone(),
        model_usage: accumulated.model_usage.clone(),
        num_sub_agents,
        phases: phases.to_vec(),
        terminal_status: terminal_status.to_string(),
        result_preview: result_text.chars().take(200).collect(),
        timestamp: now,
    }
}

/// Writes `TASK_PROMPT.md` and `SUCCESS_CRITERIA.md`, the audit trail of
/// what the worker was asked to do.
pub fn write_task_prompt_files(
    session_folder: &Path,
    raw_prompt: &str,
    success_criteria: &str,
) -> std::io::Result<()> {
    std::fs::write(
        session_folder.join("TASK_PROMPT.md"),
        format!("# Full Task Prompt\n\n{raw_prompt}"),
    )?;
    std::fs::write(
        session_folder.join("SUCCESS_CRITERIA.md"),
        format!("# Success Criteria\n\n{success_criteria}"),
    )?;
    Ok(())
}

/// Writes `result.md` and `transcript.md` for any terminal outcome.
pub fn write_result_and_transcript(
    session_folder: &Path,
    result_text: &str,
    transcript: &str,
) -> std::io::Result<()> {
    std::fs::write(session_folder.join("result.md"), result_text)?;
    std::fs::write(session_folder.join("transcript.md"), transcript)?;
    Ok(())
}

/// Writes `session_summary.json`, the structured machine-readable record.
pub fn write_session_summary_file(
    session_folder: &Path,
    summary: &SessionSummary,
) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .unwrap_or_else(|_| "{}".to_string());
    std::fs::write(session_folder.join("session_summary.json"), json)
}

/// Runs `git log` in `work_dir` and writes `GIT_HISTORY.md` to the session
/// folder. Failures are non-fatal: a failed, missing, or timed-out `git log`
/// still produces a file, just one noting the failure. Bounded by
/// [`GIT_LOG_TIMEOUT`], polled via `try_wait` since `std::process::Child`
/// has no built-in deadline.
pub fn capture_git_history(session_folder: &Path, work_dir: &Path) -> std::io::Result<()> {
    let log_text = run_git_log_with_timeout(work_dir, GIT_LOG_TIMEOUT);
    let content = format!("# Git Commit History\n\n```\n{log_text}\n```\n");
    std::fs::write(session_folder.join("GIT_HISTORY.md"), content)
}

/// Polling interval while waiting for `git log` to finish.
const GIT_LOG_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn run_git_log_with_timeout(work_dir: &Path, timeout: Duration) -> String {
    let mut child = match std::process::Command::new("git")
        .args(["log", "--oneline", "--no-decorate", "-50"])
        .current_dir(work_dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return format!("(git log failed: {e})"),
    };

    let deadline = std::time::Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if std::time::Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return "(git log timed out)".to_string();
            }
            Ok(None) => std::thread::sleep(GIT_LOG_POLL_INTERVAL),
            Err(e) => return format!("(git log failed: {e})"),
        }
    }

    match child.wait_with_output() {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if text.is_empty() {
                "(no commits)".to_string()
            } else {
                text
            }
        }
        Ok(out) => format!(
            "(git log failed: {})",
            String::from_utf8_lossy(&out.stderr).trim()
        ),
        Err(e) => format!("(git log failed: {e})"),
    }
}

/// Builds the human-readable `SESSION_LOG.md` markdown body.
pub fn render_session_log(summary: &SessionSummary, result_text: &str, folder_url: Option<&str>) -> String {
    let mut lines = vec![
        "# SESSION LOG".to_string(),
        String::new(),
        "## Task Information".to_string(),
        String::new(),
        "| Field | Value |".to_string(),
        "|-------|-------|".to_string(),
        format!("| Task ID | `{}` |", summary.task_id),
        format!("| Terminal Status | **{}** |", summary.terminal_status),
        format!("| Timestamp | {} |", summary.timestamp.to_rfc3339()),
        format!("| Dev Box | `{}` |", summary.dev_box),
        format!("| Agent Session ID | `{}` |", summary.session_id),
        format!("| Working Directory | `{}` |", summary.working_dir),
    ];
    if let Some(url) = folder_url {
        lines.push(format!("| Sync Folder URL | [Open]({url}) |"));
    }
    lines.push(String::new());

    let duration_s = summary.total_duration_ms as f64 / 1000.0;
    let duration_min = duration_s / 60.0;
    lines.extend([
        "## Session Stats".to_string(),
        String::new(),
        "| Metric | Value |".to_string(),
        "|--------|-------|".to_string(),
        format!("| Total Duration | {duration_min:.1} min ({duration_s:.0}s) |"),
        format!(
            "| API Duration | {:.1}s |",
            summary.total_api_duration_ms as f64 / 1000.0
        ),
        format!("| Total Cost | ${:.4} |", summary.total_cost_usd),
        format!("| Total Turns | {} |", summary.total_turns),
        format!("| Input Tokens | {} |", summary.tokens.input),
        format!("| Output Tokens | {} |", summary.tokens.output),
        format!("| Cache Read Tokens | {} |", summary.tokens.cache_read),
        format!("| Cache Creation Tokens | {} |", summary.tokens.cache_creation),
        format!("| Sub-agents Used | {} |", summary.num_sub_agents),
        String::new(),
    ]);

    if !summary.model_usage.is_empty() {
        lines.extend([
            "## Model Usage".to_string(),
            String::new(),
            "| Model | Cost | Input Tokens | Output Tokens |".to_string(),
            "|-------|------|-------------|---------------|".to_string(),
        ]);
        for (model_id, usage) in &summary.model_usage {
            lines.push(format!(
                "| {model_id} | ${:.4} | {} | {} |",
                usage.cost_usd, usage.input_tokens, usage.output_tokens
            ));
        }
        lines.push(String::new());
    }

    if !summary.phases.is_empty() {
        lines.extend([
            "## Execution Phases".to_string(),
            String::new(),
            "| Phase | Cost | Duration | Turns |".to_string(),
            "|-------|------|----------|-------|".to_string(),
        ]);
        for phase in &summary.phases {
            lines.push(format!(
                "| {} | ${:.4} | {:.1}s | {} |",
                phase.phase,
                phase.cost_usd,
                phase.duration_ms as f64 / 1000.0,
                phase.turns
            ));
        }
        lines.push(String::new());
    }

    lines.push("## Final Results".to_string());
    lines.push(String::new());
    if !result_text.trim().is_empty() {
        lines.push(result_text.trim().to_string());
    } else if !summary.result_preview.is_empty() {
        lines.push(summary.result_preview.clone());
    } else {
        lines.push("(no result text)".to_string());
    }
    lines.push(String::new());

    lines.extend([
        "## Transcript Reference".to_string(),
        String::new(),
        "- Full transcript is stored in the task record's transcript column.".to_string(),
        format!("- Task ID for lookup: `{}`", summary.task_id),
    ]);
    if !summary.session_id.is_empty() {
        lines.push(format!("- Agent session ID: `{}`", summary.session_id));
    }
    lines.push(String::new());

    lines.join("\n")
}

pub fn write_session_log(
    session_folder: &Path,
    summary: &SessionSummary,
    result_text: &str,
    folder_url: Option<&str>,
) -> std::io::Result<()> {
    let content = render_session_log(summary, result_text, folder_url);
    std::fs::write(session_folder.join("SESSION_LOG.md"), content)
}

/// Timeout applied to the `git log` subprocess in [`capture_git_history`].
pub const GIT_LOG_TIMEOUT: Duration = Duration::from_secs(15);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_summary() -> SessionSummary {
        build_session_summary(
            "task-1",
            "completed",
            "/work/task-1",
            "box-01",
            &AccumulatedStats {
                total_cost_usd: 1.5,
                total_duration_ms: 90_000,
                total_api_duration_ms: 60_000,
                total_turns: 7,
                tokens: crate::stats::TokenStats {
                    input: 100,
                    output: 200,
                    cache_read: 10,
                    cache_creation: 5,
                },
                model_usage: HashMap::new(),
            },
            &[PhaseSummary {
                phase: "worker".to_string(),
                cost_usd: 1.0,
                duration_ms: 50_000,
                turns: 5,
            }],
            "All good.",
            "session-123",
            chrono::DateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn task_prompt_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        write_task_prompt_files(dir.path(), "do the thing", "must compile").unwrap();
        assert!(dir.path().join("TASK_PROMPT.md").exists());
        assert!(dir.path().join("SUCCESS_CRITERIA.md").exists());
        let content = std::fs::read_to_string(dir.path().join("TASK_PROMPT.md")).unwrap();
        assert!(content.contains("do the thing"));
    }

    #[test]
    fn session_log_includes_task_id_and_phase_table() {
        let summary = sample_summary();
        let log = render_session_log(&summary, "done", Some("https://example.com/folder"));
        assert!(log.contains("task-1"));
        assert!(log.contains("## Execution Phases"));
        assert!(log.contains("Open"));
    }

    #[test]
    fn session_summary_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let summary = sample_summary();
        write_session_summary_file(dir.path(), &summary).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("session_summary.json")).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(reparsed["task_id"], "task-1");
    }

    #[test]
    fn git_history_handles_non_repo_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        capture_git_history(dir.path(), dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join("GIT_HISTORY.md")).unwrap();
        assert!(content.contains("Git Commit History"));
    }
}
