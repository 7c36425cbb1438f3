// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt construction and result parsing for the three agent phases a task
//! iteration runs through: worker, verifier, summarizer (`SPEC_FULL.md` §4.5).

use crate::stats::{extract_phase_stats, PhaseStats};
use crate::subprocess::{AgentRunner, EventSink, LlmInvocation};
use crate::verdict::read_verdict;
use mesh_core::CoordinationError;
use std::path::Path;

pub const MAX_ITERATIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Done(String),
    Blocked(String),
}

fn worker_prompt(task_name: &str, work_dir: &Path, verifier_feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a worker agent executing a task.\n\n\
         TASK FILE: {task_name} (READ ONLY - this is your source of truth)\n\
         WORK DIRECTORY: {}\n\n\
         Read the task file to understand what you need to do.\n\
         All work done so far is in the current folder - review it.\n\n",
        work_dir.display()
    );

    if let Some(feedback) = verifier_feedback {
        prompt.push_str(&format!(
            "VERIFIER FEEDBACK FROM PREVIOUS ITERATION:\n{feedback}\n\n\
             The verifier found issues with your previous work. Address the feedback and try again.\n\n"
        ));
    }

    prompt.push_str(
        "When you're done, respond with EXACTLY one of these statuses:\n\n\
         STATUS: done\n\
         (if task is complete and ready for verification)\n\n\
         STATUS: blocked - <reason why you're blocked>\n\
         (if you need user input to proceed)\n\n\
         Place your status at the END of your response.\n",
    );
    prompt
}

fn parse_worker_status(result_text: &str) -> WorkerOutcome {
    if result_text.contains("STATUS: done") {
        return WorkerOutcome::Done(result_text.to_string());
    }
    if let Some(line) = result_text.lines().find(|line| line.contains("STATUS: blocked")) {
        let reason = line.replace("STATUS: blocked", "");
        let reason = reason.trim().trim_start_matches('-').trim();
        return WorkerOutcome::Blocked(reason.to_string());
    }
    WorkerOutcome::Blocked("Status unclear - please clarify".to_string())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_worker_phase(
    runner: &dyn AgentRunner,
    binary: &str,
    work_dir: &Path,
    task_name: &str,
    verifier_feedback: Option<&str>,
    timeout: std::time::Duration,
    resume_session_id: Option<String>,
    sink: &mut dyn EventSink,
) -> Result<(WorkerOutcome, PhaseStats), CoordinationError> {
    let invocation = LlmInvocation {
        binary: binary.to_string(),
        prompt: worker_prompt(task_name, work_dir, verifier_feedback),
        system_prompt_file: None,
        model: None,
        resume_session_id,
        timeout,
    };
    let chunk = runner.run(&invocation, sink).await?;
    let stats = extract_phase_stats(&chunk);
    Ok((parse_worker_status(&chunk.result), stats))
}

fn verifier_prompt(verification_file_name: &str, work_dir: &Path, worker_output: &str) -> String {
    format!(
        r#"You are a verifier agent. Check if the work meets the success criteria.

VERIFICATION FILE: {verification_file_name}
WORK DIRECTORY: {}

Read the verification file for success criteria. Review all work done.

LATEST WORKER OUTPUT:
{worker_output}

CORE PRINCIPLES

1. ACTUALLY TEST IT
Do the most active testing possible. Never approve based on code review alone.
Run test suites, execute scripts, call APIs, exercise CLIs. Write tests yourself
if none exist, then run them.

2. BE STRICT
99% success = 100% failure. Any error, partial success, or incomplete solution
is not approved.

3. COMPARE TO EXPERT BASELINE
Ask: if 100 experts were given this exact task independently, what would the
average solution look like? If this solution is not similar, fail it. This
catches work that is technically functional but overcomplicated or missing
obvious features.

UX CHECK (MANDATORY)

Reject if the work shows UX anti-patterns not required by security or
requirements: manual steps that could be automated, missing error messages,
hardcoded values that should be configurable.

RESPONSE FORMAT (MANDATORY)

1. Write your detailed analysis and findings as usual.
2. At the END, you MUST write a file called VERDICT.json with this exact structure:

{{
  "approved": true or false,
  "feedback": "Brief feedback for worker if not approved (empty string if approved)",
  "testing_done": "Summary of what you tested",
  "results": "Summary of test results",
  "criteria_met": ["list", "of", "criteria", "that", "passed"],
  "criteria_failed": ["list", "of", "criteria", "that", "failed"],
  "expert_comparison": "How does this compare to expert baseline"
}}

CRITICAL RULES:
1. File must be named EXACTLY "VERDICT.json" (case-sensitive).
2. Must be valid JSON.
3. "approved" must be boolean true or false, not a string.
4. "feedback" should be empty string if approved.
5. If not approved, "feedback" should be specific and actionable.

After writing VERDICT.json, summarize your findings in plain text for the user to read.
"#,
        work_dir.display()
    )
}

#[allow(clippy::too_many_arguments)]
pub async fn run_verifier_phase(
    runner: &dyn AgentRunner,
    binary: &str,
    work_dir: &Path,
    verification_file_name: &str,
    worker_output: &str,
    timeout: std::time::Duration,
    resume_session_id: Option<String>,
    sink: &mut dyn EventSink,
) -> Result<(crate::verdict::VerdictOutcome, PhaseStats), CoordinationError> {
    let invocation = LlmInvocation {
        binary: binary.to_string(),
        prompt: verifier_prompt(verification_file_name, work_dir, worker_output),
        system_prompt_file: None,
        model: None,
        resume_session_id,
        timeout,
    };
    let chunk = runner.run(&invocation, sink).await?;
    let stats = extract_phase_stats(&chunk);
    Ok((read_verdict(work_dir), stats))
}

fn summarizer_prompt(work_dir: &Path, file_links: &[(String, String)]) -> String {
    let file_links_text = if file_links.is_empty() {
        "(No synced file links available — use plain file names)".to_string()
    } else {
        let mut text = "FILE LINKS (use these for any file references):\n".to_string();
        for (name, url) in file_links {
            text.push_str(&format!("- [{name}]({url})\n"));
        }
        text
    };

    format!(
        r#"You are a results summarizer. Create a concise summary of the work completed.

WORK DIRECTORY: {}

{file_links_text}

Read all deliverable files (the task file, any verification file, VERDICT.json, and any
output files created).

Create a file called SUMMARY.md with a summary that follows these rules:

FORMATTING RULES (MANDATORY):
- Use markdown bullet points for ALL content. Do NOT write prose paragraphs.
- Every section must use bullet lists, not freeform text.
- Keep it concise — max 300-500 words total.
- When referencing files, use clickable markdown links: [filename](url)
- Use the FILE LINKS provided above for any file references.

STRUCTURE:

```markdown
# Task Summary: [Task Name]

## What Was Done
- [Action taken 1]
- [Action taken 2]

## Key Results
- [Result with specific data/numbers]
- [Changed file or artifact] — [view file](url)

## Verification
- [What was tested and how]
- [Test results: pass/fail counts]

## Notes
- [Any caveats or follow-up items]
```

Write SUMMARY.md with your summary, then output a brief confirmation message.
"#,
        work_dir.display()
    )
}

pub async fn run_summarizer_phase(
    runner: &dyn AgentRunner,
    binary: &str,
    work_dir: &Path,
    file_links: &[(String, String)],
    timeout: std::time::Duration,
    resume_session_id: Option<String>,
    sink: &mut dyn EventSink,
) -> Result<(String, PhaseStats), CoordinationError> {
    let invocation = LlmInvocation {
        binary: binary.to_string(),
        prompt: summarizer_prompt(work_dir, file_links),
        system_prompt_file: None,
        model: None,
        resume_session_id,
        timeout,
    };
    let chunk = runner.run(&invocation, sink).await?;
    let stats = extract_phase_stats(&chunk);

    let summary_path = work_dir.join("SUMMARY.md");
    let summary = std::fs::read_to_string(&summary_path).unwrap_or(chunk.result);
    Ok((summary, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_status_is_parsed() {
        let outcome = parse_worker_status("I finished everything.\nSTATUS: done");
        assert_eq!(outcome, WorkerOutcome::Done("I finished everything.\nSTATUS: done".to_string()));
    }

    #[test]
    fn blocked_status_extracts_reason() {
        let outcome = parse_worker_status("Need more info.\nSTATUS: blocked - missing API key");
        assert_eq!(outcome, WorkerOutcome::Blocked("missing API key".to_string()));
    }

    #[test]
    fn unclear_status_defaults_to_blocked() {
        let outcome = parse_worker_status("I did some stuff but forgot to report status.");
        assert_eq!(
            outcome,
            WorkerOutcome::Blocked("Status unclear - please clarify".to_string())
        );
    }

    #[test]
    fn worker_prompt_includes_verifier_feedback_when_present() {
        let prompt = worker_prompt("TASK.md", Path::new("/work"), Some("fix the bug"));
        assert!(prompt.contains("fix the bug"));
        assert!(prompt.contains("VERIFIER FEEDBACK"));
    }

    #[test]
    fn worker_prompt_omits_feedback_section_on_first_iteration() {
        let prompt = worker_prompt("TASK.md", Path::new("/work"), None);
        assert!(!prompt.contains("VERIFIER FEEDBACK"));
    }

    #[test]
    fn summarizer_prompt_lists_file_links_when_present() {
        let prompt = summarizer_prompt(
            Path::new("/work"),
            &[("result.md".to_string(), "https://example.com/result.md".to_string())],
        );
        assert!(prompt.contains("[result.md](https://example.com/result.md)"));
    }
}
