// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task Worker (`SPEC_FULL.md` §4.5): claims one task at a time for its
//! bound user, drives it through `mesh-engine`'s worker/verifier/summarizer
//! loop, and writes the terminal artifacts to the sync-drive session
//! folder. A single [`finalize`] function is the only place a task's
//! status is ever pushed to a terminal state, called from every exit path
//! of [`TaskWorker::process`] so the directory store, the message feed, and
//! the local [`WorkerStateStore`] never drift out of sync with each other.

use crate::manager::{ClaimableRow, Manager};
use crate::self_update::{check_and_maybe_update, SelfUpdateTimer};
use async_trait::async_trait;
use mesh_adapters::sync_path::{create_session_folder, SyncMapping};
use mesh_core::{Clock, CoordinationError, MessageRow, TaskRow, TaskStatus};
use mesh_engine::{
    build_session_summary, run_task_loop, write_result_and_transcript, write_session_summary_file,
    write_task_prompt_files, AgentRunner, CancellationCheck, LoopResult, TaskLoopParams, TerminalOutcome,
};
use mesh_storage::WorkerStateStore;
use mesh_wire::{DirectoryClient, ODataQuery, UpdateOutcome};
use std::path::PathBuf;
use std::time::Duration;

/// Polls the directory store for whether a claimed task has since been
/// marked `Canceled` by an operator. Threaded into `mesh-engine::run_task_loop`.
struct TaskCancellationCheck<'a, C> {
    directory: &'a C,
    tasks_table: &'a str,
    task_id: &'a str,
}

#[async_trait]
impl<C: DirectoryClient + Send + Sync> CancellationCheck for TaskCancellationCheck<'_, C> {
    async fn is_canceled(&self) -> Result<bool, CoordinationError> {
        let row: Option<(TaskRow, Option<mesh_core::ETag>)> =
            self.directory.get_row(self.tasks_table, self.task_id, None).await?;
        Ok(row.map(|(t, _)| t.status == TaskStatus::Canceled).unwrap_or(false))
    }
}

pub struct TaskWorker<C, A, Clk> {
    pub directory: C,
    pub runner: A,
    pub clock: Clk,
    pub tasks_table: String,
    pub messages_table: String,
    pub user_email: String,
    pub dev_box: String,
    pub working_dir: PathBuf,
    pub sync_root: Option<PathBuf>,
    pub mappings: Vec<SyncMapping>,
    pub worker_state: WorkerStateStore,
    pub update_timer: SelfUpdateTimer,
    pub repo_dir: PathBuf,
    pub update_branch: String,
    pub llm_binary: String,
    pub phase_timeout: Duration,
}

impl<C: DirectoryClient, A: AgentRunner, Clk: Clock> TaskWorker<C, A, Clk> {
    /// Single-flight check: refuses to claim a new task while another task
    /// already occupies this dev box. A failed check fails open — the busy
    /// check is advisory, not the source of truth for correctness, and a
    /// directory-store hiccup shouldn't stall the worker indefinitely.
    async fn devbox_is_busy(&self, excluding_task_id: &str) -> bool {
        let query = ODataQuery::new().filter(format!(
            "status eq {} and dev_box eq '{}'",
            TaskStatus::Running as u8,
            self.dev_box
        ));
        match self.directory.get_rows::<TaskRow>(&self.tasks_table, &query).await {
            Ok(rows) => rows.into_iter().any(|(t, _)| t.id != excluding_task_id),
            Err(e) => {
                tracing::warn!(error = %e, "dev-box busy check failed, proceeding anyway");
                false
            }
        }
    }

    /// Writes every terminal artifact for `task` and pushes its final
    /// status, regardless of which branch of the loop produced `outcome`.
    async fn finalize(&mut self, task: &TaskRow, result: LoopResult) -> Result<(), CoordinationError> {
        let now = self.clock.now();
        let (status, message_text, result_text) = match &result.outcome {
            TerminalOutcome::Completed { summary } => (TaskStatus::Completed, summary.clone(), summary.clone()),
            TerminalOutcome::WaitingForInput { reason, summary } => {
                (TaskStatus::WaitingForInput, reason.clone(), summary.clone())
            }
            TerminalOutcome::Failed { reason } => (TaskStatus::Failed, reason.clone(), reason.clone()),
            TerminalOutcome::Canceled => (TaskStatus::Canceled, "Task canceled".to_string(), String::new()),
        };

        let mut onedrive_url = None;
        if let Some(sync_root) = &self.sync_root {
            if let Ok(session_folder) =
                create_session_folder(sync_root, &task.name, &task.id)
            {
                let _ = write_task_prompt_files(&session_folder, &task.prompt, "");
                let _ = write_result_and_transcript(&session_folder, &result_text, &result.last_worker_output);
                let summary = build_session_summary(
                    &task.id,
                    status_label(status),
                    task.working_dir.as_deref().unwrap_or(""),
                    &self.dev_box,
                    &result.accumulated,
                    &result.phases,
                    &result_text,
                    "",
                    now,
                );
                let _ = write_session_summary_file(&session_folder, &summary);
                onedrive_url = mesh_adapters::sync_path::local_to_web_url(&session_folder, &self.mappings, true);
            }
        }

        let mut fields = serde_json::json!({
            "status": status,
            "result": result_text,
            "modified_at": now,
        });
        if let Some(url) = &onedrive_url {
            fields["onedrive_url"] = serde_json::Value::String(url.clone());
        }
        self.directory.update_row(&self.tasks_table, &task.id, fields, None).await?;

        self.directory
            .create_row(
                &self.messages_table,
                &MessageRow::new("task-worker", task.user_email.as_str(), message_text.as_str(), Some(task.id.clone()), now),
                false,
            )
            .await?;

        self.worker_state.set_in_progress_task(None)?;
        Ok(())
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "completed",
        TaskStatus::WaitingForInput => "waiting_for_input",
        TaskStatus::Failed => "failed",
        TaskStatus::Canceled => "canceled",
        _ => "unknown",
    }
}

#[async_trait]
impl<C: DirectoryClient + Send + Sync, A: AgentRunner, Clk: Clock> Manager for TaskWorker<C, A, Clk> {
    type Item = ClaimableRow<TaskRow>;

    async fn poll(&mut self) -> Result<Option<Self::Item>, CoordinationError> {
        let query = ODataQuery::new()
            .filter(format!(
                "status eq {} and user_email eq '{}'",
                TaskStatus::Pending as u8,
                self.user_email
            ))
            .orderby("created_at asc")
            .top(1);
        let rows: Vec<(TaskRow, Option<mesh_core::ETag>)> = self.directory.get_rows(&self.tasks_table, &query).await?;
        let Some((row, etag)) = rows.into_iter().next() else {
            return Ok(None);
        };
        if self.devbox_is_busy(&row.id).await {
            return Ok(None);
        }
        Ok(Some(ClaimableRow { row, etag }))
    }

    async fn claim(&mut self, item: &Self::Item) -> Result<bool, CoordinationError> {
        let outcome = self
            .directory
            .update_row(
                &self.tasks_table,
                &item.row.id,
                serde_json::json!({"status": TaskStatus::Running, "dev_box": self.dev_box}),
                item.etag.as_ref(),
            )
            .await?;
        if matches!(outcome, UpdateOutcome::Ok) {
            self.worker_state.set_in_progress_task(Some(&item.row.id))?;
        }
        Ok(matches!(outcome, UpdateOutcome::Ok))
    }

    async fn process(&mut self, item: Self::Item) -> Result<(), CoordinationError> {
        let task = item.row;
        let work_dir = task
            .working_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.working_dir.clone());

        let params = TaskLoopParams {
            binary: &self.llm_binary,
            work_dir: &work_dir,
            task_name: &task.name,
            verification_file_name: "VERIFICATION.md",
            phase_timeout: self.phase_timeout,
            max_iterations: mesh_engine::MAX_ITERATIONS,
            file_links: &[],
        };
        let cancellation = TaskCancellationCheck { directory: &self.directory, tasks_table: &self.tasks_table, task_id: &task.id };
        let mut sink = ();
        let result = run_task_loop(&params, &self.runner, &cancellation, &mut sink).await?;

        self.finalize(&task, result).await
    }

    async fn on_idle(&mut self) -> Result<(), CoordinationError> {
        check_and_maybe_update(&mut self.update_timer, &self.repo_dir, &self.update_branch);
        Ok(())
    }

    /// A task still `Running` when SIGINT arrives must not be left stuck:
    /// mark it `Failed` so a later worker restart picks up fresh work
    /// instead of believing this task is still in progress.
    async fn on_shutdown(&mut self) -> Result<(), CoordinationError> {
        let Some(task_id) = self.worker_state.state().in_progress_task_id.clone() else {
            return Ok(());
        };
        let now = self.clock.now();
        self.directory
            .update_row(
                &self.tasks_table,
                &task_id,
                serde_json::json!({"status": TaskStatus::Failed, "status_message": "worker shut down", "modified_at": now}),
                None,
            )
            .await?;
        self.worker_state.set_in_progress_task(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::test_support::task_row;
    use mesh_core::FakeClock;
    use mesh_engine::FakeAgentRunner;
    use mesh_wire::FakeDirectoryClient;

    fn worker(dir: &tempfile::TempDir) -> TaskWorker<FakeDirectoryClient, FakeAgentRunner, FakeClock> {
        TaskWorker {
            directory: FakeDirectoryClient::new(),
            runner: FakeAgentRunner::new(),
            clock: FakeClock::new(),
            tasks_table: "tasks".to_string(),
            messages_table: "messages".to_string(),
            user_email: "alice@example.com".to_string(),
            dev_box: "mesh-box-01".to_string(),
            working_dir: dir.path().to_path_buf(),
            sync_root: None,
            mappings: Vec::new(),
            worker_state: WorkerStateStore::load(dir.path()).unwrap(),
            update_timer: SelfUpdateTimer::new(Duration::from_secs(600)),
            repo_dir: dir.path().to_path_buf(),
            update_branch: "main".to_string(),
            llm_binary: "/nonexistent-llm-binary-for-test".to_string(),
            phase_timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn claiming_a_pending_task_marks_it_running_and_records_local_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = worker(&dir);
        let row = task_row("alice@example.com", w.clock.now());
        w.directory.seed("tasks", &row.id.clone(), serde_json::to_value(&row).unwrap());

        let item = w.poll().await.unwrap().expect("pending task");
        assert!(w.claim(&item).await.unwrap());
        assert_eq!(w.worker_state.state().in_progress_task_id.as_deref(), Some(row.id.as_str()));
    }

    #[tokio::test]
    async fn busy_devbox_suppresses_polling_a_new_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = worker(&dir);
        let mut running = task_row("alice@example.com", w.clock.now());
        running.status = TaskStatus::Running;
        running.dev_box = Some("mesh-box-01".to_string());
        w.directory.seed("tasks", "running-1", serde_json::to_value(&running).unwrap());

        let pending = task_row("alice@example.com", w.clock.now());
        w.directory.seed("tasks", "pending-1", serde_json::to_value(&pending).unwrap());

        assert!(w.poll().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shutdown_with_in_progress_task_marks_it_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = worker(&dir);
        let row = task_row("alice@example.com", w.clock.now());
        w.directory.seed("tasks", &row.id.clone(), serde_json::to_value(&row).unwrap());
        w.worker_state.set_in_progress_task(Some(&row.id)).unwrap();

        w.on_shutdown().await.unwrap();
        let (updated, _): (TaskRow, Option<mesh_core::ETag>) =
            w.directory.get_row("tasks", &row.id, None).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Failed);
    }
}
