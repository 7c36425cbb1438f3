// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator (`SPEC_FULL.md` §4.4): discovers tasks pending mirrored
//! execution, mirrors each onto the shared admin identity, and hands the
//! mirror to the next shared worker in round-robin order. Paces mirror
//! writes at least 500ms apart so a burst of new tasks doesn't hammer the
//! directory store, and self-updates on idle the same way the Task Worker
//! does.

use crate::manager::{ClaimableRow, Manager};
use crate::self_update::{check_and_maybe_update, SelfUpdateTimer};
use async_trait::async_trait;
use mesh_core::{Clock, CoordinationError, TaskRow, TaskStatus};
use mesh_storage::OrchestratorStateStore;
use mesh_wire::{DirectoryClient, ODataQuery, UpdateOutcome};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Minimum spacing enforced between two mirror writes (`spec.md` §5).
pub const MIN_MIRROR_INTERVAL: Duration = Duration::from_millis(500);

pub struct Orchestrator<C, Clk> {
    pub directory: C,
    pub clock: Clk,
    pub tasks_table: String,
    pub admin_email: String,
    pub state: OrchestratorStateStore,
    pub last_mirror: Instant,
    pub update_timer: SelfUpdateTimer,
    pub repo_dir: PathBuf,
    pub update_branch: String,
}

impl<C: DirectoryClient, Clk: Clock> Orchestrator<C, Clk> {
    /// Resolves the admin identity the shared worker pool runs as, caching
    /// it in local state. No external directory lookup exists in this
    /// codebase to ground a real resolution step on (`spec.md` §1 scopes
    /// vendor directory specifics out), so the configured `admin_email` is
    /// cached verbatim on first use.
    fn resolve_admin_user_id(&mut self) -> Result<String, CoordinationError> {
        if let Some(cached) = self.state.state().admin_user_id.clone() {
            return Ok(cached);
        }
        self.state.set_admin_user(&self.admin_email)?;
        Ok(self.admin_email.clone())
    }
}

#[async_trait]
impl<C: DirectoryClient + Send + Sync, Clk: Clock> Manager for Orchestrator<C, Clk> {
    type Item = ClaimableRow<TaskRow>;

    async fn poll(&mut self) -> Result<Option<Self::Item>, CoordinationError> {
        let query = ODataQuery::new()
            .filter(format!("status eq {}", TaskStatus::Pending as u8))
            .orderby("created_at asc");
        let rows: Vec<(TaskRow, Option<mesh_core::ETag>)> = self.directory.get_rows(&self.tasks_table, &query).await?;
        Ok(rows
            .into_iter()
            .find(|(row, _)| row.is_eligible_for_mirroring())
            .map(|(row, etag)| ClaimableRow { row, etag }))
    }

    async fn claim(&mut self, item: &Self::Item) -> Result<bool, CoordinationError> {
        let outcome = self
            .directory
            .update_row(
                &self.tasks_table,
                &item.row.id,
                serde_json::json!({"status": TaskStatus::Queued}),
                item.etag.as_ref(),
            )
            .await?;
        Ok(matches!(outcome, UpdateOutcome::Ok))
    }

    async fn process(&mut self, item: Self::Item) -> Result<(), CoordinationError> {
        let original = item.row;
        let admin_user_id = self.resolve_admin_user_id()?;

        let elapsed = self.last_mirror.elapsed();
        if elapsed < MIN_MIRROR_INTERVAL {
            tokio::time::sleep(MIN_MIRROR_INTERVAL - elapsed).await;
        }

        let worker: Option<String> = self.state.next_worker()?;
        let now = self.clock.now();
        let mirror = TaskRow {
            id: String::new(),
            name: original.name.clone(),
            prompt: original.prompt.clone(),
            result: String::new(),
            transcript: String::new(),
            status: TaskStatus::Pending,
            is_mirror: true,
            mirror_of: Some(original.id.clone()),
            mirror_task_id: None,
            assigned_worker_id: worker.clone(),
            worker_status: None,
            user_email: admin_user_id,
            dev_box: None,
            working_dir: None,
            onedrive_url: None,
            session_summary: None,
            short_description: original.short_description.clone(),
            status_message: None,
            created_at: now,
            modified_at: now,
            etag: None,
        };
        let mirror_id = self.directory.create_row(&self.tasks_table, &mirror, true).await?;
        self.last_mirror = Instant::now();

        self.directory
            .update_row(
                &self.tasks_table,
                &original.id,
                serde_json::json!({"mirror_task_id": mirror_id, "assigned_worker_id": worker}),
                None,
            )
            .await?;

        Ok(())
    }

    async fn on_idle(&mut self) -> Result<(), CoordinationError> {
        check_and_maybe_update(&mut self.update_timer, &self.repo_dir, &self.update_branch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::test_support::task_row;
    use mesh_core::FakeClock;
    use mesh_wire::FakeDirectoryClient;

    fn orchestrator(dir: &tempfile::TempDir) -> Orchestrator<FakeDirectoryClient, FakeClock> {
        let mut state = OrchestratorStateStore::load(dir.path()).unwrap();
        state.set_shared_workers(vec!["worker-1".to_string(), "worker-2".to_string()]).unwrap();
        Orchestrator {
            directory: FakeDirectoryClient::new(),
            clock: FakeClock::new(),
            tasks_table: "tasks".to_string(),
            admin_email: "admin@example.com".to_string(),
            state,
            last_mirror: Instant::now() - MIN_MIRROR_INTERVAL,
            update_timer: SelfUpdateTimer::new(Duration::from_secs(600)),
            repo_dir: dir.path().to_path_buf(),
            update_branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn eligible_task_gets_mirrored_and_assigned() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(&dir);
        let row = task_row("user@example.com", orch.clock.now());
        orch.directory.seed("tasks", &row.id.clone(), serde_json::to_value(&row).unwrap());

        let item = orch.poll().await.unwrap().expect("eligible task");
        assert!(orch.claim(&item).await.unwrap());
        orch.process(item).await.unwrap();

        let (updated, _): (TaskRow, Option<mesh_core::ETag>) =
            orch.directory.get_row("tasks", &row.id, None).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Queued);
        assert!(updated.mirror_task_id.is_some());
        assert_eq!(updated.assigned_worker_id.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn mirror_is_not_picked_up_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(&dir);
        let mut mirror_row = task_row("admin@example.com", orch.clock.now());
        mirror_row.is_mirror = true;
        orch.directory.seed("tasks", "mirror-1", serde_json::to_value(&mirror_row).unwrap());

        assert!(orch.poll().await.unwrap().is_none());
    }

    #[test]
    fn admin_id_is_cached_after_first_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(&dir);
        let first = orch.resolve_admin_user_id().unwrap();
        assert_eq!(first, "admin@example.com");
        assert_eq!(orch.state.state().admin_user_id.as_deref(), Some("admin@example.com"));
    }
}
