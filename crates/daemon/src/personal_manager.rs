// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Personal Manager (`SPEC_FULL.md` §4.3): the primary inbound-message
//! handler bound to one user. Claims conversation rows for that user as
//! soon as they arrive (racing the Global Manager's fallback only if it's
//! slow), resumes the same LLM session across restarts via
//! [`SessionStore`], and sweeps its own stale state on idle: tasks stuck
//! `Running` past 30 minutes and outbound replies nobody delivered within
//! 10 minutes.

use crate::manager::{ClaimableRow, IntervalGate, Manager};
use async_trait::async_trait;
use mesh_core::{
    Clock, ConversationDirection, ConversationRow, ConversationStatus, CoordinationError, TaskRow, TaskStatus,
};
use mesh_engine::{AgentRunner, LlmInvocation};
use mesh_storage::SessionStore;
use mesh_wire::{DirectoryClient, ODataQuery, UpdateOutcome};
use std::time::Duration;

/// Running tasks untouched this long are presumed crashed and swept to
/// `Failed`. `spec.md` §9 leaves this relationship to `POLL_INTERVAL`
/// undocumented; 30 minutes is fixed here rather than derived from
/// `POLL_INTERVAL` since a worker crash has nothing to do with the
/// Personal Manager's own poll cadence (see `DESIGN.md`).
pub const STALE_RUNNING_TASK_THRESHOLD: Duration = Duration::from_secs(30 * 60);
/// How often the Running-task sweep itself runs.
pub const RUNNING_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Outbound rows nobody delivered within this long are presumed lost.
pub const STALE_OUTBOUND_THRESHOLD: Duration = Duration::from_secs(10 * 60);
/// How often the Outbound-expiry sweep itself runs.
pub const OUTBOUND_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub struct PersonalManager<C, A, Clk> {
    pub directory: C,
    pub runner: A,
    pub clock: Clk,
    pub conversations_table: String,
    pub tasks_table: String,
    pub user_email: String,
    pub sessions: SessionStore,
    pub running_sweep: IntervalGate,
    pub outbound_sweep: IntervalGate,
    pub llm_binary: String,
    pub phase_timeout: Duration,
}

impl<C: DirectoryClient, A: AgentRunner, Clk: Clock> PersonalManager<C, A, Clk> {
    /// Marks tasks belonging to this user that have sat `Running` past
    /// [`STALE_RUNNING_TASK_THRESHOLD`] as `Failed`. The filter engine over
    /// the wire only supports equality, so the time window is applied
    /// client-side over the (small) set of this user's `Running` tasks.
    async fn sweep_stale_running_tasks(&self) -> Result<(), CoordinationError> {
        let query = ODataQuery::new().filter(format!(
            "status eq {} and user_email eq '{}'",
            TaskStatus::Running as u8,
            self.user_email
        ));
        let rows: Vec<(TaskRow, Option<mesh_core::ETag>)> = self.directory.get_rows(&self.tasks_table, &query).await?;
        let cutoff = self.clock.now() - chrono::Duration::from_std(STALE_RUNNING_TASK_THRESHOLD).unwrap_or_default();
        for (row, etag) in rows {
            if row.modified_at > cutoff {
                continue;
            }
            self.directory
                .update_row(
                    &self.tasks_table,
                    &row.id,
                    serde_json::json!({"status": TaskStatus::Failed, "status_message": "stale running task swept"}),
                    etag.as_ref(),
                )
                .await?;
        }
        Ok(())
    }

    /// Expires outbound conversation rows nobody delivered within
    /// [`STALE_OUTBOUND_THRESHOLD`].
    async fn sweep_stale_outbound(&self) -> Result<(), CoordinationError> {
        let query = ODataQuery::new().filter(format!(
            "direction eq 'Outbound' and status eq 'Unclaimed' and user_email eq '{}'",
            self.user_email
        ));
        let rows: Vec<(ConversationRow, Option<mesh_core::ETag>)> =
            self.directory.get_rows(&self.conversations_table, &query).await?;
        let cutoff = self.clock.now() - chrono::Duration::from_std(STALE_OUTBOUND_THRESHOLD).unwrap_or_default();
        for (row, etag) in rows {
            if row.created_at > cutoff {
                continue;
            }
            self.directory
                .update_row(
                    &self.conversations_table,
                    &row.id,
                    serde_json::json!({"status": "Expired"}),
                    etag.as_ref(),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<C: DirectoryClient + Send + Sync, A: AgentRunner, Clk: Clock> Manager for PersonalManager<C, A, Clk> {
    type Item = ClaimableRow<ConversationRow>;

    async fn poll(&mut self) -> Result<Option<Self::Item>, CoordinationError> {
        let query = ODataQuery::new()
            .filter(format!(
                "direction eq 'Inbound' and status eq 'Unclaimed' and user_email eq '{}'",
                self.user_email
            ))
            .orderby("created_at asc")
            .top(1);
        let rows: Vec<(ConversationRow, Option<mesh_core::ETag>)> =
            self.directory.get_rows(&self.conversations_table, &query).await?;
        Ok(rows.into_iter().next().map(|(row, etag)| ClaimableRow { row, etag }))
    }

    async fn claim(&mut self, item: &Self::Item) -> Result<bool, CoordinationError> {
        let instance = format!("personal:{}", self.user_email);
        let outcome = self
            .directory
            .update_row(
                &self.conversations_table,
                &item.row.id,
                serde_json::json!({"status": "Claimed", "claimed_by": instance}),
                item.etag.as_ref(),
            )
            .await?;
        Ok(matches!(outcome, UpdateOutcome::Ok))
    }

    async fn process(&mut self, item: Self::Item) -> Result<(), CoordinationError> {
        let inbound = item.row;
        let resume_session_id = self.sessions.get(&inbound.external_conversation_id).map(str::to_string);
        tracing::debug!(
            conversation = %inbound.external_conversation_id,
            resuming = resume_session_id.is_some(),
            "personal manager handling inbound message"
        );

        let invocation = LlmInvocation {
            binary: self.llm_binary.clone(),
            prompt: inbound.message.clone(),
            system_prompt_file: None,
            model: None,
            resume_session_id: resume_session_id.clone(),
            timeout: self.phase_timeout,
        };
        let mut sink = ();
        let reply = match self.runner.run(&invocation, &mut sink).await {
            Ok(chunk) => {
                if !chunk.session_id.is_empty() {
                    self.sessions.remember(&inbound.external_conversation_id, &chunk.session_id)?;
                }
                chunk.result
            }
            Err(CoordinationError::LlmSessionLost) if resume_session_id.is_some() => {
                self.sessions.forget(&inbound.external_conversation_id)?;
                return Err(CoordinationError::LlmSessionLost);
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        self.directory
            .create_row(
                &self.conversations_table,
                &ConversationRow {
                    id: String::new(),
                    user_email: inbound.user_email.clone(),
                    external_conversation_id: inbound.external_conversation_id.clone(),
                    message: reply,
                    direction: ConversationDirection::Outbound,
                    status: ConversationStatus::Unclaimed,
                    claimed_by: None,
                    in_reply_to: Some(inbound.id.clone()),
                    followup_expected: false,
                    created_at: now,
                    etag: None,
                },
                false,
            )
            .await?;

        self.directory
            .update_row(&self.conversations_table, &inbound.id, serde_json::json!({"status": "Processed"}), None)
            .await?;

        Ok(())
    }

    async fn on_idle(&mut self) -> Result<(), CoordinationError> {
        if self.running_sweep.is_due() {
            self.running_sweep.mark_ran();
            self.sweep_stale_running_tasks().await?;
        }
        if self.outbound_sweep.is_due() {
            self.outbound_sweep.mark_ran();
            self.sweep_stale_outbound().await?;
        }
        Ok(())
    }
}
