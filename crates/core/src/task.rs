// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task row — the unit of work the Orchestrator mirrors and the Task
//! Worker executes.

use crate::ETag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Integer picklist values, fixed because OData `$filter` expressions
/// require the integer form (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TaskStatus {
    Pending = 1,
    Queued = 3,
    Running = 5,
    WaitingForInput = 6,
    Completed = 7,
    Failed = 8,
    Canceled = 9,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// Invariant 3 (`SPEC_FULL.md` §3.2): the legal transition table.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Running)
                | (Pending, Canceled)
                | (Queued, Pending)
                | (Queued, Canceled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, WaitingForInput)
                | (Running, Canceled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub transcript: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub is_mirror: bool,
    pub mirror_of: Option<String>,
    pub mirror_task_id: Option<String>,
    pub assigned_worker_id: Option<String>,
    pub worker_status: Option<String>,
    pub user_email: String,
    pub dev_box: Option<String>,
    pub working_dir: Option<String>,
    pub onedrive_url: Option<String>,
    pub session_summary: Option<String>,
    pub short_description: Option<String>,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip)]
    pub etag: Option<ETag>,
}

impl TaskRow {
    /// Invariant 4 (`SPEC_FULL.md` §3.2): a user task's mirror pairing is
    /// mutual — the mirror must point back with `is_mirror=true`.
    pub fn is_eligible_for_mirroring(&self) -> bool {
        self.status == TaskStatus::Pending && !self.is_mirror && self.mirror_task_id.is_none()
    }
}
