// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders used by other crates' tests to construct rows without
//! repeating every field.

use crate::{ConversationDirection, ConversationRow, ConversationStatus, ETag, TaskRow, TaskStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn conversation_row(
    user_email: &str,
    external_conversation_id: &str,
    direction: ConversationDirection,
    created_at: DateTime<Utc>,
) -> ConversationRow {
    ConversationRow {
        id: Uuid::new_v4().to_string(),
        user_email: user_email.to_string(),
        external_conversation_id: external_conversation_id.to_string(),
        message: "hello".to_string(),
        direction,
        status: ConversationStatus::Unclaimed,
        claimed_by: None,
        in_reply_to: None,
        followup_expected: false,
        created_at,
        etag: Some(ETag::new("W/\"1\"")),
    }
}

pub fn task_row(user_email: &str, created_at: DateTime<Utc>) -> TaskRow {
    TaskRow {
        id: Uuid::new_v4().to_string(),
        name: "example task".to_string(),
        prompt: "do the thing".to_string(),
        result: String::new(),
        transcript: String::new(),
        status: TaskStatus::Pending,
        is_mirror: false,
        mirror_of: None,
        mirror_task_id: None,
        assigned_worker_id: None,
        worker_status: None,
        user_email: user_email.to_string(),
        dev_box: None,
        working_dir: None,
        onedrive_url: None,
        session_summary: None,
        short_description: None,
        status_message: None,
        created_at,
        modified_at: created_at,
        etag: Some(ETag::new("W/\"1\"")),
    }
}
