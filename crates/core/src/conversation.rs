// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The conversation row — the bus between the chat front-end and the
//! Global/Personal managers.

use crate::ETag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way a conversation row flows: user-to-system or system-to-user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationDirection {
    Inbound,
    Outbound,
}

/// Lifecycle of a conversation row. See `SPEC_FULL.md` §3 invariant 3
/// (the task-status equivalent); conversation rows have their own simpler
/// lifecycle, immutable once in `Processed`, `Delivered`, or `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationStatus {
    Unclaimed,
    Claimed,
    Processed,
    Delivered,
    Expired,
}

impl ConversationStatus {
    /// Rows in these states are never mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConversationStatus::Processed
                | ConversationStatus::Delivered
                | ConversationStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub user_email: String,
    pub external_conversation_id: String,
    pub message: String,
    pub direction: ConversationDirection,
    pub status: ConversationStatus,
    /// `"personal:<email>:<instance>"` or `"global"`.
    pub claimed_by: Option<String>,
    /// Links an outbound row back to the inbound row it answers.
    pub in_reply_to: Option<String>,
    /// Tells the chat relay to wait for further outbound before replying.
    pub followup_expected: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub etag: Option<ETag>,
}

impl ConversationRow {
    /// Invariant 2 (`SPEC_FULL.md` §8): every outbound row must reference an
    /// inbound row in the same conversation.
    pub fn satisfies_reply_integrity(&self) -> bool {
        matches!(self.direction, ConversationDirection::Outbound) && self.in_reply_to.is_some()
    }
}
