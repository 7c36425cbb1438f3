// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message/activity row — the progress feed a Task Worker writes to
//! while a task runs, correlated to the task via `task_id`.

use crate::ETag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title truncation boundary (`SPEC_FULL.md` §8 boundary behaviors).
pub const TITLE_MAX_CHARS: usize = 200;
/// Content truncation boundary for the activity table.
pub const CONTENT_MAX_CHARS: usize = 10_000;
const TRUNCATION_SUFFIX: &str = "... (truncated)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub title: String,
    pub content: String,
    pub from: String,
    pub to: String,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub etag: Option<ETag>,
}

impl MessageRow {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
        task_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        let title = truncate_chars(first_line(&content), TITLE_MAX_CHARS);
        Self {
            title,
            content: truncate_chars(&content, CONTENT_MAX_CHARS),
            from: from.into(),
            to: to.into(),
            task_id,
            created_at: now,
            etag: None,
        }
    }
}

fn first_line(s: &str) -> &str {
    s.split('\n').next().unwrap_or(s)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= TRUNCATION_SUFFIX.len() {
        return s.chars().take(max).collect();
    }
    let keep = max - TRUNCATION_SUFFIX.len();
    let mut truncated: String = s.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}
