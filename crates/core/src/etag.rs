// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque per-row version identifier used with `If-Match` for optimistic
//! concurrency. Kept as its own field on each row type rather than folded
//! into a generic map, per the "one typed record per table" design note.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque version tag for a directory-store row, e.g. `W/"12345"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ETag {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
