// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy every daemon's outer loop matches on.
//!
//! Each variant carries its own propagation policy (see `SPEC_FULL.md` §7):
//! most are non-fatal and cause the current poll iteration to be skipped;
//! only `Fatal` exits the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinationError {
    /// HTTP timeout, 5xx, socket reset. Recoverable: skip-and-retry next poll.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Token fetch failed. Treated like `TransientIo` but logged with a hint
    /// that interactive login may be required.
    #[error("auth failure: {0}")]
    AuthFailure(String),

    /// HTTP 412 on an `If-Match` write. Expected outcome of a claim race,
    /// never logged above `debug`.
    #[error("concurrency conflict")]
    ConcurrencyConflict,

    /// PATCH/POST referenced a column the target table doesn't have yet.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The LLM CLI exited non-zero, timed out, or produced unparseable output.
    #[error("LLM subprocess failure: {0}")]
    LlmSubprocessFailure(String),

    /// The subprocess reported `is_error=true` while resuming a session.
    #[error("LLM session lost")]
    LlmSessionLost,

    /// An invariant was violated (e.g. a task already in a terminal state).
    /// Logged and the current iteration is abandoned; the daemon keeps running.
    #[error("logic error: {0}")]
    LogicError(String),

    /// Unrecoverable startup error. The process must exit non-zero.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoordinationError {
    /// Whether this error should be logged at `error` level. `ConcurrencyConflict`
    /// is an expected outcome of racing claims and is never an error-level event.
    pub fn is_error_level(&self) -> bool {
        !matches!(self, CoordinationError::ConcurrencyConflict)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CoordinationError::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, CoordinationError>;
