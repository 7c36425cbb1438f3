// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local, per-process durable state: the small JSON files each daemon keeps
//! next to itself so a restart doesn't lose conversational memory, claimed
//! identity, or the shared-worker assignment cursor. None of this is the
//! system of record — the directory store is — it only bridges restarts.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod atomic;
mod orchestrator_state;
mod sessions;
mod worker_state;

pub use atomic::{read_json, write_json_atomic};
pub use orchestrator_state::{OrchestratorState, OrchestratorStateStore};
pub use sessions::{SessionStore, SESSIONS_FILE_ENV};
pub use worker_state::{WorkerState, WorkerStateStore};
