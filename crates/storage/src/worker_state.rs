// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Task Worker's tiny local state file: which user row this worker
//! instance is currently bound to. Recovered on restart so a worker that
//! crashed mid-task resumes polling for the same user's work instead of
//! reprovisioning its identity.

use crate::atomic::{read_json, write_json_atomic};
use mesh_core::CoordinationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const FILE_NAME: &str = ".integrated_worker_state.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerState {
    pub current_user_id: Option<String>,
    /// Task currently claimed by this worker, if any. Used to mark the task
    /// Failed on an unclean shutdown rather than leaving it stuck Running.
    pub in_progress_task_id: Option<String>,
}

pub struct WorkerStateStore {
    path: PathBuf,
    state: WorkerState,
}

impl WorkerStateStore {
    pub fn load(working_dir: &Path) -> Result<Self, CoordinationError> {
        let path = working_dir.join(FILE_NAME);
        let state = read_json(&path)?;
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn set_current_user(&mut self, user_id: &str) -> Result<(), CoordinationError> {
        self.state.current_user_id = Some(user_id.to_string());
        self.persist()
    }

    pub fn set_in_progress_task(&mut self, task_id: Option<&str>) -> Result<(), CoordinationError> {
        self.state.in_progress_task_id = task_id.map(str::to_string);
        self.persist()
    }

    fn persist(&self) -> Result<(), CoordinationError> {
        write_json_atomic(&self.path, &self.state)
    }
}
