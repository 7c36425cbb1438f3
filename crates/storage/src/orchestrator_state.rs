// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Orchestrator's local state: the admin identity it runs as, and the
//! round-robin pool of shared workers it hands new users off to.

use crate::atomic::{read_json, write_json_atomic};
use mesh_core::CoordinationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const FILE_NAME: &str = ".orchestrator_state.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorState {
    pub admin_user_id: Option<String>,
    pub shared_workers: Vec<String>,
    /// Index of the next worker to assign, advanced round-robin.
    #[serde(default)]
    pub next_worker_index: usize,
}

pub struct OrchestratorStateStore {
    path: PathBuf,
    state: OrchestratorState,
}

impl OrchestratorStateStore {
    pub fn load(working_dir: &Path) -> Result<Self, CoordinationError> {
        let path = working_dir.join(FILE_NAME);
        let state = read_json(&path)?;
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn set_admin_user(&mut self, user_id: &str) -> Result<(), CoordinationError> {
        self.state.admin_user_id = Some(user_id.to_string());
        self.persist()
    }

    pub fn set_shared_workers(&mut self, workers: Vec<String>) -> Result<(), CoordinationError> {
        self.state.shared_workers = workers;
        if self.state.next_worker_index >= self.state.shared_workers.len().max(1) {
            self.state.next_worker_index = 0;
        }
        self.persist()
    }

    /// Returns the next worker in round-robin order, or `None` if the pool
    /// is empty, and advances the cursor.
    pub fn next_worker(&mut self) -> Result<Option<String>, CoordinationError> {
        if self.state.shared_workers.is_empty() {
            return Ok(None);
        }
        let idx = self.state.next_worker_index % self.state.shared_workers.len();
        let worker = self.state.shared_workers[idx].clone();
        self.state.next_worker_index = (idx + 1) % self.state.shared_workers.len();
        self.persist()?;
        Ok(Some(worker))
    }

    fn persist(&self) -> Result<(), CoordinationError> {
        write_json_atomic(&self.path, &self.state)
    }
}
