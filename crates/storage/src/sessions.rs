// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user LLM session-id memory. Maps an external conversation id to the
//! subprocess's own `--resume` session id so the Personal Manager can
//! continue a conversation across restarts instead of starting fresh every
//! time. One file per user, named after a filesystem-safe rendering of
//! their email, defaulting to `~/.mesh`.

use crate::atomic::{read_json, write_json_atomic};
use mesh_core::CoordinationError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Env var that overrides the sessions file path outright, mirroring
/// `SESSIONS_FILE` in the original Personal Manager.
pub const SESSIONS_FILE_ENV: &str = "SESSIONS_FILE";

pub struct SessionStore {
    path: PathBuf,
    sessions: HashMap<String, String>,
}

impl SessionStore {
    /// Resolves the sessions file for `user_email` and loads whatever state
    /// is already on disk. An explicit `sessions_file_env` override always
    /// wins; otherwise the file lives at `<home>/.mesh/sessions_<email>.json`.
    pub fn load(user_email: &str, home_dir: &Path) -> Result<Self, CoordinationError> {
        let path = resolve_path(user_email, home_dir);
        let sessions = read_json(&path)?;
        Ok(Self { path, sessions })
    }

    pub fn get(&self, external_conversation_id: &str) -> Option<&str> {
        self.sessions.get(external_conversation_id).map(String::as_str)
    }

    /// Records the LLM session id resumed from for a conversation and
    /// persists immediately — losing this update would mean a lost
    /// conversational memory, not just a slow recovery.
    pub fn remember(
        &mut self,
        external_conversation_id: &str,
        llm_session_id: &str,
    ) -> Result<(), CoordinationError> {
        self.sessions.insert(
            external_conversation_id.to_string(),
            llm_session_id.to_string(),
        );
        self.persist()
    }

    /// Drops a session that the LLM subprocess reported as unresumable
    /// (`CoordinationError::LlmSessionLost`), so the next turn starts fresh
    /// instead of repeatedly failing the same resume.
    pub fn forget(&mut self, external_conversation_id: &str) -> Result<(), CoordinationError> {
        if self.sessions.remove(external_conversation_id).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), CoordinationError> {
        write_json_atomic(&self.path, &self.sessions)
    }
}

fn resolve_path(user_email: &str, home_dir: &Path) -> PathBuf {
    if let Ok(explicit) = std::env::var(SESSIONS_FILE_ENV) {
        if !explicit.is_empty() {
            return PathBuf::from(explicit);
        }
    }
    let sanitized = user_email.replace('@', "_at_").replace('.', "_");
    home_dir.join(".mesh").join(format!("sessions_{sanitized}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_and_reloads_sessions() {
        std::env::remove_var(SESSIONS_FILE_ENV);
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = SessionStore::load("user@example.com", dir.path()).unwrap();
            store.remember("conv-1", "sess-abc").unwrap();
        }
        let store = SessionStore::load("user@example.com", dir.path()).unwrap();
        assert_eq!(store.get("conv-1"), Some("sess-abc"));
    }

    #[test]
    fn forget_removes_and_persists() {
        std::env::remove_var(SESSIONS_FILE_ENV);
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::load("user@example.com", dir.path()).unwrap();
        store.remember("conv-1", "sess-abc").unwrap();
        store.forget("conv-1").unwrap();
        assert_eq!(store.get("conv-1"), None);

        let reloaded = SessionStore::load("user@example.com", dir.path()).unwrap();
        assert_eq!(reloaded.get("conv-1"), None);
    }

    #[test]
    fn sanitizes_email_into_filename() {
        std::env::remove_var(SESSIONS_FILE_ENV);
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load("a.b@example.com", dir.path()).unwrap();
        assert_eq!(
            store.path.file_name().unwrap().to_str().unwrap(),
            "sessions_a_b_at_example_com.json"
        );
    }
}
