// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable write helper shared by every local state file this daemon keeps
//! (`sessions_<user>.json`, `.integrated_worker_state.json`,
//! `.orchestrator_state.json`). Writes to a sibling temp file and renames
//! over the target so a crash mid-write never leaves a truncated file
//! behind, the same hazard `OpenOptions::truncate(false)` guards against in
//! the daemon's PID-lock startup path.

use mesh_core::CoordinationError;
use std::io::Write;
use std::path::Path;

pub fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), CoordinationError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CoordinationError::TransientIo(format!("create_dir_all: {e}")))?;
    }
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| CoordinationError::LogicError(format!("serialize state: {e}")))?;

    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path)
            .map_err(|e| CoordinationError::TransientIo(format!("create temp file: {e}")))?;
        tmp.write_all(body.as_bytes())
            .map_err(|e| CoordinationError::TransientIo(format!("write temp file: {e}")))?;
        tmp.sync_all()
            .map_err(|e| CoordinationError::TransientIo(format!("sync temp file: {e}")))?;
    }
    std::fs::rename(&tmp_path, path)
        .map_err(|e| CoordinationError::TransientIo(format!("rename into place: {e}")))?;
    tracing::debug!(path = %path.display(), "wrote state file");
    Ok(())
}

pub fn read_json<T: serde::de::DeserializeOwned + Default>(
    path: &Path,
) -> Result<T, CoordinationError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let body = std::fs::read_to_string(path)
        .map_err(|e| CoordinationError::TransientIo(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&body)
        .map_err(|e| CoordinationError::SchemaMismatch(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &Sample { value: 7 }).unwrap();
        let loaded: Sample = read_json(&path).unwrap();
        assert_eq!(loaded, Sample { value: 7 });
    }

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded: Sample = read_json(&path).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn no_temp_file_left_behind_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &Sample { value: 1 }).unwrap();
        assert!(!path.with_extension("tmp").exists());
    }
}
