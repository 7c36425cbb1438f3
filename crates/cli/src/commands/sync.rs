// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync-drive path/URL resolution subcommands, for debugging a worker's
//! session-folder placement without starting a Task Worker.

use crate::exit_error::ExitError;
use clap::Args;
use mesh_adapters::sync_path::{create_session_folder, find_sync_root, local_to_web_url, SyncMapping};
use std::path::PathBuf;

#[derive(Args)]
pub struct FindSyncRootArgs {
    /// Only accept a business ("OneDrive - Org") sync folder, not a personal one.
    #[arg(long)]
    pub business_only: bool,
}

#[derive(Args)]
pub struct CreateSessionFolderArgs {
    #[arg(long)]
    pub sync_root: PathBuf,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub task_id: String,
}

#[derive(Args)]
pub struct LocalToUrlArgs {
    #[arg(long)]
    pub path: PathBuf,
    /// Local sync-root mount point this path is expected to fall under.
    #[arg(long)]
    pub mount: PathBuf,
    /// Web document-library URL that mount point corresponds to.
    #[arg(long)]
    pub web_url: String,
    /// Emit a browser-viewable URL rather than the raw document-library URL.
    #[arg(long)]
    pub view_in_browser: bool,
}

pub fn find_sync_root_cmd(args: FindSyncRootArgs) -> Result<(), ExitError> {
    let root = find_sync_root(args.business_only, &[])?;
    crate::output::print_json(&serde_json::json!({ "sync_root": root.display().to_string() }));
    Ok(())
}

pub fn create_session_folder_cmd(args: CreateSessionFolderArgs) -> Result<(), ExitError> {
    let folder = create_session_folder(&args.sync_root, &args.title, &args.task_id)?;
    crate::output::print_json(&serde_json::json!({ "session_folder": folder.display().to_string() }));
    Ok(())
}

pub fn local_to_url_cmd(args: LocalToUrlArgs) -> Result<(), ExitError> {
    let mappings = vec![SyncMapping { mount_point: args.mount, web_url: args.web_url }];
    match local_to_web_url(&args.path, &mappings, args.view_in_browser) {
        Some(url) => {
            crate::output::print_json(&serde_json::json!({ "url": url }));
            Ok(())
        }
        None => Err(ExitError::new(1, format!("'{}' is not under the given mount point", args.path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_folder_cmd_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let args = CreateSessionFolderArgs {
            sync_root: dir.path().to_path_buf(),
            title: "Fix the thing".to_string(),
            task_id: "abcdef1234567890".to_string(),
        };
        create_session_folder_cmd(args).unwrap();
        assert!(dir.path().join("Mesh Sessions").join("Fix the thing_abcdef12").is_dir());
    }

    #[test]
    fn local_to_url_cmd_rejects_a_path_outside_the_mount() {
        let args = LocalToUrlArgs {
            path: PathBuf::from("/unrelated/path/file.txt"),
            mount: PathBuf::from("/home/user/OneDrive - Org"),
            web_url: "https://tenant-my.sharepoint.com/personal/user_org_com/Documents".to_string(),
            view_in_browser: false,
        };
        assert!(local_to_url_cmd(args).is_err());
    }
}
