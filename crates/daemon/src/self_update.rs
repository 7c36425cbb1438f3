// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared self-update check (`SPEC_FULL.md` §4.5/§4.4): compare the local
//! `VERSION` file against the same file on a remote git branch, and if they
//! differ, pull and exit so an external supervisor restarts the process.
//! Exiting this way is one of the two non-catchable events in `spec.md` §7,
//! alongside SIGINT.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

pub const DEFAULT_UPDATE_CHECK_INTERVAL: Duration = Duration::from_secs(600);

/// Tracks when the next self-update check is due, so an `on_idle` hook can
/// gate the relatively expensive git fetch behind its own interval without
/// every daemon re-implementing the same bookkeeping.
pub struct SelfUpdateTimer {
    interval: Duration,
    last_check: Instant,
}

impl SelfUpdateTimer {
    pub fn new(interval: Duration) -> Self {
        // due immediately so the first idle tick after startup checks once.
        Self { interval, last_check: Instant::now() - interval }
    }

    pub fn is_due(&self) -> bool {
        self.last_check.elapsed() >= self.interval
    }

    pub fn mark_checked(&mut self) {
        self.last_check = Instant::now();
    }
}

fn read_version(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Fetches `update_branch` and compares the remote `VERSION` file's content
/// to the local one. Any git failure is treated as "no update available"
/// rather than fatal — self-update is best-effort idle-time side work, never
/// allowed to take the daemon down.
pub fn remote_version_differs(repo_dir: &Path, update_branch: &str) -> bool {
    let Some(local) = read_version(&repo_dir.join("VERSION")) else {
        return false;
    };

    let fetch = Command::new("git").current_dir(repo_dir).args(["fetch", "origin", update_branch]).output();
    if !matches!(fetch, Ok(ref o) if o.status.success()) {
        tracing::debug!(branch = update_branch, "self-update fetch failed, skipping this check");
        return false;
    }

    let show = Command::new("git")
        .current_dir(repo_dir)
        .args(["show", &format!("origin/{update_branch}:VERSION")])
        .output();
    let remote = match show {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).trim().to_string(),
        _ => return false,
    };

    remote != local
}

/// Pulls `update_branch` and exits the process with code 0. Never returns.
/// An external supervisor is expected to restart the binary on exit.
pub fn pull_and_exit(repo_dir: &Path, update_branch: &str) -> ! {
    tracing::info!(branch = update_branch, "newer VERSION detected upstream, pulling and exiting for restart");
    let _ = Command::new("git").current_dir(repo_dir).args(["pull", "origin", update_branch]).output();
    std::process::exit(0);
}

/// Runs the full check-and-maybe-exit cycle if `timer` is due, a no-op
/// otherwise. Intended to be called from a `Manager::on_idle` implementation.
pub fn check_and_maybe_update(timer: &mut SelfUpdateTimer, repo_dir: &Path, update_branch: &str) {
    if !timer.is_due() {
        return;
    }
    timer.mark_checked();
    if remote_version_differs(repo_dir, update_branch) {
        pull_and_exit(repo_dir, update_branch);
    }
}
