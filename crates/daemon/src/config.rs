// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide configuration, read once at startup from environment
//! variables (`SPEC_FULL.md` §6). A missing variable a particular daemon
//! genuinely requires is a `Fatal` startup error, never a panic — the
//! Personal Manager's missing `USER_EMAIL` is the example `spec.md` §7
//! names explicitly.

use mesh_core::CoordinationError;
use std::path::PathBuf;
use std::time::Duration;

fn required(name: &str) -> Result<String, CoordinationError> {
    std::env::var(name).map_err(|_| CoordinationError::Fatal(format!("missing required environment variable {name}")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn optional_or(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

fn duration_secs(name: &str, default_secs: u64) -> Duration {
    optional(name)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default_secs))
}

/// Directory-store connection and table names, poll/claim timing, dev-box
/// provisioning endpoints, and local state-file locations. One `Config` is
/// loaded per daemon process; fields a given daemon has no use for are
/// simply ignored by it.
#[derive(Debug, Clone)]
pub struct Config {
    pub dataverse_url: String,
    pub table_name: String,
    pub conversations_table: String,
    pub users_table: String,
    pub tasks_table: String,
    pub messages_table: String,

    pub poll_interval: Duration,
    pub claim_delay: Duration,
    /// Max onboarding users the Global Manager advances through a
    /// provisioning-API call within one poll iteration. `spec.md` §6 names
    /// `PROVISION_THRESHOLD` without documenting its effect; decided here as
    /// a burst-size throttle on provisioning-API calls specifically (see
    /// `DESIGN.md`), not a cap on inbound-row processing in general.
    pub provision_threshold: usize,
    pub git_branch: String,
    pub update_branch: String,

    /// Required for the Personal Manager only; the other three daemons
    /// leave this `None`.
    pub user_email: Option<String>,

    pub work_base_dir: PathBuf,
    pub working_dir: PathBuf,
    pub sessions_file: Option<PathBuf>,

    pub devcenter_endpoint: String,
    pub devbox_project: String,
    pub devbox_pool: String,

    /// Required for the Task Worker only: which dev box this worker
    /// instance runs on, used for the single-flight busy check and the
    /// `dev_box` column written on claim.
    pub dev_box: Option<String>,
    pub llm_binary: String,
    pub phase_timeout: Duration,
    pub sync_root_business_only: bool,

    /// Required for the Orchestrator only: the shared identity mirrored
    /// tasks run as, and the pool of shared workers it round-robins across.
    pub admin_email: Option<String>,
    pub shared_workers: Vec<String>,
}

impl Config {
    /// Loads configuration from the environment. `require_user_email`
    /// should be `true` only for the Personal Manager binary.
    pub fn load(require_user_email: bool) -> Result<Self, CoordinationError> {
        let user_email = optional("USER_EMAIL");
        if require_user_email && user_email.is_none() {
            return Err(CoordinationError::Fatal(
                "USER_EMAIL is required for the personal manager".to_string(),
            ));
        }

        let work_base_dir = optional("WORK_BASE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        let working_dir = optional("WORKING_DIR").map(PathBuf::from).unwrap_or_else(|| work_base_dir.clone());

        Ok(Self {
            dataverse_url: required("DATAVERSE_URL")?,
            table_name: optional_or("TABLE_NAME", "mesh"),
            conversations_table: optional_or("CONVERSATIONS_TABLE", "conversations"),
            users_table: optional_or("USERS_TABLE", "users"),
            tasks_table: optional_or("TASKS_TABLE", "tasks"),
            messages_table: optional_or("MESSAGES_TABLE", "messages"),

            poll_interval: duration_secs("POLL_INTERVAL", 10),
            claim_delay: duration_secs("CLAIM_DELAY", 15),
            provision_threshold: optional("PROVISION_THRESHOLD").and_then(|s| s.parse().ok()).unwrap_or(5),
            git_branch: optional_or("GIT_BRANCH", "main"),
            update_branch: optional_or("UPDATE_BRANCH", "main"),

            user_email,

            work_base_dir,
            working_dir,
            sessions_file: optional("SESSIONS_FILE").map(PathBuf::from),

            devcenter_endpoint: optional_or("DEVCENTER_ENDPOINT", ""),
            devbox_project: optional_or("DEVBOX_PROJECT", ""),
            devbox_pool: optional_or("DEVBOX_POOL", ""),

            dev_box: optional("DEV_BOX"),
            llm_binary: optional_or("LLM_BINARY", "claude"),
            phase_timeout: duration_secs("PHASE_TIMEOUT", 3600),
            sync_root_business_only: optional("SYNC_ROOT_BUSINESS_ONLY").map(|s| s == "1" || s == "true").unwrap_or(false),

            admin_email: optional("ADMIN_EMAIL"),
            shared_workers: optional("SHARED_WORKERS")
                .map(|s| s.split(',').map(|w| w.trim().to_string()).filter(|w| !w.is_empty()).collect())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "DATAVERSE_URL",
        "TABLE_NAME",
        "CONVERSATIONS_TABLE",
        "USERS_TABLE",
        "TASKS_TABLE",
        "MESSAGES_TABLE",
        "POLL_INTERVAL",
        "CLAIM_DELAY",
        "PROVISION_THRESHOLD",
        "GIT_BRANCH",
        "UPDATE_BRANCH",
        "USER_EMAIL",
        "WORK_BASE_DIR",
        "WORKING_DIR",
        "SESSIONS_FILE",
        "DEVCENTER_ENDPOINT",
        "DEVBOX_PROJECT",
        "DEVBOX_POOL",
        "DEV_BOX",
        "LLM_BINARY",
        "PHASE_TIMEOUT",
        "SYNC_ROOT_BUSINESS_ONLY",
        "ADMIN_EMAIL",
        "SHARED_WORKERS",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn missing_dataverse_url_is_fatal() {
        clear_env();
        let err = Config::load(false).unwrap_err();
        assert!(matches!(err, CoordinationError::Fatal(_)));
    }

    #[test]
    #[serial]
    fn personal_manager_requires_user_email() {
        clear_env();
        std::env::set_var("DATAVERSE_URL", "https://example.com");
        let err = Config::load(true).unwrap_err();
        assert!(matches!(err, CoordinationError::Fatal(_)));
        clear_env();
    }

    #[test]
    #[serial]
    fn loads_with_defaults_when_optional_vars_unset() {
        clear_env();
        std::env::set_var("DATAVERSE_URL", "https://example.com");
        let config = Config::load(false).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.tasks_table, "tasks");
        assert_eq!(config.provision_threshold, 5);
        clear_env();
    }
}
