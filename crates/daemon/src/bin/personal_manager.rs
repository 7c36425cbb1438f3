// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Personal Manager process entry point (`SPEC_FULL.md` §4.3): one instance
//! per user, answering that user's inbound conversation turns and sweeping
//! their own stale rows. Requires `USER_EMAIL`.

use mesh_daemon::manager::IntervalGate;
use mesh_daemon::personal_manager::{PersonalManager, OUTBOUND_SWEEP_INTERVAL, RUNNING_SWEEP_INTERVAL};
use mesh_daemon::{run_poll_loop, Config, LoopExit, PollConfig};
use mesh_engine::SubprocessAgentRunner;
use mesh_storage::SessionStore;
use mesh_wire::{DirectoryTables, EnvTokenProvider, HttpDirectoryClient};

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match Config::load(true) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("personal-manager: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let user_email = config.user_email.clone().expect("Config::load(true) guarantees this is set");

    let tables = DirectoryTables {
        base_url: config.dataverse_url.clone(),
        conversations: config.conversations_table.clone(),
        users: config.users_table.clone(),
        tasks: config.tasks_table.clone(),
        messages: config.messages_table.clone(),
    };
    let directory = HttpDirectoryClient::new(tables, EnvTokenProvider::default());

    let home_dir = dirs::home_dir().unwrap_or_else(|| config.working_dir.clone());
    let sessions = match SessionStore::load(&user_email, &home_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("personal-manager: failed to load session store: {e}");
            std::process::exit(1);
        }
    };

    let manager = PersonalManager {
        directory,
        runner: SubprocessAgentRunner,
        clock: mesh_core::SystemClock,
        conversations_table: config.conversations_table.clone(),
        tasks_table: config.tasks_table.clone(),
        user_email,
        sessions,
        running_sweep: IntervalGate::new(RUNNING_SWEEP_INTERVAL),
        outbound_sweep: IntervalGate::new(OUTBOUND_SWEEP_INTERVAL),
        llm_binary: config.llm_binary.clone(),
        phase_timeout: config.phase_timeout,
    };

    tracing::info!("personal manager starting");
    match run_poll_loop(manager, &PollConfig::new(config.poll_interval)).await {
        LoopExit::SigInt => {
            tracing::info!("personal manager shutting down on SIGINT");
        }
        LoopExit::Fatal(e) => {
            tracing::error!(error = %e, "personal manager exiting on fatal error");
            std::process::exit(1);
        }
    }
}
