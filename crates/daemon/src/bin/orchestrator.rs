// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator process entry point (`SPEC_FULL.md` §4.4): mirrors tasks
//! onto the shared admin identity and hands them to the shared worker pool.
//! Requires `ADMIN_EMAIL` and `SHARED_WORKERS`.

use mesh_daemon::orchestrator::Orchestrator;
use mesh_daemon::self_update::SelfUpdateTimer;
use mesh_daemon::{run_poll_loop, Config, LoopExit, PollConfig};
use mesh_storage::OrchestratorStateStore;
use mesh_wire::{DirectoryTables, EnvTokenProvider, HttpDirectoryClient};

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match Config::load(false) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("orchestrator: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let admin_email = match config.admin_email.clone() {
        Some(e) => e,
        None => {
            eprintln!("orchestrator: ADMIN_EMAIL is required");
            std::process::exit(1);
        }
    };
    if config.shared_workers.is_empty() {
        eprintln!("orchestrator: SHARED_WORKERS is required and must list at least one worker");
        std::process::exit(1);
    }

    let tables = DirectoryTables {
        base_url: config.dataverse_url.clone(),
        conversations: config.conversations_table.clone(),
        users: config.users_table.clone(),
        tasks: config.tasks_table.clone(),
        messages: config.messages_table.clone(),
    };
    let directory = HttpDirectoryClient::new(tables, EnvTokenProvider::default());

    let mut state = match OrchestratorStateStore::load(&config.working_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("orchestrator: failed to load orchestrator state: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = state.set_shared_workers(config.shared_workers.clone()) {
        eprintln!("orchestrator: failed to persist shared worker list: {e}");
        std::process::exit(1);
    }

    let orchestrator = Orchestrator {
        directory,
        clock: mesh_core::SystemClock,
        tasks_table: config.tasks_table.clone(),
        admin_email,
        state,
        last_mirror: std::time::Instant::now() - mesh_daemon::orchestrator::MIN_MIRROR_INTERVAL,
        update_timer: SelfUpdateTimer::new(mesh_daemon::self_update::DEFAULT_UPDATE_CHECK_INTERVAL),
        repo_dir: config.working_dir.clone(),
        update_branch: config.update_branch.clone(),
    };

    tracing::info!("orchestrator starting");
    match run_poll_loop(orchestrator, &PollConfig::new(config.poll_interval)).await {
        LoopExit::SigInt => {
            tracing::info!("orchestrator shutting down on SIGINT");
        }
        LoopExit::Fatal(e) => {
            tracing::error!(error = %e, "orchestrator exiting on fatal error");
            std::process::exit(1);
        }
    }
}
