// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task Worker process entry point (`SPEC_FULL.md` §4.5): one instance per
//! dev box, claiming and running queued tasks to completion. Requires
//! `USER_EMAIL` and `DEV_BOX`.

use mesh_adapters::sync_path::find_sync_root;
use mesh_daemon::self_update::SelfUpdateTimer;
use mesh_daemon::task_worker::TaskWorker;
use mesh_daemon::{run_poll_loop, Config, LoopExit, PollConfig};
use mesh_engine::SubprocessAgentRunner;
use mesh_storage::WorkerStateStore;
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
            eprintln!("task-worker: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let user_email = config.user_email.clone().expect("Config::load(true) guarantees this is set");
    let dev_box = match config.dev_box.clone() {
        Some(d) => d,
        None => {
            eprintln!("task-worker: DEV_BOX is required");
            std::process::exit(1);
        }
    };

    let tables = DirectoryTables {
        base_url: config.dataverse_url.clone(),
        conversations: config.conversations_table.clone(),
        users: config.users_table.clone(),
        tasks: config.tasks_table.clone(),
        messages: config.messages_table.clone(),
    };
    let directory = HttpDirectoryClient::new(tables, EnvTokenProvider::default());

    let sync_root = match find_sync_root(config.sync_root_business_only, &[]) {
        Ok(root) => Some(root),
        Err(e) => {
            tracing::warn!(error = %e, "no sync root found, task artifacts will not be mirrored to a web URL");
            None
        }
    };

    let worker_state = match WorkerStateStore::load(&config.working_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("task-worker: failed to load worker state: {e}");
            std::process::exit(1);
        }
    };

    let worker = TaskWorker {
        directory,
        runner: SubprocessAgentRunner,
        clock: mesh_core::SystemClock,
        tasks_table: config.tasks_table.clone(),
        messages_table: config.messages_table.clone(),
        user_email,
        dev_box,
        working_dir: config.working_dir.clone(),
        sync_root,
        mappings: Vec::new(),
        worker_state,
        update_timer: SelfUpdateTimer::new(mesh_daemon::self_update::DEFAULT_UPDATE_CHECK_INTERVAL),
        repo_dir: config.working_dir.clone(),
        update_branch: config.update_branch.clone(),
        llm_binary: config.llm_binary.clone(),
        phase_timeout: config.phase_timeout,
    };

    tracing::info!(dev_box = %worker.dev_box, "task worker starting");
    match run_poll_loop(worker, &PollConfig::new(config.poll_interval)).await {
        LoopExit::SigInt => {
            tracing::info!("task worker shutting down on SIGINT");
        }
        LoopExit::Fatal(e) => {
            tracing::error!(error = %e, "task worker exiting on fatal error");
            std::process::exit(1);
        }
    }
}
