// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global Manager process entry point (`SPEC_FULL.md` §4.2): onboards new
//! users and advances dev-box provisioning for users already in progress.

use mesh_adapters::provisioning::HttpDevBoxProvisioner;
use mesh_daemon::global_manager::GlobalManager;
use mesh_daemon::{run_poll_loop, Config, LoopExit, PollConfig};
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
            eprintln!("global-manager: failed to load configuration: {e}");
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
    let provisioner = HttpDevBoxProvisioner::new(
        config.devcenter_endpoint.clone(),
        config.devbox_project.clone(),
        config.devbox_pool.clone(),
        EnvTokenProvider::default(),
    );

    let manager = GlobalManager {
        directory,
        provisioner,
        clock: mesh_core::SystemClock,
        conversations_table: config.conversations_table.clone(),
        users_table: config.users_table.clone(),
        messages_table: config.messages_table.clone(),
        claim_delay: config.claim_delay,
    };

    tracing::info!("global manager starting");
    match run_poll_loop(manager, &PollConfig::new(config.poll_interval)).await {
        LoopExit::SigInt => {
            tracing::info!("global manager shutting down on SIGINT");
        }
        LoopExit::Fatal(e) => {
            tracing::error!(error = %e, "global manager exiting on fatal error");
            std::process::exit(1);
        }
    }
}
