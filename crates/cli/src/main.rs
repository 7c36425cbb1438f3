// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! meshctl - auxiliary operator tool for dev-box provisioning and sync-path
//! resolution, outside the four coordination daemons' own poll loops
//! (`SPEC_FULL.md` §6).

mod commands;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use commands::{devbox, sync};

#[derive(Parser)]
#[command(name = "meshctl", version, about = "Operator tool for dev-box provisioning and sync-drive paths")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a new dev box for a user.
    Provision(devbox::UserArg),
    /// Fetch a dev box's current provisioning/power status.
    Status(devbox::UserAndNameArgs),
    /// Apply the post-provision customization group to a dev box.
    Customize(devbox::UserAndNameArgs),
    /// Print the web-RDP connection URL for a dev box.
    Connect(devbox::UserAndNameArgs),
    /// Delete a dev box.
    Delete(devbox::UserAndNameArgs),
    /// List every dev box owned by a user.
    List(devbox::UserArg),
    /// Resolve the local sync-drive root directory.
    FindSyncRoot(sync::FindSyncRootArgs),
    /// Create (or find) a task's session folder under the sync root.
    CreateSessionFolder(sync::CreateSessionFolderArgs),
    /// Convert a local sync-drive path to its web URL.
    LocalToUrl(sync::LocalToUrlArgs),
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Provision(args) => devbox::provision(args).await,
        Commands::Status(args) => devbox::status(args).await,
        Commands::Customize(args) => devbox::customize(args).await,
        Commands::Connect(args) => devbox::connect(args).await,
        Commands::Delete(args) => devbox::delete(args).await,
        Commands::List(args) => devbox::list(args).await,
        Commands::FindSyncRoot(args) => sync::find_sync_root_cmd(args),
        Commands::CreateSessionFolder(args) => sync::create_session_folder_cmd(args),
        Commands::LocalToUrl(args) => sync::local_to_url_cmd(args),
    };

    if let Err(e) = result {
        output::print_error(&e.message);
        std::process::exit(e.code);
    }
}
