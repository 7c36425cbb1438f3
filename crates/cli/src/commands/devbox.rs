// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dev-box provisioning subcommands: thin wrappers over `DevBoxProvisioner`
//! for operators who need to provision, inspect, or tear down a box without
//! waiting for the Global Manager's poll loop.

use super::required_env;
use crate::exit_error::ExitError;
use clap::Args;
use mesh_adapters::provisioning::{DevBoxProvisioner, HttpDevBoxProvisioner};
use mesh_wire::EnvTokenProvider;

const DEFAULT_POOL: &str = "mesh-default-pool";

#[derive(Args)]
pub struct UserArg {
    /// Directory ID (e.g. Azure AD object ID) of the dev box owner.
    #[arg(long)]
    pub user: String,
}

#[derive(Args)]
pub struct UserAndNameArgs {
    #[command(flatten)]
    pub user: UserArg,
    /// Dev box name (e.g. mesh-box-01).
    #[arg(long)]
    pub name: String,
}

fn build_provisioner() -> Result<HttpDevBoxProvisioner<EnvTokenProvider>, ExitError> {
    let endpoint = required_env("DEVCENTER_ENDPOINT")?;
    let project = required_env("DEVBOX_PROJECT")?;
    let pool = std::env::var("DEVBOX_POOL").unwrap_or_else(|_| DEFAULT_POOL.to_string());
    Ok(HttpDevBoxProvisioner::new(endpoint, project, pool, EnvTokenProvider::new("DEVCENTER_TOKEN")))
}

pub async fn provision(args: UserArg) -> Result<(), ExitError> {
    let provisioner = build_provisioner()?;
    let name = provisioner.next_devbox_name(&args.user).await?;
    provisioner.provision_devbox(&args.user, &name).await?;
    crate::output::print_json(&serde_json::json!({ "name": name, "user": args.user }));
    Ok(())
}

pub async fn status(args: UserAndNameArgs) -> Result<(), ExitError> {
    let provisioner = build_provisioner()?;
    let info = provisioner.get_devbox_status(&args.user.user, &args.name).await?;
    crate::output::print_json(&info);
    Ok(())
}

pub async fn customize(args: UserAndNameArgs) -> Result<(), ExitError> {
    let provisioner = build_provisioner()?;
    provisioner.apply_customizations(&args.user.user, &args.name).await?;
    crate::output::print_json(&serde_json::json!({ "name": args.name, "customized": true }));
    Ok(())
}

pub async fn connect(args: UserAndNameArgs) -> Result<(), ExitError> {
    let provisioner = build_provisioner()?;
    let info = provisioner.get_devbox_status(&args.user.user, &args.name).await?;
    match info.connection_url {
        Some(url) => {
            crate::output::print_json(&serde_json::json!({ "name": args.name, "connection_url": url }));
            Ok(())
        }
        None => Err(ExitError::new(1, format!("dev box '{}' has no connection URL yet", args.name))),
    }
}

pub async fn delete(args: UserAndNameArgs) -> Result<(), ExitError> {
    let provisioner = build_provisioner()?;
    provisioner.delete_devbox(&args.user.user, &args.name).await?;
    crate::output::print_json(&serde_json::json!({ "name": args.name, "deleted": true }));
    Ok(())
}

pub async fn list(args: UserArg) -> Result<(), ExitError> {
    let provisioner = build_provisioner()?;
    let boxes = provisioner.list_devboxes(&args.user).await?;
    let count = boxes.len();
    crate::output::print_json(&serde_json::json!({ "devboxes": boxes, "count": count }));
    Ok(())
}
