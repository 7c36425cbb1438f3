// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod devbox;
pub mod sync;

fn required_env(name: &str) -> Result<String, crate::exit_error::ExitError> {
    std::env::var(name).map_err(|_| crate::exit_error::ExitError::new(1, format!("missing required environment variable {name}")))
}
