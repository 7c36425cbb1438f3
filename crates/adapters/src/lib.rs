// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound integrations the daemons need beyond the directory store:
//! dev-box provisioning and local-path/web-URL resolution for the sync
//! drive a worker's session folder lives on.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod provisioning;
pub mod sync_path;

#[cfg(any(test, feature = "test-support"))]
pub mod fake_provisioning;
#[cfg(any(test, feature = "test-support"))]
pub use fake_provisioning::FakeDevBoxProvisioner;
