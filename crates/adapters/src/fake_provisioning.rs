// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory `DevBoxProvisioner` double: provisioning succeeds
//! immediately and reports a synthetic connection URL, so daemon tests can
//! exercise the onboarding state machine without a network.

use crate::provisioning::{DevBoxInfo, DevBoxProvisioner, ProvisioningState};
use async_trait::async_trait;
use mesh_core::CoordinationError;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct FakeDevBoxProvisioner {
    boxes: Mutex<HashMap<String, DevBoxInfo>>,
    next_number: Mutex<u32>,
}

impl FakeDevBoxProvisioner {
    pub fn new() -> Self {
        Self {
            boxes: Mutex::new(HashMap::new()),
            next_number: Mutex::new(1),
        }
    }
}

#[async_trait]
impl DevBoxProvisioner for FakeDevBoxProvisioner {
    async fn next_devbox_name(&self, _user_directory_id: &str) -> Result<String, CoordinationError> {
        let mut n = self.next_number.lock();
        let name = format!("mesh-box-{:02}", *n);
        *n += 1;
        Ok(name)
    }

    async fn provision_devbox(
        &self,
        _user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError> {
        self.boxes.lock().insert(
            devbox_name.to_string(),
            DevBoxInfo {
                name: devbox_name.to_string(),
                power_state: "Running".to_string(),
                provisioning_state: ProvisioningState::Succeeded,
                connection_url: Some(format!("https://devbox.example.com/connect?devbox={devbox_name}")),
            },
        );
        Ok(())
    }

    async fn get_devbox_status(
        &self,
        _user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<DevBoxInfo, CoordinationError> {
        self.boxes
            .lock()
            .get(devbox_name)
            .cloned()
            .ok_or_else(|| CoordinationError::LogicError(format!("no such devbox {devbox_name}")))
    }

    async fn apply_customizations(
        &self,
        _user_directory_id: &str,
        _devbox_name: &str,
    ) -> Result<(), CoordinationError> {
        Ok(())
    }

    async fn delete_devbox(
        &self,
        _user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError> {
        self.boxes.lock().remove(devbox_name);
        Ok(())
    }

    async fn list_devboxes(&self, _user_directory_id: &str) -> Result<Vec<DevBoxInfo>, CoordinationError> {
        Ok(self.boxes.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provisioned_box_reports_succeeded() {
        let provisioner = FakeDevBoxProvisioner::new();
        provisioner.provision_devbox("user-1", "mesh-box-01").await.unwrap();
        let info = provisioner.get_devbox_status("user-1", "mesh-box-01").await.unwrap();
        assert_eq!(info.provisioning_state, ProvisioningState::Succeeded);
        assert!(info.connection_url.is_some());
    }

    #[tokio::test]
    async fn list_devboxes_reports_every_provisioned_box() {
        let provisioner = FakeDevBoxProvisioner::new();
        provisioner.provision_devbox("user-1", "mesh-box-01").await.unwrap();
        provisioner.provision_devbox("user-1", "mesh-box-02").await.unwrap();
        let boxes = provisioner.list_devboxes("user-1").await.unwrap();
        assert_eq!(boxes.len(), 2);
    }
}
