// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dev-box provisioning REST client. Thin wrapper over the Dev Center-style
//! API: create/inspect/delete a box, apply a post-provision customization
//! group, and resolve the web-RDP connection URL.

use async_trait::async_trait;
use mesh_core::CoordinationError;
use mesh_wire::{TokenCache, TokenProvider};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION: &str = "2024-02-01";
const CUSTOMIZATION_API_VERSION: &str = "2025-04-01-preview";
/// Names the fixed customization recipe applied after a box finishes
/// provisioning: version control, the coding-agent CLI, and a Python
/// toolchain.
const CUSTOMIZATION_GROUP: &str = "mesh-tools";
const DEVBOX_NAME_PREFIX: &str = "mesh-box-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProvisioningState {
    Succeeded,
    Failed,
    InProgress,
}

impl ProvisioningState {
    fn from_str(raw: &str) -> Self {
        match raw {
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DevBoxInfo {
    pub name: String,
    pub power_state: String,
    pub provisioning_state: ProvisioningState,
    pub connection_url: Option<String>,
}

#[derive(Serialize)]
struct ProvisionBody<'a> {
    #[serde(rename = "poolName")]
    pool_name: &'a str,
}

#[derive(Serialize)]
struct CustomizationTask {
    name: &'static str,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct CustomizationBody {
    tasks: Vec<CustomizationTask>,
}

#[derive(Deserialize, Default)]
struct DevBoxListResponse {
    #[serde(default)]
    value: Vec<serde_json::Value>,
}

#[async_trait]
pub trait DevBoxProvisioner: Send + Sync {
    async fn next_devbox_name(&self, user_directory_id: &str) -> Result<String, CoordinationError>;
    async fn provision_devbox(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError>;
    async fn get_devbox_status(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<DevBoxInfo, CoordinationError>;
    async fn apply_customizations(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError>;
    async fn delete_devbox(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError>;
    /// Lists every dev box owned by `user_directory_id`. Entries carry no
    /// `connection_url` — callers needing it should follow up with
    /// `get_devbox_status` for the specific box.
    async fn list_devboxes(&self, user_directory_id: &str) -> Result<Vec<DevBoxInfo>, CoordinationError>;
}

pub struct HttpDevBoxProvisioner<P> {
    http: reqwest::Client,
    devcenter_endpoint: String,
    project_name: String,
    pool_name: String,
    tokens: TokenCache<P>,
}

impl<P: TokenProvider> HttpDevBoxProvisioner<P> {
    pub fn new(
        devcenter_endpoint: impl Into<String>,
        project_name: impl Into<String>,
        pool_name: impl Into<String>,
        token_provider: P,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            devcenter_endpoint: devcenter_endpoint.into(),
            project_name: project_name.into(),
            pool_name: pool_name.into(),
            tokens: TokenCache::new(token_provider),
        }
    }

    fn devbox_url(&self, user_directory_id: &str, devbox_name: &str) -> String {
        format!(
            "{}/projects/{}/users/{}/devboxes/{}",
            self.devcenter_endpoint, self.project_name, user_directory_id, devbox_name
        )
    }

    async fn auth_header(&self) -> Result<String, CoordinationError> {
        Ok(format!("Bearer {}", self.tokens.token().await?))
    }

    fn map_transport_error(err: reqwest::Error) -> CoordinationError {
        if err.is_timeout() {
            CoordinationError::TransientIo(format!("provisioning request timed out: {err}"))
        } else {
            CoordinationError::TransientIo(err.to_string())
        }
    }
}

#[async_trait]
impl<P: TokenProvider> DevBoxProvisioner for HttpDevBoxProvisioner<P> {
    async fn next_devbox_name(&self, user_directory_id: &str) -> Result<String, CoordinationError> {
        let url = format!(
            "{}/projects/{}/users/{}/devboxes",
            self.devcenter_endpoint, self.project_name, user_directory_id
        );
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header().await?)
            .query(&[("api-version", API_VERSION)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !resp.status().is_success() {
            return Err(CoordinationError::TransientIo(format!(
                "list devboxes returned {}",
                resp.status()
            )));
        }
        let body: DevBoxListResponse = resp
            .json()
            .await
            .map_err(|e| CoordinationError::TransientIo(format!("bad response body: {e}")))?;

        let mut used_numbers: Vec<u32> = body
            .value
            .iter()
            .filter_map(|box_| box_.get("name").and_then(serde_json::Value::as_str))
            .filter_map(|name| name.strip_prefix(DEVBOX_NAME_PREFIX))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .collect();
        used_numbers.sort_unstable();

        let mut next = 1u32;
        for n in used_numbers {
            if n == next {
                next += 1;
            } else if n > next {
                break;
            }
        }
        Ok(format!("{DEVBOX_NAME_PREFIX}{next:02}"))
    }

    async fn provision_devbox(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError> {
        let url = self.devbox_url(user_directory_id, devbox_name);
        let resp = self
            .http
            .put(&url)
            .header("Authorization", self.auth_header().await?)
            .query(&[("api-version", API_VERSION)])
            .json(&ProvisionBody {
                pool_name: &self.pool_name,
            })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CoordinationError::TransientIo(format!(
                "provision devbox returned {}",
                resp.status()
            )))
        }
    }

    async fn get_devbox_status(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<DevBoxInfo, CoordinationError> {
        let url = self.devbox_url(user_directory_id, devbox_name);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header().await?)
            .query(&[("api-version", API_VERSION)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !resp.status().is_success() {
            return Err(CoordinationError::TransientIo(format!(
                "get devbox status returned {}",
                resp.status()
            )));
        }
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CoordinationError::TransientIo(format!("bad response body: {e}")))?;

        let connection_url = self
            .remote_connection_url(user_directory_id, devbox_name)
            .await
            .unwrap_or(None);

        Ok(DevBoxInfo {
            name: data
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(devbox_name)
                .to_string(),
            power_state: data
                .get("powerState")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            provisioning_state: ProvisioningState::from_str(
                data.get("provisioningState")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Unknown"),
            ),
            connection_url,
        })
    }

    async fn apply_customizations(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError> {
        let url = format!(
            "{}/customizationGroups/{}",
            self.devbox_url(user_directory_id, devbox_name),
            CUSTOMIZATION_GROUP
        );
        let body = CustomizationBody {
            tasks: vec![
                CustomizationTask {
                    name: "DevBox.Catalog/winget",
                    parameters: serde_json::json!({"package": "Git.Git"}),
                },
                CustomizationTask {
                    name: "DevBox.Catalog/winget",
                    parameters: serde_json::json!({"package": "agent-cli"}),
                },
                CustomizationTask {
                    name: "DevBox.Catalog/choco",
                    parameters: serde_json::json!({"package": "python312"}),
                },
            ],
        };
        let resp = self
            .http
            .put(&url)
            .header("Authorization", self.auth_header().await?)
            .query(&[("api-version", CUSTOMIZATION_API_VERSION)])
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if resp.status().is_success() || resp.status() == reqwest::StatusCode::CONFLICT {
            // 409 means the group already exists on this box; treat as success.
            Ok(())
        } else {
            Err(CoordinationError::TransientIo(format!(
                "apply customizations returned {}",
                resp.status()
            )))
        }
    }

    async fn delete_devbox(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<(), CoordinationError> {
        let url = self.devbox_url(user_directory_id, devbox_name);
        let resp = self
            .http
            .delete(&url)
            .header("Authorization", self.auth_header().await?)
            .query(&[("api-version", API_VERSION)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(CoordinationError::TransientIo(format!(
                "delete devbox returned {}",
                resp.status()
            )))
        }
    }

    async fn list_devboxes(&self, user_directory_id: &str) -> Result<Vec<DevBoxInfo>, CoordinationError> {
        let url = format!(
            "{}/projects/{}/users/{}/devboxes",
            self.devcenter_endpoint, self.project_name, user_directory_id
        );
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header().await?)
            .query(&[("api-version", API_VERSION)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !resp.status().is_success() {
            return Err(CoordinationError::TransientIo(format!(
                "list devboxes returned {}",
                resp.status()
            )));
        }
        let body: DevBoxListResponse = resp
            .json()
            .await
            .map_err(|e| CoordinationError::TransientIo(format!("bad response body: {e}")))?;

        Ok(body
            .value
            .iter()
            .map(|box_| DevBoxInfo {
                name: box_.get("name").and_then(serde_json::Value::as_str).unwrap_or("").to_string(),
                power_state: box_.get("powerState").and_then(serde_json::Value::as_str).unwrap_or("Unknown").to_string(),
                provisioning_state: ProvisioningState::from_str(
                    box_.get("provisioningState").and_then(serde_json::Value::as_str).unwrap_or("Unknown"),
                ),
                connection_url: None,
            })
            .collect())
    }
}

impl<P: TokenProvider> HttpDevBoxProvisioner<P> {
    async fn remote_connection_url(
        &self,
        user_directory_id: &str,
        devbox_name: &str,
    ) -> Result<Option<String>, CoordinationError> {
        let url = format!(
            "{}/remoteConnection",
            self.devbox_url(user_directory_id, devbox_name)
        );
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header().await?)
            .query(&[("api-version", API_VERSION)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CoordinationError::TransientIo(format!("bad response body: {e}")))?;
        Ok(data
            .get("webUrl")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }
}
