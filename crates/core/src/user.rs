// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The user row — onboarding state. `onboarding_step` is the single source
//! of truth the Global Manager uses to resume after a crash
//! (`SPEC_FULL.md` §4.2).

use crate::ETag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Provisioning,
    WaitingProvisioning,
    Customizing,
    AuthPending,
    AuthPendingRdp,
    Completed,
    ProvisioningFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub email: String,
    pub azure_ad_id: Option<String>,
    pub devbox_name: Option<String>,
    pub devbox_status: Option<String>,
    pub connection_url: Option<String>,
    pub auth_url: Option<String>,
    pub onboarding_step: Option<OnboardingStep>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip)]
    pub etag: Option<ETag>,
}

impl UserRow {
    pub fn new(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            azure_ad_id: None,
            devbox_name: None,
            devbox_status: None,
            connection_url: None,
            auth_url: None,
            onboarding_step: None,
            last_seen: now,
            etag: None,
        }
    }

    /// The set of case-insensitive acknowledgment words recognized in
    /// `auth_pending_rdp` (`SPEC_FULL.md` §4.2 step 5).
    pub fn is_ready_acknowledgment(message: &str) -> bool {
        const ACK_WORDS: &[&str] = &["done", "yes", "completed", "finished", "ready", "ok"];
        let trimmed = message.trim().to_lowercase();
        ACK_WORDS.contains(&trimmed.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledgment_words_are_case_insensitive() {
        assert!(UserRow::is_ready_acknowledgment("Done"));
        assert!(UserRow::is_ready_acknowledgment("  READY  "));
        assert!(UserRow::is_ready_acknowledgment("ok"));
        assert!(!UserRow::is_ready_acknowledgment("not yet"));
    }
}
