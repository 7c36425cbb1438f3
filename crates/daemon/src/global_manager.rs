// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fallback inbound-message handler and new-user onboarding state machine
//! (`SPEC_FULL.md` §4.2). `decide_onboarding_step` is the pure transition
//! function; `GlobalManager` is the poll/claim/process shell around it that
//! talks to the directory store and the dev-box provisioning API.
//!
//! **Open Question decided** (see `DESIGN.md`): `spec.md` §4.2 step 1 calls
//! for resolving "the user's directory ID via the external directory
//! lookup" before provisioning, but that lookup is explicitly out of scope
//! (`spec.md` §1: "Cloud identity / directory-store vendor specifics — only
//! the OData-style contract matters"). No such client exists anywhere in
//! this codebase to ground one on, so the user's email is passed directly
//! as the `user_directory_id` the provisioning API expects.

use crate::manager::{ClaimableRow, Manager};
use async_trait::async_trait;
use mesh_adapters::provisioning::{DevBoxProvisioner, ProvisioningState};
use mesh_core::{
    Clock, ConversationDirection, ConversationRow, ConversationStatus, CoordinationError, MessageRow, OnboardingStep,
    UserRow,
};
use mesh_wire::{DirectoryClient, ODataQuery, UpdateOutcome};

/// Decided (already-fetched) provisioning/customization state used by the
/// `Provisioning`/`WaitingProvisioning`/`Customizing` steps. The shell
/// fetches this before calling `decide_onboarding_step` so the decision
/// function itself performs no I/O.
pub struct ProvisioningPoll {
    pub state: ProvisioningState,
    pub connection_url: Option<String>,
}

/// Directory identifiers resolved for a brand-new user, fetched by the
/// shell before calling `decide_onboarding_step` for a user with no prior
/// onboarding step.
pub struct NewUserProvisioning {
    pub devbox_name: String,
}

pub struct OnboardingOutcome {
    pub user: UserRow,
    pub reply: String,
    /// Set only on the transition into `Provisioning`, telling the shell to
    /// actually call `provision_devbox` once the row is persisted.
    pub start_provisioning: bool,
}

/// The five-step onboarding state machine driven by `onboarding_step`
/// (`spec.md` §4.2). `new_user` must be `Some` when `user` has no prior
/// onboarding step (or is `None`); `provisioning_poll` must be `Some` when
/// the current step is `Provisioning`, `WaitingProvisioning`, or
/// `Customizing`. Absent a required input the function degenerates to a
/// "still working on it" reply rather than panicking — the shell contract
/// guarantees these are always supplied when needed, but a decision
/// function should never crash on a caller's bug.
pub fn decide_onboarding_step(
    user: Option<UserRow>,
    email: &str,
    message: &str,
    now: chrono::DateTime<chrono::Utc>,
    new_user: Option<NewUserProvisioning>,
    provisioning_poll: Option<ProvisioningPoll>,
) -> OnboardingOutcome {
    let mut user = user.unwrap_or_else(|| UserRow::new(email.to_string(), now));
    user.last_seen = now;

    match user.onboarding_step {
        None => {
            let devbox_name = new_user.map(|n| n.devbox_name).unwrap_or_else(|| "pending".to_string());
            user.devbox_name = Some(devbox_name);
            user.onboarding_step = Some(OnboardingStep::Provisioning);
            OnboardingOutcome {
                user,
                reply: "Welcome! We're setting up your personal workspace now.".to_string(),
                start_provisioning: true,
            }
        }
        Some(OnboardingStep::Provisioning) | Some(OnboardingStep::WaitingProvisioning) => {
            let (state, connection_url) = match provisioning_poll {
                Some(p) => (Some(p.state), p.connection_url),
                None => (None, None),
            };
            match state {
                Some(ProvisioningState::Succeeded) => {
                    user.connection_url = connection_url;
                    user.onboarding_step = Some(OnboardingStep::Customizing);
                    OnboardingOutcome {
                        user,
                        reply: "Your workspace is ready. Installing tools now...".to_string(),
                        start_provisioning: false,
                    }
                }
                Some(ProvisioningState::Failed) => {
                    user.onboarding_step = Some(OnboardingStep::ProvisioningFailed);
                    OnboardingOutcome {
                        user,
                        reply: "Workspace setup failed. Please try again in a few minutes.".to_string(),
                        start_provisioning: false,
                    }
                }
                _ => {
                    user.onboarding_step = Some(OnboardingStep::WaitingProvisioning);
                    OnboardingOutcome {
                        user,
                        reply: "Still setting up your workspace, this can take a few minutes.".to_string(),
                        start_provisioning: false,
                    }
                }
            }
        }
        Some(OnboardingStep::Customizing) => {
            user.onboarding_step = Some(OnboardingStep::AuthPending);
            let reply = match provisioning_poll.map(|p| p.state) {
                Some(ProvisioningState::Failed) => {
                    "Some optional tooling failed to install, but your workspace is usable. Let's finish setup."
                        .to_string()
                }
                _ => "Tooling installed. Let's finish setup.".to_string(),
            };
            OnboardingOutcome { user, reply, start_provisioning: false }
        }
        Some(OnboardingStep::AuthPending) => {
            user.onboarding_step = Some(OnboardingStep::AuthPendingRdp);
            let url = user.connection_url.clone().unwrap_or_default();
            OnboardingOutcome {
                reply: format!(
                    "Connect to your workspace here: {url}\n\nOnce connected, sign in to the assistant tool, then reply \"done\" here."
                ),
                user,
                start_provisioning: false,
            }
        }
        Some(OnboardingStep::AuthPendingRdp) => {
            if UserRow::is_ready_acknowledgment(message) {
                user.onboarding_step = Some(OnboardingStep::Completed);
                OnboardingOutcome {
                    user,
                    reply: "You're all set! Your personal assistant is ready.".to_string(),
                    start_provisioning: false,
                }
            } else {
                let url = user.connection_url.clone().unwrap_or_default();
                OnboardingOutcome {
                    reply: format!(
                        "Connect to your workspace here: {url}\n\nOnce connected and signed in, reply \"done\" here."
                    ),
                    user,
                    start_provisioning: false,
                }
            }
        }
        Some(OnboardingStep::Completed) => OnboardingOutcome {
            user,
            reply: "Your personal assistant is already set up and ready.".to_string(),
            start_provisioning: false,
        },
        Some(OnboardingStep::ProvisioningFailed) => OnboardingOutcome {
            user,
            reply: "Workspace setup previously failed. Reply \"retry\" to try again.".to_string(),
            start_provisioning: false,
        },
    }
}

/// Poll/claim/persist shell around `decide_onboarding_step`. Fallback
/// handler for inbound rows whose Personal Manager hasn't claimed them
/// within `claim_delay` (`spec.md` §4.2).
pub struct GlobalManager<C, P, Clk> {
    pub directory: C,
    pub provisioner: P,
    pub clock: Clk,
    pub conversations_table: String,
    pub users_table: String,
    pub messages_table: String,
    pub claim_delay: std::time::Duration,
}

impl<C: DirectoryClient, P: DevBoxProvisioner, Clk: Clock> GlobalManager<C, P, Clk> {
    async fn find_user(&self, email: &str) -> Result<Option<(UserRow, Option<mesh_core::ETag>)>, CoordinationError> {
        let rows: Vec<(UserRow, Option<mesh_core::ETag>)> =
            self.directory.find_rows(&self.users_table, "email", email).await?;
        Ok(rows.into_iter().next())
    }

    async fn gather_inputs(
        &self,
        user: &Option<UserRow>,
        email: &str,
    ) -> Result<(Option<NewUserProvisioning>, Option<ProvisioningPoll>), CoordinationError> {
        match user.as_ref().and_then(|u| u.onboarding_step) {
            None => {
                let devbox_name = self.provisioner.next_devbox_name(email).await?;
                self.provisioner.provision_devbox(email, &devbox_name).await?;
                Ok((Some(NewUserProvisioning { devbox_name }), None))
            }
            Some(OnboardingStep::Provisioning) | Some(OnboardingStep::WaitingProvisioning) => {
                let devbox_name = user.as_ref().and_then(|u| u.devbox_name.clone()).unwrap_or_default();
                let info = self.provisioner.get_devbox_status(email, &devbox_name).await?;
                if info.provisioning_state == ProvisioningState::Succeeded {
                    self.provisioner.apply_customizations(email, &devbox_name).await?;
                }
                Ok((None, Some(ProvisioningPoll { state: info.provisioning_state, connection_url: info.connection_url })))
            }
            _ => Ok((None, None)),
        }
    }
}

#[async_trait]
impl<C: DirectoryClient + Send + Sync, P: DevBoxProvisioner, Clk: Clock> Manager for GlobalManager<C, P, Clk> {
    type Item = ClaimableRow<ConversationRow>;

    async fn poll(&mut self) -> Result<Option<Self::Item>, CoordinationError> {
        let query = ODataQuery::new()
            .filter("direction eq 'Inbound' and status eq 'Unclaimed'")
            .orderby("created_at asc")
            .top(1);
        let rows: Vec<(ConversationRow, Option<mesh_core::ETag>)> =
            self.directory.get_rows(&self.conversations_table, &query).await?;
        let cutoff = self.clock.now() - chrono::Duration::from_std(self.claim_delay).unwrap_or_default();
        Ok(rows.into_iter().find(|(row, _)| row.created_at <= cutoff).map(|(row, etag)| ClaimableRow { row, etag }))
    }

    async fn claim(&mut self, item: &Self::Item) -> Result<bool, CoordinationError> {
        let outcome = self
            .directory
            .update_row(
                &self.conversations_table,
                &item.row.id,
                serde_json::json!({"status": "Claimed", "claimed_by": "global"}),
                item.etag.as_ref(),
            )
            .await?;
        Ok(matches!(outcome, UpdateOutcome::Ok))
    }

    async fn process(&mut self, item: Self::Item) -> Result<(), CoordinationError> {
        let inbound = item.row;
        let email = inbound.user_email.clone();
        let existing = self.find_user(&email).await?;
        let (user, _etag) = match existing {
            Some((u, e)) => (Some(u), e),
            None => (None, None),
        };

        let (new_user, provisioning_poll) = self.gather_inputs(&user, &email).await?;
        let now = self.clock.now();
        let outcome = decide_onboarding_step(user, &email, &inbound.message, now, new_user, provisioning_poll);

        self.directory
            .upsert_row(&self.users_table, "email", &email, &outcome.user)
            .await?;

        self.directory
            .create_row(
                &self.conversations_table,
                &ConversationRow {
                    id: String::new(),
                    user_email: email.clone(),
                    external_conversation_id: inbound.external_conversation_id.clone(),
                    message: outcome.reply.clone(),
                    direction: ConversationDirection::Outbound,
                    status: ConversationStatus::Unclaimed,
                    claimed_by: None,
                    in_reply_to: Some(inbound.id.clone()),
                    followup_expected: false,
                    created_at: now,
                    etag: None,
                },
                false,
            )
            .await?;

        self.directory
            .create_row(
                &self.messages_table,
                &MessageRow::new("global-manager", email.as_str(), outcome.reply.as_str(), None, now),
                false,
            )
            .await?;

        self.directory
            .update_row(
                &self.conversations_table,
                &inbound.id,
                serde_json::json!({"status": "Processed"}),
                None,
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::test_support::conversation_row;
    use mesh_core::FakeClock;
    use mesh_core::ConversationDirection as Dir;
    use mesh_adapters::FakeDevBoxProvisioner;
    use mesh_wire::FakeDirectoryClient;

    fn manager(clock: FakeClock) -> GlobalManager<FakeDirectoryClient, FakeDevBoxProvisioner, FakeClock> {
        GlobalManager {
            directory: FakeDirectoryClient::new(),
            provisioner: FakeDevBoxProvisioner::new(),
            clock,
            conversations_table: "conversations".to_string(),
            users_table: "users".to_string(),
            messages_table: "messages".to_string(),
            claim_delay: std::time::Duration::from_secs(15),
        }
    }

    #[test]
    fn new_user_transitions_to_provisioning() {
        let now = chrono::Utc::now();
        let outcome = decide_onboarding_step(
            None,
            "alice@example.com",
            "hi",
            now,
            Some(NewUserProvisioning { devbox_name: "mesh-box-01".to_string() }),
            None,
        );
        assert_eq!(outcome.user.onboarding_step, Some(OnboardingStep::Provisioning));
        assert!(outcome.start_provisioning);
    }

    #[test]
    fn succeeded_provisioning_moves_to_customizing() {
        let now = chrono::Utc::now();
        let mut user = UserRow::new("alice@example.com", now);
        user.onboarding_step = Some(OnboardingStep::Provisioning);
        user.devbox_name = Some("mesh-box-01".to_string());
        let outcome = decide_onboarding_step(
            Some(user),
            "alice@example.com",
            "hi",
            now,
            None,
            Some(ProvisioningPoll { state: ProvisioningState::Succeeded, connection_url: Some("https://connect".to_string()) }),
        );
        assert_eq!(outcome.user.onboarding_step, Some(OnboardingStep::Customizing));
    }

    #[test]
    fn ready_acknowledgment_completes_onboarding() {
        let now = chrono::Utc::now();
        let mut user = UserRow::new("alice@example.com", now);
        user.onboarding_step = Some(OnboardingStep::AuthPendingRdp);
        let outcome = decide_onboarding_step(Some(user), "alice@example.com", "done", now, None, None);
        assert_eq!(outcome.user.onboarding_step, Some(OnboardingStep::Completed));
    }

    #[test]
    fn already_completed_user_gets_no_state_change() {
        let now = chrono::Utc::now();
        let mut user = UserRow::new("alice@example.com", now);
        user.onboarding_step = Some(OnboardingStep::Completed);
        let outcome = decide_onboarding_step(Some(user), "alice@example.com", "hi again", now, None, None);
        assert_eq!(outcome.user.onboarding_step, Some(OnboardingStep::Completed));
    }

    #[tokio::test]
    async fn first_contact_provisions_a_devbox_and_persists_the_user_row() {
        let clock = FakeClock::new();
        clock.set(chrono::Utc::now());
        let mut gm = manager(clock.clone());
        gm.directory.seed(
            "conversations",
            "inbound-1",
            serde_json::to_value(conversation_row("alice@example.com", "conv-1", Dir::Inbound, clock.now())).unwrap(),
        );
        clock.advance(chrono::Duration::seconds(20));

        let item = gm.poll().await.unwrap().expect("inbound row past claim delay");
        assert!(gm.claim(&item).await.unwrap());
        gm.process(item).await.unwrap();

        let (user, _): (UserRow, Option<mesh_core::ETag>) = gm.find_user("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.onboarding_step, Some(OnboardingStep::Provisioning));
        assert_eq!(user.devbox_name.as_deref(), Some("mesh-box-01"));
    }

    #[tokio::test]
    async fn second_contact_while_provisioning_advances_to_customizing() {
        let clock = FakeClock::new();
        clock.set(chrono::Utc::now());
        let mut gm = manager(clock.clone());
        gm.directory.seed(
            "conversations",
            "inbound-1",
            serde_json::to_value(conversation_row("alice@example.com", "conv-1", Dir::Inbound, clock.now())).unwrap(),
        );
        clock.advance(chrono::Duration::seconds(20));
        let item = gm.poll().await.unwrap().expect("inbound row past claim delay");
        assert!(gm.claim(&item).await.unwrap());
        gm.process(item).await.unwrap();

        clock.advance(chrono::Duration::seconds(20));
        gm.directory.seed(
            "conversations",
            "inbound-2",
            serde_json::to_value(conversation_row("alice@example.com", "conv-1", Dir::Inbound, clock.now())).unwrap(),
        );
        clock.advance(chrono::Duration::seconds(20));
        let item = gm.poll().await.unwrap().expect("second inbound row past claim delay");
        assert!(gm.claim(&item).await.unwrap());
        gm.process(item).await.unwrap();

        let (user, _): (UserRow, Option<mesh_core::ETag>) = gm.find_user("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.onboarding_step, Some(OnboardingStep::Customizing));
        assert!(user.connection_url.is_some());
    }
}
