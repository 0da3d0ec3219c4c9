//! DispatchLauncher processor.
//!
//! The DispatchLauncher is responsible for:
//! - Creating exactly one `Dispatch` per (campaign, recipient), queued on
//!   the campaign's first channel
//! - Rejecting opted-out recipients at creation time (the segmenter runs
//!   first, but opt-outs race against launches)
//! - Recording each recipient snapshot in the directory for the scheduler
//!   and outbound sender to read later
//! - Emitting one `SendIntent` per created dispatch
//! - Marking the campaign started on its first launch

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::Channel;
use crate::entities::dispatch::Dispatch;
use crate::entities::recipient::Recipient;
use crate::events::{SendIntent, SendIntentSender};
use crate::store::{CampaignStore, CreateOutcome, DispatchStore, RecipientDirectory, StoreError};

/// Errors that reject a launch outright, before any dispatch is created.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Unknown campaign id
    #[error("campaign not found: {0}")]
    CampaignNotFound(Uuid),

    /// The campaign has no channels to cascade over
    #[error("campaign {0} has an empty channel plan")]
    EmptyChannelPlan(Uuid),

    /// Empty recipient set
    #[error("empty recipient set")]
    NoRecipients,

    /// Store error before the per-recipient loop began
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Per-recipient outcome counts for one launch call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LaunchResult {
    pub created: u32,
    pub already_launched: u32,
    pub rejected_opted_out: u32,
    pub errored: u32,
}

/// DispatchLauncher creates the initial dispatches for a campaign.
pub struct DispatchLauncher {
    dispatches: Arc<dyn DispatchStore>,
    campaigns: Arc<dyn CampaignStore>,
    recipients: Arc<dyn RecipientDirectory>,
    send_intent_tx: SendIntentSender,
}

impl DispatchLauncher {
    pub fn new(
        dispatches: Arc<dyn DispatchStore>,
        campaigns: Arc<dyn CampaignStore>,
        recipients: Arc<dyn RecipientDirectory>,
        send_intent_tx: SendIntentSender,
    ) -> Self {
        Self {
            dispatches,
            campaigns,
            recipients,
            send_intent_tx,
        }
    }

    /// Launch `campaign_id` for `recipients`.
    ///
    /// Idempotent per (campaign, recipient): a recipient who already has a
    /// dispatch for this campaign is reported as `already_launched`, not an
    /// error. A failure on one recipient never aborts the rest.
    pub async fn launch(
        &self,
        campaign_id: Uuid,
        recipients: &[Recipient],
        now: OffsetDateTime,
    ) -> Result<LaunchResult, LaunchError> {
        if recipients.is_empty() {
            return Err(LaunchError::NoRecipients);
        }
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or(LaunchError::CampaignNotFound(campaign_id))?;
        let Some(first_step) = campaign.channel_plan.first() else {
            return Err(LaunchError::EmptyChannelPlan(campaign_id));
        };

        let mut result = LaunchResult::default();
        for recipient in recipients {
            match self
                .launch_one(campaign_id, first_step.channel, recipient, now)
                .await
            {
                Ok(outcome) => match outcome {
                    RecipientOutcome::Created => result.created += 1,
                    RecipientOutcome::AlreadyLaunched => result.already_launched += 1,
                    RecipientOutcome::OptedOut => result.rejected_opted_out += 1,
                },
                Err(e) => {
                    error!(
                        campaign_id = %campaign_id,
                        recipient_id = %recipient.id,
                        error = %e,
                        "Failed to launch recipient"
                    );
                    result.errored += 1;
                }
            }
        }

        if result.created > 0
            && let Err(e) = self.campaigns.mark_started(campaign_id, now).await
        {
            // The dispatches exist; a lost start timestamp is not worth
            // failing the launch over.
            warn!(campaign_id = %campaign_id, error = %e, "Failed to mark campaign started");
        }

        info!(
            campaign_id = %campaign_id,
            created = result.created,
            already_launched = result.already_launched,
            rejected_opted_out = result.rejected_opted_out,
            errored = result.errored,
            "Launch complete"
        );
        Ok(result)
    }

    async fn launch_one(
        &self,
        campaign_id: Uuid,
        first_channel: Channel,
        recipient: &Recipient,
        now: OffsetDateTime,
    ) -> Result<RecipientOutcome, StoreError> {
        let known = self.recipients.get(recipient.id.as_str()).await?;
        if recipient.opted_out || known.is_some_and(|k| k.opted_out) {
            debug!(
                campaign_id = %campaign_id,
                recipient_id = %recipient.id,
                "Rejecting opted-out recipient"
            );
            return Ok(RecipientOutcome::OptedOut);
        }

        self.recipients.upsert(recipient.clone()).await?;

        let dispatch = Dispatch::new(campaign_id, recipient.id.clone(), first_channel, now);
        match self.dispatches.create(dispatch).await? {
            CreateOutcome::Created(created) => {
                let intent = SendIntent {
                    dispatch_id: created.id,
                    campaign_id,
                    recipient_id: created.recipient_id.clone(),
                    channel: created.current_channel,
                };
                if let Err(e) = self.send_intent_tx.send(intent).await {
                    // The dispatch is queued either way; the next escalation
                    // pass re-emits the intent.
                    error!(
                        dispatch_id = %created.id,
                        error = %e,
                        "Failed to emit SendIntent"
                    );
                }
                Ok(RecipientOutcome::Created)
            }
            CreateOutcome::AlreadyExists(_) => Ok(RecipientOutcome::AlreadyLaunched),
        }
    }
}

enum RecipientOutcome {
    Created,
    AlreadyLaunched,
    OptedOut,
}
