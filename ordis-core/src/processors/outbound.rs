//! OutboundSender processor.
//!
//! The OutboundSender is responsible for:
//! - Receiving `SendIntent` events from the launcher and the escalation
//!   scheduler
//! - Resolving the recipient's contact point and the campaign's message
//!   body for the intent's channel
//! - Calling the channel gateway and recording provider acceptance as the
//!   `queued → sent` transition (with `sent_at` and the provider message id)
//! - Leaving the dispatch `queued` when the provider is unreachable — the
//!   next escalation pass re-emits the intent — and marking it
//!   `undeliverable` when the provider refuses it outright, so the
//!   threshold clock runs and the cascade can advance off a dead address
//!
//! Delivery mechanics beyond "the provider accepted the send" are the
//! provider's problem; everything after acceptance arrives through the
//! EventIngestor.

use std::sync::Arc;

use async_trait::async_trait;
use compact_str::CompactString;
use kanau::processor::Processor;
use ordis_sdk::objects::Channel as SdkChannel;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use crate::config::ProviderConfig;
use crate::entities::{Channel, DeliveryStatus};
use crate::entities::recipient::Recipient;
use crate::events::{SendIntent, SendIntentReceiver};
use crate::store::{CampaignStore, DispatchStore, RecipientDirectory, StoreError, UpdateOutcome};

/// Errors from the channel gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider refused the message permanently (dead address, blocked
    /// number, unsupported recipient).
    #[error("send rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached or failed transiently; the send
    /// can be retried as-is.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Transmission seam to the channel providers.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Transmit `content` to `recipient` on `channel`. Returns the
    /// provider-assigned message id on acceptance.
    async fn send(
        &self,
        channel: Channel,
        recipient: &Recipient,
        content: &str,
    ) -> Result<CompactString, GatewayError>;
}

/// Gateway that POSTs sends to per-channel provider HTTP endpoints.
pub struct HttpChannelGateway {
    providers: Arc<RwLock<Vec<ProviderConfig>>>,
    http: reqwest::Client,
}

impl HttpChannelGateway {
    pub fn new(providers: Arc<RwLock<Vec<ProviderConfig>>>) -> Self {
        Self {
            providers,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

/// Provider acceptance body: `{"message_id": "..."}`.
#[derive(Debug, Deserialize)]
struct SendAccepted {
    message_id: CompactString,
}

#[async_trait]
impl ChannelGateway for HttpChannelGateway {
    async fn send(
        &self,
        channel: Channel,
        recipient: &Recipient,
        content: &str,
    ) -> Result<CompactString, GatewayError> {
        let (endpoint, api_key) = {
            let providers = self.providers.read().await;
            let Some(provider) = providers
                .iter()
                .find(|p| p.channel == SdkChannel::from(channel))
            else {
                // A config gap, not a dead recipient; retryable after reload.
                return Err(GatewayError::Unavailable(format!(
                    "no provider configured for channel {channel}"
                )));
            };
            (provider.endpoint.clone(), provider.api_key.clone())
        };

        let Some(to) = recipient.contact(channel) else {
            return Err(GatewayError::Rejected(format!(
                "recipient {} has no contact point for channel {channel}",
                recipient.id
            )));
        };

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "to": to, "content": content }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("provider returned {status}: {body}");
            return Err(if status.is_client_error() {
                GatewayError::Rejected(message)
            } else {
                GatewayError::Unavailable(message)
            });
        }

        let accepted: SendAccepted = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(accepted.message_id)
    }
}

/// Errors that can occur while processing one send intent.
#[derive(Debug, Error)]
pub enum OutboundError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// OutboundSender turns send intents into provider sends.
pub struct OutboundSender {
    dispatches: Arc<dyn DispatchStore>,
    campaigns: Arc<dyn CampaignStore>,
    recipients: Arc<dyn RecipientDirectory>,
    gateway: Arc<dyn ChannelGateway>,
}

impl OutboundSender {
    pub fn new(
        dispatches: Arc<dyn DispatchStore>,
        campaigns: Arc<dyn CampaignStore>,
        recipients: Arc<dyn RecipientDirectory>,
        gateway: Arc<dyn ChannelGateway>,
    ) -> Self {
        Self {
            dispatches,
            campaigns,
            recipients,
            gateway,
        }
    }

    /// Run the OutboundSender until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut intent_rx: SendIntentReceiver) {
        info!("OutboundSender started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("OutboundSender received shutdown signal");
                        break;
                    }
                }

                intent = intent_rx.recv() => {
                    let Some(intent) = intent else {
                        info!("SendIntent channel closed");
                        break;
                    };
                    if let Err(e) = self.process(intent).await {
                        error!(error = %e, "Failed to process SendIntent");
                    }
                }
            }
        }

        info!("OutboundSender shutdown complete");
    }
}

impl Processor<SendIntent> for OutboundSender {
    type Output = ();
    type Error = OutboundError;

    async fn process(&self, intent: SendIntent) -> Result<(), OutboundError> {
        // Validate against current state: the intent may have outlived its
        // dispatch (escalated, answered, failed) while sitting in the queue.
        let Some(dispatch) = self.dispatches.get(intent.dispatch_id).await? else {
            warn!(dispatch_id = %intent.dispatch_id, "SendIntent for unknown dispatch");
            return Ok(());
        };
        if dispatch.status != DeliveryStatus::Queued || dispatch.current_channel != intent.channel
        {
            debug!(
                dispatch_id = %dispatch.id,
                status = %dispatch.status,
                "Stale SendIntent, dropping"
            );
            return Ok(());
        }

        let Some(recipient) = self.recipients.get(dispatch.recipient_id.as_str()).await? else {
            warn!(
                dispatch_id = %dispatch.id,
                recipient_id = %dispatch.recipient_id,
                "Recipient snapshot missing, dropping SendIntent"
            );
            return Ok(());
        };
        if recipient.opted_out {
            // The scheduler owns the terminal transition for opt-outs.
            debug!(dispatch_id = %dispatch.id, "Recipient opted out, not sending");
            return Ok(());
        }

        let Some(campaign) = self.campaigns.get(dispatch.campaign_id).await? else {
            warn!(
                dispatch_id = %dispatch.id,
                campaign_id = %dispatch.campaign_id,
                "Campaign missing, dropping SendIntent"
            );
            return Ok(());
        };
        let Some(step) = campaign.step(dispatch.current_channel) else {
            warn!(
                dispatch_id = %dispatch.id,
                channel = %dispatch.current_channel,
                "Dispatch channel is not in the campaign plan"
            );
            return Ok(());
        };

        match self
            .gateway
            .send(intent.channel, &recipient, &step.content)
            .await
        {
            Ok(provider_message_id) => {
                let now = OffsetDateTime::now_utc();
                let change = dispatch.mark_sent(provider_message_id.clone(), now);
                match self
                    .dispatches
                    .update(dispatch.id, dispatch.version, change)
                    .await?
                {
                    UpdateOutcome::Applied(_) => {
                        info!(
                            dispatch_id = %dispatch.id,
                            channel = %intent.channel,
                            provider_message_id = %provider_message_id,
                            "Send accepted"
                        );
                    }
                    UpdateOutcome::Conflict
                    | UpdateOutcome::Terminal
                    | UpdateOutcome::Missing => {
                        // The dispatch moved on while the provider was
                        // accepting; the newer state wins.
                        debug!(
                            dispatch_id = %dispatch.id,
                            "Dispatch changed before send was recorded"
                        );
                    }
                }
                Ok(())
            }
            Err(GatewayError::Rejected(reason)) => {
                warn!(
                    dispatch_id = %dispatch.id,
                    channel = %intent.channel,
                    reason = reason,
                    "Send rejected by provider"
                );
                let now = OffsetDateTime::now_utc();
                let _ = self
                    .dispatches
                    .update(dispatch.id, dispatch.version, dispatch.mark_undeliverable(now))
                    .await?;
                Ok(())
            }
            Err(GatewayError::Unavailable(reason)) => {
                warn!(
                    dispatch_id = %dispatch.id,
                    channel = %intent.channel,
                    reason = reason,
                    "Provider unavailable, dispatch stays queued"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::campaign::{Campaign, ChannelStep};
    use crate::entities::dispatch::Dispatch;
    use crate::store::{CreateOutcome, MemoryStore};
    use smallvec::smallvec;
    use std::sync::Mutex as StdMutex;
    use time::Duration;
    use time::macros::datetime;
    use uuid::Uuid;

    const NOW: OffsetDateTime = datetime!(2025-06-01 10:00 UTC);

    /// Gateway double: scripted result, records what was sent.
    struct ScriptedGateway {
        result: Result<CompactString, fn(String) -> GatewayError>,
        sent: StdMutex<Vec<(Channel, CompactString, String)>>,
    }

    impl ScriptedGateway {
        fn accepting(message_id: &str) -> Self {
            Self {
                result: Ok(message_id.into()),
                sent: StdMutex::new(vec![]),
            }
        }

        fn failing(kind: fn(String) -> GatewayError) -> Self {
            Self {
                result: Err(kind),
                sent: StdMutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl ChannelGateway for ScriptedGateway {
        async fn send(
            &self,
            channel: Channel,
            recipient: &Recipient,
            content: &str,
        ) -> Result<CompactString, GatewayError> {
            self.sent
                .lock()
                .unwrap()
                .push((channel, recipient.id.clone(), content.to_string()));
            match &self.result {
                Ok(id) => Ok(id.clone()),
                Err(kind) => Err(kind("scripted".to_string())),
            }
        }
    }

    struct Fixture {
        sender: OutboundSender,
        store: Arc<MemoryStore>,
        gateway: Arc<ScriptedGateway>,
        dispatch: Dispatch,
    }

    async fn fixture(gateway: ScriptedGateway) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: "welcome".to_string(),
            channel_plan: smallvec![ChannelStep {
                channel: Channel::Chat,
                escalation_threshold: Duration::hours(2),
                content: "hello!".to_string(),
            }],
            started_at: None,
        };
        store.insert_campaign(campaign.clone()).await;
        store
            .upsert(Recipient {
                id: "r-1".into(),
                opted_out: false,
                chat_id: Some("chat-handle".into()),
                phone: None,
                tags: vec![],
            })
            .await
            .unwrap();

        let dispatch = Dispatch::new(campaign.id, "r-1".into(), Channel::Chat, NOW);
        let dispatch = match store.create(dispatch).await.unwrap() {
            CreateOutcome::Created(d) => d,
            other => panic!("unexpected {other:?}"),
        };

        let gateway = Arc::new(gateway);
        let sender = OutboundSender::new(
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
        );
        Fixture {
            sender,
            store,
            gateway,
            dispatch,
        }
    }

    fn intent_for(dispatch: &Dispatch) -> SendIntent {
        SendIntent {
            dispatch_id: dispatch.id,
            campaign_id: dispatch.campaign_id,
            recipient_id: dispatch.recipient_id.clone(),
            channel: dispatch.current_channel,
        }
    }

    async fn fetch(store: &MemoryStore, id: Uuid) -> Dispatch {
        DispatchStore::get(store, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn acceptance_flips_queued_to_sent() {
        let f = fixture(ScriptedGateway::accepting("pm-99")).await;

        f.sender.process(intent_for(&f.dispatch)).await.unwrap();

        let stored = fetch(&f.store, f.dispatch.id).await;
        assert_eq!(stored.status, DeliveryStatus::Sent);
        assert_eq!(stored.provider_message_id.as_deref(), Some("pm-99"));
        assert!(stored.sent_at.is_some());

        let sent = f.gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, "hello!");
    }

    #[tokio::test]
    async fn rejection_marks_undeliverable_with_a_running_clock() {
        let f = fixture(ScriptedGateway::failing(GatewayError::Rejected)).await;

        f.sender.process(intent_for(&f.dispatch)).await.unwrap();

        let stored = fetch(&f.store, f.dispatch.id).await;
        assert_eq!(stored.status, DeliveryStatus::Undeliverable);
        assert!(stored.sent_at.is_some());
        assert!(stored.provider_message_id.is_none());
    }

    #[tokio::test]
    async fn unavailable_provider_leaves_the_dispatch_queued() {
        let f = fixture(ScriptedGateway::failing(GatewayError::Unavailable)).await;

        f.sender.process(intent_for(&f.dispatch)).await.unwrap();

        let stored = fetch(&f.store, f.dispatch.id).await;
        assert_eq!(stored.status, DeliveryStatus::Queued);
        assert!(stored.sent_at.is_none());
    }

    #[tokio::test]
    async fn stale_intent_is_dropped_without_a_send() {
        let f = fixture(ScriptedGateway::accepting("pm-99")).await;

        // The dispatch already moved past queued.
        match f
            .store
            .update(
                f.dispatch.id,
                f.dispatch.version,
                f.dispatch.mark_sent("pm-1".into(), NOW),
            )
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(_) => {}
            other => panic!("unexpected {other:?}"),
        }

        f.sender.process(intent_for(&f.dispatch)).await.unwrap();

        assert!(f.gateway.sent.lock().unwrap().is_empty());
        let stored = fetch(&f.store, f.dispatch.id).await;
        assert_eq!(stored.provider_message_id.as_deref(), Some("pm-1"));
    }
}
