//! EventIngestor processor.
//!
//! The EventIngestor is responsible for:
//! - Receiving asynchronous delivery/response events from channel providers
//! - Normalizing provider vocabulary into the canonical `DeliveryStatus`
//! - Locating the dispatch by provider message id and applying the status
//!   under compare-and-swap
//! - Discarding late events instead of reopening history: a terminal
//!   dispatch, or one that has advanced past the channel the event was sent
//!   on, is left untouched
//!
//! Provider events are inherently untrustworthy and arrive asynchronously
//! relative to the dispatch lifecycle, so "no dispatch matched" and
//! "unknown vocabulary" are soft outcomes, never errors.

use std::sync::Arc;

use compact_str::CompactString;
use kanau::processor::Processor;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::entities::Channel;
use crate::normalize::normalize;
use crate::store::{DispatchStore, StoreError, UpdateOutcome};

/// How many times an ingest re-checks applicability from fresh state after
/// a compare-and-swap conflict.
const CAS_MAX_ATTEMPTS: u32 = 3;

/// One provider event, normalized to channel + vocabulary + optional
/// keypad response.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub channel: Channel,
    pub provider_message_id: CompactString,
    pub event: CompactString,
    /// DTMF digits reported alongside a voice event.
    pub response: Option<CompactString>,
}

/// Outcome of ingesting one provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Applied to the matching dispatch.
    Applied,
    /// No dispatch carries this provider message id.
    Unmatched,
    /// Recognized but deliberately discarded (unknown vocabulary, terminal
    /// dispatch, or the dispatch already moved past the event's channel).
    Ignored,
}

impl From<IngestOutcome> for ordis_sdk::objects::IngestOutcome {
    fn from(value: IngestOutcome) -> Self {
        match value {
            IngestOutcome::Applied => Self::Applied,
            IngestOutcome::Unmatched => Self::Unmatched,
            IngestOutcome::Ignored => Self::Ignored,
        }
    }
}

/// Errors that can occur during ingest.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed payload: no correlation key.
    #[error("empty provider message id")]
    EmptyProviderMessageId,

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The dispatch kept changing under us; the provider will retry.
    #[error("concurrent updates exceeded the retry budget")]
    RetriesExhausted,
}

/// EventIngestor applies provider delivery events to dispatches.
pub struct EventIngestor {
    dispatches: Arc<dyn DispatchStore>,
}

impl EventIngestor {
    pub fn new(dispatches: Arc<dyn DispatchStore>) -> Self {
        Self { dispatches }
    }

    /// Ingest one provider event for `channel`.
    pub async fn ingest(
        &self,
        channel: Channel,
        provider_message_id: &str,
        event: &str,
        response: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<IngestOutcome, IngestError> {
        if provider_message_id.is_empty() {
            return Err(IngestError::EmptyProviderMessageId);
        }
        let Some(status) = normalize(channel, event) else {
            debug!(
                channel = %channel,
                event = event,
                "Unknown provider vocabulary, ignoring"
            );
            return Ok(IngestOutcome::Ignored);
        };

        for _ in 0..CAS_MAX_ATTEMPTS {
            let Some(dispatch) = self
                .dispatches
                .find_by_provider_message_id(provider_message_id)
                .await?
            else {
                debug!(
                    channel = %channel,
                    provider_message_id = provider_message_id,
                    "No dispatch for provider message id"
                );
                return Ok(IngestOutcome::Unmatched);
            };

            // Late events never reopen history: terminal dispatches and
            // dispatches already escalated past the event's channel keep
            // their state.
            if dispatch.status.is_terminal() || dispatch.current_channel != channel {
                debug!(
                    dispatch_id = %dispatch.id,
                    channel = %channel,
                    current_channel = %dispatch.current_channel,
                    status = %dispatch.status,
                    "Stale provider event, ignoring"
                );
                return Ok(IngestOutcome::Ignored);
            }

            let mut change = dispatch.change();
            change.status = status;
            change.updated_at = now;
            if let Some(dtmf) = response {
                change.response = Some(CompactString::from(dtmf));
            }

            match self
                .dispatches
                .update(dispatch.id, dispatch.version, change)
                .await?
            {
                UpdateOutcome::Applied(_) => {
                    info!(
                        dispatch_id = %dispatch.id,
                        channel = %channel,
                        status = %status,
                        "Provider event applied"
                    );
                    return Ok(IngestOutcome::Applied);
                }
                // Someone advanced the dispatch while we were deciding;
                // recompute whether the event still applies.
                UpdateOutcome::Conflict => continue,
                UpdateOutcome::Terminal | UpdateOutcome::Missing => {
                    return Ok(IngestOutcome::Ignored);
                }
            }
        }

        Err(IngestError::RetriesExhausted)
    }
}

impl Processor<InboundEvent> for EventIngestor {
    type Output = IngestOutcome;
    type Error = IngestError;

    async fn process(&self, event: InboundEvent) -> Result<IngestOutcome, IngestError> {
        self.ingest(
            event.channel,
            &event.provider_message_id,
            &event.event,
            event.response.as_deref(),
            OffsetDateTime::now_utc(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DeliveryStatus;
    use crate::entities::dispatch::Dispatch;
    use crate::store::{CreateOutcome, MemoryStore};
    use time::macros::datetime;
    use uuid::Uuid;

    const NOW: OffsetDateTime = datetime!(2025-06-01 10:00 UTC);

    async fn sent_dispatch(store: &MemoryStore, channel: Channel, pmid: &str) -> Dispatch {
        let dispatch = Dispatch::new(Uuid::new_v4(), "r-1".into(), channel, NOW);
        let created = match store.create(dispatch).await.unwrap() {
            CreateOutcome::Created(d) => d,
            other => panic!("unexpected {other:?}"),
        };
        match store
            .update(created.id, created.version, created.mark_sent(pmid.into(), NOW))
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(d) => d,
            other => panic!("unexpected {other:?}"),
        }
    }

    async fn fetch(store: &MemoryStore, id: Uuid) -> Dispatch {
        DispatchStore::get(store, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn delivery_event_is_applied() {
        let store = Arc::new(MemoryStore::new());
        let d = sent_dispatch(&store, Channel::Chat, "pm-1").await;
        let ingestor = EventIngestor::new(store.clone());

        let outcome = ingestor
            .ingest(Channel::Chat, "pm-1", "read", None, NOW)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Applied);
        assert_eq!(fetch(&store, d.id).await.status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn unknown_provider_message_id_is_soft() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = EventIngestor::new(store);

        let outcome = ingestor
            .ingest(Channel::Sms, "pm-ghost", "delivered", None, NOW)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Unmatched);
    }

    #[tokio::test]
    async fn unknown_vocabulary_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let d = sent_dispatch(&store, Channel::Chat, "pm-1").await;
        let ingestor = EventIngestor::new(store.clone());

        let outcome = ingestor
            .ingest(Channel::Chat, "pm-1", "typing_indicator", None, NOW)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored);
        assert_eq!(fetch(&store, d.id).await.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn event_for_an_outgrown_channel_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let d = sent_dispatch(&store, Channel::Chat, "pm-1").await;

        // The scheduler has since escalated this dispatch to sms; the chat
        // provider message id still resolves to it.
        match store
            .update(d.id, d.version, d.advance_to(Channel::Sms, NOW))
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(_) => {}
            other => panic!("unexpected {other:?}"),
        }

        let ingestor = EventIngestor::new(store.clone());
        let outcome = ingestor
            .ingest(Channel::Chat, "pm-1", "delivered", None, NOW)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored);

        let stored = fetch(&store, d.id).await;
        assert_eq!(stored.current_channel, Channel::Sms);
        assert_eq!(stored.status, DeliveryStatus::Queued);
    }

    #[tokio::test]
    async fn terminal_dispatch_ignores_late_events() {
        let store = Arc::new(MemoryStore::new());
        let d = sent_dispatch(&store, Channel::Voice, "pm-1").await;
        match store
            .update(d.id, d.version, d.mark_failed(NOW))
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(_) => {}
            other => panic!("unexpected {other:?}"),
        }

        let ingestor = EventIngestor::new(store.clone());
        let outcome = ingestor
            .ingest(Channel::Voice, "pm-1", "answered", None, NOW)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored);
        assert_eq!(fetch(&store, d.id).await.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn dtmf_response_is_recorded_alongside_the_status() {
        let store = Arc::new(MemoryStore::new());
        let d = sent_dispatch(&store, Channel::Voice, "pm-1").await;
        let ingestor = EventIngestor::new(store.clone());

        let outcome = ingestor
            .ingest(Channel::Voice, "pm-1", "completed", Some("1"), NOW)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Applied);

        let stored = fetch(&store, d.id).await;
        assert_eq!(stored.status, DeliveryStatus::Delivered);
        assert_eq!(stored.response.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn empty_provider_message_id_is_a_validation_error() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = EventIngestor::new(store);

        assert!(matches!(
            ingestor.ingest(Channel::Chat, "", "read", None, NOW).await,
            Err(IngestError::EmptyProviderMessageId)
        ));
    }
}
