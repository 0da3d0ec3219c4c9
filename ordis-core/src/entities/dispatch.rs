use compact_str::CompactString;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Channel, DeliveryStatus};

/// The per-recipient, per-campaign record tracking progress through the
/// cascade. One row per (campaign, recipient); never deleted — terminal
/// dispatches remain as the audit trail of the outreach.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Dispatch {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub recipient_id: CompactString,
    /// Always a member of the owning campaign's channel plan, and only ever
    /// moves forward along it.
    pub current_channel: Channel,
    pub status: DeliveryStatus,
    /// Provider-assigned id of the most recent send attempt; the correlation
    /// key for inbound events. Kept across an escalation (so late events for
    /// the old channel still resolve to this dispatch and can be discarded
    /// deliberately) until the next send overwrites it.
    pub provider_message_id: Option<CompactString>,
    /// DTMF/keypad reply captured on the voice channel, if any.
    pub response: Option<CompactString>,
    /// When the most recent send attempt on `current_channel` was accepted;
    /// absent while `status` is `Queued`.
    pub sent_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Optimistic-concurrency token; bumped by every store write.
    pub version: i64,
}

impl Dispatch {
    /// A fresh dispatch, queued on the campaign's first channel.
    pub fn new(
        campaign_id: Uuid,
        recipient_id: CompactString,
        channel: Channel,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            campaign_id,
            recipient_id,
            current_channel: channel,
            status: DeliveryStatus::Queued,
            provider_message_id: None,
            response: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Snapshot the mutable fields as a change to be written back under
    /// compare-and-swap.
    pub fn change(&self) -> DispatchChange {
        DispatchChange {
            current_channel: self.current_channel,
            status: self.status,
            provider_message_id: self.provider_message_id.clone(),
            response: self.response.clone(),
            sent_at: self.sent_at,
            updated_at: self.updated_at,
        }
    }

    /// The provider accepted a send on the current channel.
    pub fn mark_sent(
        &self,
        provider_message_id: CompactString,
        now: OffsetDateTime,
    ) -> DispatchChange {
        DispatchChange {
            status: DeliveryStatus::Sent,
            provider_message_id: Some(provider_message_id),
            sent_at: Some(now),
            updated_at: now,
            ..self.change()
        }
    }

    /// The provider permanently refused the send. The send clock starts
    /// anyway so the channel threshold can elapse and the cascade advance.
    pub fn mark_undeliverable(&self, now: OffsetDateTime) -> DispatchChange {
        DispatchChange {
            status: DeliveryStatus::Undeliverable,
            sent_at: Some(now),
            updated_at: now,
            ..self.change()
        }
    }

    /// Escalation: move to the next channel, re-queued for a fresh send.
    pub fn advance_to(&self, channel: Channel, now: OffsetDateTime) -> DispatchChange {
        DispatchChange {
            current_channel: channel,
            status: DeliveryStatus::Queued,
            sent_at: None,
            updated_at: now,
            ..self.change()
        }
    }

    /// Terminal failure: cascade exhausted, or the recipient opted out.
    pub fn mark_failed(&self, now: OffsetDateTime) -> DispatchChange {
        DispatchChange {
            status: DeliveryStatus::Failed,
            updated_at: now,
            ..self.change()
        }
    }
}

/// The mutable portion of a dispatch, applied by the store only if the
/// version the caller read is still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchChange {
    pub current_channel: Channel,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<CompactString>,
    pub response: Option<CompactString>,
    pub sent_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}
