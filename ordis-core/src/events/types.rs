//! Event type definitions for the dispatch pipeline.
//!
//! Events are idempotent and ephemeral. They carry identifiers rather than
//! full state; consumers re-read the dispatch store before acting, so a
//! stale or duplicated event is harmless.

use compact_str::CompactString;
use uuid::Uuid;

use crate::entities::Channel;

/// Emitted whenever a dispatch needs a message transmitted on its current
/// channel: once at creation, and again after every escalation or queued
/// resend.
///
/// The OutboundSender validates against current store state before sending,
/// so an intent that outlived its dispatch (already escalated, already
/// answered) is simply dropped.
#[derive(Debug, Clone)]
pub struct SendIntent {
    pub dispatch_id: Uuid,
    pub campaign_id: Uuid,
    pub recipient_id: CompactString,
    pub channel: Channel,
}
