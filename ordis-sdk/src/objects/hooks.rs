//! Inbound provider webhook payloads, one shape per channel.
//!
//! Each channel provider delivers callbacks in its own vocabulary; the
//! server normalizes these into the canonical [`DeliveryStatus`]
//! (`ordis-core::normalize`). Event names unknown to the normalizer are
//! accepted and ignored, never an error — providers add vocabulary faster
//! than we do.
//!
//! [`DeliveryStatus`]: super::channels::DeliveryStatus

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// `POST /hooks/chat` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHookEvent {
    /// Provider-assigned message id from the original send.
    pub message_id: CompactString,
    /// Provider event name: `sent`, `delivered`, `read`, `failed`, ...
    pub event: CompactString,
}

/// `POST /hooks/sms` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsHookEvent {
    pub message_id: CompactString,
    /// Provider event name: `sent`, `delivered`, `failed`, ...
    pub event: CompactString,
}

/// `POST /hooks/voice` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceHookEvent {
    /// Provider-assigned call id from the original dial.
    pub call_id: CompactString,
    /// Provider event name: `ringing`, `answered`, `completed`,
    /// `no-answer`, `busy`, `failed`, ...
    pub event: CompactString,
    /// Keypad digits pressed by the callee, recorded alongside the event.
    #[serde(default)]
    pub dtmf: Option<CompactString>,
}

/// Outcome of ingesting one provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    /// The event was applied to a dispatch.
    Applied,
    /// No dispatch matched the provider message id.
    Unmatched,
    /// The event was recognized but discarded (late, stale, or unknown
    /// vocabulary).
    Ignored,
}

/// Hook endpoint response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub outcome: IngestOutcome,
}
