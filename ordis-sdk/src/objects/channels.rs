//! Channel and delivery-status wire vocabulary.
//!
//! These are the API/DTO versions shared with integrators. The server core
//! carries its own database-typed twins; see `ordis-core::entities`.

use serde::{Deserialize, Serialize};

/// An outreach channel in a campaign's cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Chat,
    Sms,
    Voice,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Chat => "chat",
            Channel::Sms => "sms",
            Channel::Voice => "voice",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical delivery status, independent of any provider's native
/// event names.
///
/// `undeliverable` is a failure of the *current channel attempt* (the
/// cascade may still advance); `failed` means the whole dispatch is
/// terminally done — cascade exhausted or the recipient opted out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Ringing,
    NoAnswer,
    Undeliverable,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Queued => "queued",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Ringing => "ringing",
            DeliveryStatus::NoAnswer => "no_answer",
            DeliveryStatus::Undeliverable => "undeliverable",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
