//! Channel status normalizer.
//!
//! Each channel provider reports delivery events in its own vocabulary;
//! these tables map them to the canonical [`DeliveryStatus`]. The mappings
//! are total over each provider's *known* vocabulary and return `None` for
//! anything else — an unknown event name is accepted and ignored upstream,
//! never an error, because providers grow vocabulary faster than we do.
//!
//! Provider "failed"/"busy" events map to [`DeliveryStatus::Undeliverable`]
//! (the current channel attempt failed); the terminal
//! [`DeliveryStatus::Failed`] is only ever written by the escalation
//! scheduler when the cascade is exhausted or the recipient opted out.

use crate::entities::{Channel, DeliveryStatus};

/// Normalize a provider event name for `channel` into the canonical status.
pub fn normalize(channel: Channel, event: &str) -> Option<DeliveryStatus> {
    match channel {
        Channel::Chat => chat_status(event),
        Channel::Sms => sms_status(event),
        Channel::Voice => voice_status(event),
    }
}

/// Chat provider vocabulary.
pub fn chat_status(event: &str) -> Option<DeliveryStatus> {
    match event {
        "sent" => Some(DeliveryStatus::Sent),
        "delivered" => Some(DeliveryStatus::Delivered),
        "read" => Some(DeliveryStatus::Read),
        "failed" => Some(DeliveryStatus::Undeliverable),
        _ => None,
    }
}

/// SMS provider vocabulary.
pub fn sms_status(event: &str) -> Option<DeliveryStatus> {
    match event {
        "sent" => Some(DeliveryStatus::Sent),
        "delivered" => Some(DeliveryStatus::Delivered),
        "failed" => Some(DeliveryStatus::Undeliverable),
        _ => None,
    }
}

/// Voice provider vocabulary. An answered or completed call counts as
/// delivered; DTMF digits travel beside the event, not as a status.
pub fn voice_status(event: &str) -> Option<DeliveryStatus> {
    match event {
        "ringing" => Some(DeliveryStatus::Ringing),
        "answered" | "completed" => Some(DeliveryStatus::Delivered),
        "no-answer" => Some(DeliveryStatus::NoAnswer),
        "busy" | "failed" => Some(DeliveryStatus::Undeliverable),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_vocabulary() {
        assert_eq!(chat_status("sent"), Some(DeliveryStatus::Sent));
        assert_eq!(chat_status("delivered"), Some(DeliveryStatus::Delivered));
        assert_eq!(chat_status("read"), Some(DeliveryStatus::Read));
        assert_eq!(chat_status("failed"), Some(DeliveryStatus::Undeliverable));
    }

    #[test]
    fn sms_vocabulary() {
        assert_eq!(sms_status("sent"), Some(DeliveryStatus::Sent));
        assert_eq!(sms_status("delivered"), Some(DeliveryStatus::Delivered));
        assert_eq!(sms_status("failed"), Some(DeliveryStatus::Undeliverable));
        // Chat-only vocabulary does not leak into SMS.
        assert_eq!(sms_status("read"), None);
    }

    #[test]
    fn voice_vocabulary() {
        assert_eq!(voice_status("ringing"), Some(DeliveryStatus::Ringing));
        assert_eq!(voice_status("answered"), Some(DeliveryStatus::Delivered));
        assert_eq!(voice_status("completed"), Some(DeliveryStatus::Delivered));
        assert_eq!(voice_status("no-answer"), Some(DeliveryStatus::NoAnswer));
        assert_eq!(voice_status("busy"), Some(DeliveryStatus::Undeliverable));
        assert_eq!(voice_status("failed"), Some(DeliveryStatus::Undeliverable));
    }

    #[test]
    fn unknown_vocabulary_is_ignored_not_an_error() {
        assert_eq!(normalize(Channel::Chat, "typing_indicator"), None);
        assert_eq!(normalize(Channel::Sms, ""), None);
        assert_eq!(normalize(Channel::Voice, "voicemail-drop"), None);
    }
}
