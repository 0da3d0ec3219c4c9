pub mod campaign;
pub mod dispatch;
pub mod recipient;

use ordis_sdk::objects::{Channel as SdkChannel, DeliveryStatus as SdkDeliveryStatus};

/// Outreach channel for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `ordis_sdk::objects::Channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "channel_name")]
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

impl From<Channel> for SdkChannel {
    fn from(value: Channel) -> Self {
        match value {
            Channel::Chat => SdkChannel::Chat,
            Channel::Sms => SdkChannel::Sms,
            Channel::Voice => SdkChannel::Voice,
        }
    }
}

impl From<SdkChannel> for Channel {
    fn from(value: SdkChannel) -> Self {
        match value {
            SdkChannel::Chat => Channel::Chat,
            SdkChannel::Sms => Channel::Sms,
            SdkChannel::Voice => Channel::Voice,
        }
    }
}

/// Canonical delivery status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `ordis_sdk::objects::DeliveryStatus`.
///
/// `Undeliverable` is a failure of the current channel attempt and leaves
/// the cascade free to advance; `Failed` is the terminal state of the whole
/// dispatch (cascade exhausted or recipient opted out) and is immutable
/// once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "delivery_status")]
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

    /// Terminal statuses never change again: `Failed`, or the `Read`
    /// conversion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Failed | DeliveryStatus::Read)
    }

    /// Positive outcomes. A dispatch with a positive status must never be
    /// escalated.
    pub fn is_positive(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Read)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DeliveryStatus> for SdkDeliveryStatus {
    fn from(value: DeliveryStatus) -> Self {
        match value {
            DeliveryStatus::Queued => SdkDeliveryStatus::Queued,
            DeliveryStatus::Sent => SdkDeliveryStatus::Sent,
            DeliveryStatus::Delivered => SdkDeliveryStatus::Delivered,
            DeliveryStatus::Read => SdkDeliveryStatus::Read,
            DeliveryStatus::Ringing => SdkDeliveryStatus::Ringing,
            DeliveryStatus::NoAnswer => SdkDeliveryStatus::NoAnswer,
            DeliveryStatus::Undeliverable => SdkDeliveryStatus::Undeliverable,
            DeliveryStatus::Failed => SdkDeliveryStatus::Failed,
        }
    }
}

impl From<SdkDeliveryStatus> for DeliveryStatus {
    fn from(value: SdkDeliveryStatus) -> Self {
        match value {
            SdkDeliveryStatus::Queued => DeliveryStatus::Queued,
            SdkDeliveryStatus::Sent => DeliveryStatus::Sent,
            SdkDeliveryStatus::Delivered => DeliveryStatus::Delivered,
            SdkDeliveryStatus::Read => DeliveryStatus::Read,
            SdkDeliveryStatus::Ringing => DeliveryStatus::Ringing,
            SdkDeliveryStatus::NoAnswer => DeliveryStatus::NoAnswer,
            SdkDeliveryStatus::Undeliverable => DeliveryStatus::Undeliverable,
            SdkDeliveryStatus::Failed => DeliveryStatus::Failed,
        }
    }
}
