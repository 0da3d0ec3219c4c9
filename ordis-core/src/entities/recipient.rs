use compact_str::CompactString;
use ordis_sdk::objects::RecipientPayload;

use super::Channel;

/// A recipient snapshot from the integrator's audience system.
///
/// The engine never flips `opted_out` itself; it only reads it. An opted-out
/// recipient must never receive or retain an active dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: CompactString,
    pub opted_out: bool,
    pub chat_id: Option<CompactString>,
    pub phone: Option<CompactString>,
    pub tags: Vec<CompactString>,
}

impl Recipient {
    /// The contact point a channel provider needs for this recipient, if the
    /// recipient has one. SMS and voice share the phone number.
    pub fn contact(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Chat => self.chat_id.as_deref(),
            Channel::Sms | Channel::Voice => self.phone.as_deref(),
        }
    }
}

impl From<RecipientPayload> for Recipient {
    fn from(value: RecipientPayload) -> Self {
        Self {
            id: value.id,
            opted_out: value.opted_out,
            chat_id: value.chat_id,
            phone: value.phone,
            tags: value.tags,
        }
    }
}
