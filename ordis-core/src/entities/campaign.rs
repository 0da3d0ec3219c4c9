use smallvec::SmallVec;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::Channel;

/// One step of a campaign's cascade: the channel, how long a non-positive
/// outcome may sit on it before the scheduler moves past it, and the message
/// body handed to the channel provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStep {
    pub channel: Channel,
    pub escalation_threshold: Duration,
    pub content: String,
}

/// A campaign. Read-only to the engine except for `started_at`, which is
/// recorded once on first launch.
///
/// The channel plan is ordered, non-empty, with distinct channels; the
/// campaign authoring side validates this before the campaign ever reaches
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub channel_plan: SmallVec<[ChannelStep; 4]>,
    pub started_at: Option<OffsetDateTime>,
}

impl Campaign {
    /// The plan step for `channel`, if the campaign uses that channel.
    pub fn step(&self, channel: Channel) -> Option<&ChannelStep> {
        self.channel_plan.iter().find(|s| s.channel == channel)
    }
}
