//! Cascade policy: when a dispatch has stalled and where it goes next.
//!
//! Pure functions over the campaign's channel plan; the escalation
//! scheduler is the only caller that acts on the answers, which keeps the
//! policy free of any store or clock dependency.

use time::OffsetDateTime;

use crate::entities::campaign::ChannelStep;
use crate::entities::{Channel, DeliveryStatus};

/// Statuses that may stall on a channel and be escalated past once the
/// channel's threshold elapses. Positive outcomes (`Delivered`, `Read`) and
/// both terminal states are excluded; so is `Queued`, which has no send
/// clock running.
pub fn is_escalable(status: DeliveryStatus) -> bool {
    matches!(
        status,
        DeliveryStatus::Sent
            | DeliveryStatus::Ringing
            | DeliveryStatus::NoAnswer
            | DeliveryStatus::Undeliverable
    )
}

/// True iff a dispatch sitting on `step` with `status` since `sent_at` has
/// stalled: the status is a non-positive outcome and the channel's
/// escalation threshold has fully elapsed.
pub fn should_escalate(
    step: &ChannelStep,
    status: DeliveryStatus,
    sent_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> bool {
    if !is_escalable(status) {
        return false;
    }
    let Some(sent_at) = sent_at else {
        return false;
    };
    now - sent_at >= step.escalation_threshold
}

/// The step immediately after `current` in the plan, or `None` when
/// `current` is the last step (a single-step plan always yields `None`).
///
/// `current` not being a member of the plan violates the dispatch invariant
/// and is a programming error, not a runtime case.
pub fn next_step(plan: &[ChannelStep], current: Channel) -> Option<&ChannelStep> {
    let idx = plan.iter().position(|s| s.channel == current);
    debug_assert!(
        idx.is_some(),
        "dispatch channel {current} is not in the campaign plan"
    );
    plan.get(idx? + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    fn step(channel: Channel, threshold: Duration) -> ChannelStep {
        ChannelStep {
            channel,
            escalation_threshold: threshold,
            content: "hello".to_string(),
        }
    }

    #[test]
    fn escalates_once_threshold_elapsed() {
        let s = step(Channel::Chat, Duration::hours(2));
        let sent_at = datetime!(2025-06-01 10:00 UTC);

        let before = datetime!(2025-06-01 11:59 UTC);
        assert!(!should_escalate(&s, DeliveryStatus::Sent, Some(sent_at), before));

        // Boundary is inclusive: exactly at the threshold is stalled.
        let at = datetime!(2025-06-01 12:00 UTC);
        assert!(should_escalate(&s, DeliveryStatus::Sent, Some(sent_at), at));

        let after = datetime!(2025-06-01 14:00 UTC);
        assert!(should_escalate(&s, DeliveryStatus::NoAnswer, Some(sent_at), after));
        assert!(should_escalate(&s, DeliveryStatus::Ringing, Some(sent_at), after));
        assert!(should_escalate(&s, DeliveryStatus::Undeliverable, Some(sent_at), after));
    }

    #[test]
    fn positive_outcomes_never_escalate() {
        let s = step(Channel::Chat, Duration::minutes(1));
        let sent_at = datetime!(2025-06-01 10:00 UTC);
        let much_later = datetime!(2025-06-02 10:00 UTC);

        assert!(!should_escalate(&s, DeliveryStatus::Read, Some(sent_at), much_later));
        assert!(!should_escalate(&s, DeliveryStatus::Delivered, Some(sent_at), much_later));
    }

    #[test]
    fn terminal_and_queued_never_escalate() {
        let s = step(Channel::Voice, Duration::minutes(30));
        let sent_at = datetime!(2025-06-01 10:00 UTC);
        let much_later = datetime!(2025-06-02 10:00 UTC);

        assert!(!should_escalate(&s, DeliveryStatus::Failed, Some(sent_at), much_later));
        // Queued means the send was never accepted; there is no clock to run out.
        assert!(!should_escalate(&s, DeliveryStatus::Queued, None, much_later));
    }

    #[test]
    fn next_step_walks_forward_only() {
        let plan = vec![
            step(Channel::Chat, Duration::hours(2)),
            step(Channel::Sms, Duration::hours(1)),
            step(Channel::Voice, Duration::minutes(30)),
        ];

        assert_eq!(next_step(&plan, Channel::Chat).map(|s| s.channel), Some(Channel::Sms));
        assert_eq!(next_step(&plan, Channel::Sms).map(|s| s.channel), Some(Channel::Voice));
        assert_eq!(next_step(&plan, Channel::Voice).map(|s| s.channel), None);
    }

    #[test]
    fn single_step_plan_never_yields_a_next_channel() {
        let plan = vec![step(Channel::Voice, Duration::minutes(30))];
        assert!(next_step(&plan, Channel::Voice).is_none());
    }
}
