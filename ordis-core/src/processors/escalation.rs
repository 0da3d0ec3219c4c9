//! EscalationScheduler processor.
//!
//! The EscalationScheduler is responsible for:
//! - Scanning dispatches that are awaiting an outcome on their current
//!   channel
//! - Applying the cascade policy: advancing stalled dispatches to the next
//!   channel, or failing them when the cascade is exhausted
//! - Short-circuiting dispatches whose recipient opted out mid-cascade
//! - Re-emitting `SendIntent` for queued dispatches whose send was never
//!   accepted by the provider
//!
//! Every transition is a compare-and-swap against the version read at scan
//! time; a conflict (a webhook landed first, another scheduler got there)
//! is re-evaluated from fresh state a bounded number of times. One
//! dispatch's failure never aborts the rest of the pass, and running a pass
//! twice with no intervening events transitions nothing twice.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cascade;
use crate::entities::DeliveryStatus;
use crate::entities::campaign::Campaign;
use crate::entities::dispatch::Dispatch;
use crate::events::{SendIntent, SendIntentSender};
use crate::store::{CampaignStore, DispatchStore, RecipientDirectory, StoreError, UpdateOutcome};
use crate::utils::pass_interval::pass_interval;

/// Statuses the pass scans for. Terminal `failed` is excluded outright
/// rather than filtered by the policy; `queued` is included so sends the
/// provider never accepted get retried.
pub const SCAN_STATUSES: [DeliveryStatus; 5] = [
    DeliveryStatus::Queued,
    DeliveryStatus::Sent,
    DeliveryStatus::Ringing,
    DeliveryStatus::NoAnswer,
    DeliveryStatus::Undeliverable,
];

/// How many times one dispatch's transition is re-evaluated from fresh
/// state after a compare-and-swap conflict before the pass gives up on it.
const CAS_MAX_ATTEMPTS: u32 = 3;

/// Random extra delay between passes, so concurrent schedulers spread out.
const MAX_JITTER_MS: u64 = 1_000;

/// A pass could not run at all (the store was unreachable for the scan).
/// Per-dispatch failures are counted in the summary instead.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Per-dispatch outcome counts for one escalation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Moved to the next channel.
    pub escalated: u32,
    /// Cascade exhausted; terminally failed.
    pub exhausted: u32,
    /// Queued send re-emitted.
    pub resent: u32,
    /// Recipient opted out mid-cascade; terminally failed.
    pub opted_out: u32,
    /// Not yet stalled (or resolved by the time fresh state was read).
    pub skipped: u32,
    /// Store errors and exhausted retry budgets.
    pub errored: u32,
}

impl PassSummary {
    /// Number of dispatches this pass actually wrote.
    pub fn transitions(&self) -> u32 {
        self.escalated + self.exhausted + self.opted_out
    }
}

enum Advance {
    Escalated,
    Exhausted,
    Resent,
    OptedOut,
    Skipped,
}

#[derive(Debug, Error)]
enum AdvanceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("concurrent updates exceeded the retry budget")]
    RetriesExhausted,

    #[error("dispatch channel is not in the campaign plan")]
    PlanMismatch,
}

/// EscalationScheduler advances the cascade for stalled dispatches.
pub struct EscalationScheduler {
    dispatches: Arc<dyn DispatchStore>,
    campaigns: Arc<dyn CampaignStore>,
    recipients: Arc<dyn RecipientDirectory>,
    send_intent_tx: SendIntentSender,
}

impl EscalationScheduler {
    pub fn new(
        dispatches: Arc<dyn DispatchStore>,
        campaigns: Arc<dyn CampaignStore>,
        recipients: Arc<dyn RecipientDirectory>,
        send_intent_tx: SendIntentSender,
    ) -> Self {
        Self {
            dispatches,
            campaigns,
            recipients,
            send_intent_tx,
        }
    }

    /// Run passes until shutdown is signaled.
    ///
    /// The delay between passes adapts: tight while transitions are
    /// happening, backed off once the book goes quiet.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("EscalationScheduler started");

        let mut last_transition = OffsetDateTime::now_utc();
        loop {
            let now = OffsetDateTime::now_utc();
            let interval = pass_interval(last_transition, now);
            let jitter = rand::rng().random_range(0..MAX_JITTER_MS);
            let sleep_duration = std::time::Duration::from_secs(
                interval.whole_seconds().max(1) as u64,
            ) + std::time::Duration::from_millis(jitter);

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("EscalationScheduler received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(sleep_duration) => {
                    let now = OffsetDateTime::now_utc();
                    match self.run_pass(now).await {
                        Ok(summary) => {
                            if summary.transitions() > 0 {
                                last_transition = now;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Escalation pass failed");
                        }
                    }
                }
            }
        }

        info!("EscalationScheduler shutdown complete");
    }

    /// One escalation pass over every dispatch awaiting an outcome.
    ///
    /// The pass as a whole only errors when the scan itself cannot run;
    /// each dispatch's outcome is recorded independently in the summary.
    pub async fn run_pass(&self, now: OffsetDateTime) -> Result<PassSummary, PassError> {
        let candidates = self.dispatches.scan_by_status(&SCAN_STATUSES).await?;

        let mut summary = PassSummary::default();
        let mut campaigns: HashMap<Uuid, Option<Campaign>> = HashMap::new();
        for dispatch in candidates {
            let campaign_id = dispatch.campaign_id;
            let campaign = match campaigns.get(&campaign_id) {
                Some(cached) => cached.clone(),
                None => {
                    let fetched = match self.campaigns.get(campaign_id).await {
                        Ok(c) => c,
                        Err(e) => {
                            error!(campaign_id = %campaign_id, error = %e, "Failed to load campaign");
                            summary.errored += 1;
                            continue;
                        }
                    };
                    campaigns.insert(campaign_id, fetched.clone());
                    fetched
                }
            };
            let Some(campaign) = campaign else {
                warn!(
                    campaign_id = %campaign_id,
                    dispatch_id = %dispatch.id,
                    "Dispatch references an unknown campaign"
                );
                summary.errored += 1;
                continue;
            };

            let dispatch_id = dispatch.id;
            match self.advance(dispatch, &campaign, now).await {
                Ok(Advance::Escalated) => summary.escalated += 1,
                Ok(Advance::Exhausted) => summary.exhausted += 1,
                Ok(Advance::Resent) => summary.resent += 1,
                Ok(Advance::OptedOut) => summary.opted_out += 1,
                Ok(Advance::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(dispatch_id = %dispatch_id, error = %e, "Failed to advance dispatch");
                    summary.errored += 1;
                }
            }
        }

        info!(
            escalated = summary.escalated,
            exhausted = summary.exhausted,
            resent = summary.resent,
            opted_out = summary.opted_out,
            skipped = summary.skipped,
            errored = summary.errored,
            "Escalation pass complete"
        );
        Ok(summary)
    }

    /// Decide and apply the transition for one dispatch, re-evaluating from
    /// fresh state after each compare-and-swap conflict.
    async fn advance(
        &self,
        mut dispatch: Dispatch,
        campaign: &Campaign,
        now: OffsetDateTime,
    ) -> Result<Advance, AdvanceError> {
        for _ in 0..CAS_MAX_ATTEMPTS {
            if dispatch.status.is_terminal() {
                return Ok(Advance::Skipped);
            }

            // Opt-out mid-cascade fails fast, regardless of thresholds.
            let opted_out = self
                .recipients
                .get(dispatch.recipient_id.as_str())
                .await?
                .is_some_and(|r| r.opted_out);
            if opted_out {
                match self
                    .dispatches
                    .update(dispatch.id, dispatch.version, dispatch.mark_failed(now))
                    .await?
                {
                    UpdateOutcome::Applied(_) => {
                        info!(
                            dispatch_id = %dispatch.id,
                            recipient_id = %dispatch.recipient_id,
                            "Recipient opted out, dispatch failed"
                        );
                        return Ok(Advance::OptedOut);
                    }
                    UpdateOutcome::Conflict => {
                        dispatch = match self.refetch(dispatch.id).await? {
                            Some(fresh) => fresh,
                            None => return Ok(Advance::Skipped),
                        };
                        continue;
                    }
                    UpdateOutcome::Terminal | UpdateOutcome::Missing => {
                        return Ok(Advance::Skipped);
                    }
                }
            }

            // A queued dispatch has no send clock running; ask the outbound
            // sender to try again.
            if dispatch.status == DeliveryStatus::Queued {
                self.emit_intent(&dispatch, dispatch.current_channel).await;
                return Ok(Advance::Resent);
            }

            let Some(step) = campaign.step(dispatch.current_channel) else {
                warn!(
                    dispatch_id = %dispatch.id,
                    channel = %dispatch.current_channel,
                    "Dispatch channel is not in the campaign plan"
                );
                return Err(AdvanceError::PlanMismatch);
            };
            if !cascade::should_escalate(step, dispatch.status, dispatch.sent_at, now) {
                return Ok(Advance::Skipped);
            }

            let outcome = match cascade::next_step(&campaign.channel_plan, dispatch.current_channel)
            {
                Some(next) => {
                    let next_channel = next.channel;
                    match self
                        .dispatches
                        .update(
                            dispatch.id,
                            dispatch.version,
                            dispatch.advance_to(next_channel, now),
                        )
                        .await?
                    {
                        UpdateOutcome::Applied(updated) => {
                            info!(
                                dispatch_id = %dispatch.id,
                                from = %dispatch.current_channel,
                                to = %next_channel,
                                "Dispatch escalated"
                            );
                            self.emit_intent(&updated, next_channel).await;
                            Some(Advance::Escalated)
                        }
                        UpdateOutcome::Conflict => None,
                        UpdateOutcome::Terminal | UpdateOutcome::Missing => Some(Advance::Skipped),
                    }
                }
                None => {
                    match self
                        .dispatches
                        .update(dispatch.id, dispatch.version, dispatch.mark_failed(now))
                        .await?
                    {
                        UpdateOutcome::Applied(_) => {
                            info!(
                                dispatch_id = %dispatch.id,
                                channel = %dispatch.current_channel,
                                "Cascade exhausted, dispatch failed"
                            );
                            Some(Advance::Exhausted)
                        }
                        UpdateOutcome::Conflict => None,
                        UpdateOutcome::Terminal | UpdateOutcome::Missing => Some(Advance::Skipped),
                    }
                }
            };

            match outcome {
                Some(advance) => return Ok(advance),
                None => {
                    // Lost the race; re-evaluate what the dispatch needs now.
                    debug!(dispatch_id = %dispatch.id, "Concurrent update, re-evaluating");
                    dispatch = match self.refetch(dispatch.id).await? {
                        Some(fresh) => fresh,
                        None => return Ok(Advance::Skipped),
                    };
                }
            }
        }

        Err(AdvanceError::RetriesExhausted)
    }

    async fn refetch(&self, id: Uuid) -> Result<Option<Dispatch>, StoreError> {
        Ok(self
            .dispatches
            .get(id)
            .await?
            .filter(|d| !d.status.is_terminal()))
    }

    async fn emit_intent(&self, dispatch: &Dispatch, channel: crate::entities::Channel) {
        let intent = SendIntent {
            dispatch_id: dispatch.id,
            campaign_id: dispatch.campaign_id,
            recipient_id: dispatch.recipient_id.clone(),
            channel,
        };
        if let Err(e) = self.send_intent_tx.send(intent).await {
            error!(
                dispatch_id = %dispatch.id,
                error = %e,
                "Failed to emit SendIntent"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Channel;
    use crate::entities::campaign::{Campaign, ChannelStep};
    use crate::entities::recipient::Recipient;
    use crate::events::{SendIntentReceiver, send_intent_channel};
    use crate::store::MemoryStore;
    use smallvec::smallvec;
    use time::Duration;
    use time::macros::datetime;

    const LAUNCH: OffsetDateTime = datetime!(2025-06-01 10:00 UTC);

    fn three_channel_campaign() -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            name: "renewal".to_string(),
            channel_plan: smallvec![
                ChannelStep {
                    channel: Channel::Chat,
                    escalation_threshold: Duration::hours(2),
                    content: "renew via chat".to_string(),
                },
                ChannelStep {
                    channel: Channel::Sms,
                    escalation_threshold: Duration::hours(1),
                    content: "renew via sms".to_string(),
                },
                ChannelStep {
                    channel: Channel::Voice,
                    escalation_threshold: Duration::minutes(30),
                    content: "renew via voice".to_string(),
                },
            ],
            started_at: None,
        }
    }

    struct Fixture {
        scheduler: EscalationScheduler,
        store: Arc<MemoryStore>,
        intent_rx: SendIntentReceiver,
        campaign_id: Uuid,
    }

    async fn fixture(campaign: Campaign) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let campaign_id = campaign.id;
        store.insert_campaign(campaign).await;
        let (tx, intent_rx) = send_intent_channel();
        let scheduler =
            EscalationScheduler::new(store.clone(), store.clone(), store.clone(), tx);
        Fixture {
            scheduler,
            store,
            intent_rx,
            campaign_id,
        }
    }

    /// Read a dispatch back, disambiguating from the campaign/recipient
    /// `get`s the memory store also implements.
    async fn fetch(store: &MemoryStore, id: Uuid) -> Dispatch {
        DispatchStore::get(store, id).await.unwrap().unwrap()
    }

    /// Create a dispatch and record the provider accepting its first send.
    async fn sent_dispatch(
        store: &MemoryStore,
        campaign_id: Uuid,
        recipient_id: &str,
        channel: Channel,
        provider_message_id: &str,
        sent_at: OffsetDateTime,
    ) -> Dispatch {
        let dispatch = Dispatch::new(campaign_id, recipient_id.into(), channel, sent_at);
        let created = match store.create(dispatch).await.unwrap() {
            crate::store::CreateOutcome::Created(d) => d,
            other => panic!("unexpected {other:?}"),
        };
        match store
            .update(
                created.id,
                created.version,
                created.mark_sent(provider_message_id.into(), sent_at),
            )
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(d) => d,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn cascade_walks_chat_sms_voice_then_fails() {
        let mut f = fixture(three_channel_campaign()).await;
        let d = sent_dispatch(&f.store, f.campaign_id, "r-1", Channel::Chat, "pm-1", LAUNCH).await;

        // 2h with no event on chat: escalate to sms.
        let now = LAUNCH + Duration::hours(2);
        let summary = f.scheduler.run_pass(now).await.unwrap();
        assert_eq!(summary.escalated, 1);

        let current = fetch(&f.store, d.id).await;
        assert_eq!(current.current_channel, Channel::Sms);
        assert_eq!(current.status, DeliveryStatus::Queued);
        assert!(current.sent_at.is_none());
        let intent = f.intent_rx.try_recv().unwrap();
        assert_eq!(intent.channel, Channel::Sms);

        // The provider accepts the sms send; 1h later with no event:
        // escalate to voice.
        let current = match f
            .store
            .update(current.id, current.version, current.mark_sent("pm-2".into(), now))
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(d) => d,
            other => panic!("unexpected {other:?}"),
        };
        let now = now + Duration::hours(1);
        let summary = f.scheduler.run_pass(now).await.unwrap();
        assert_eq!(summary.escalated, 1);
        let current = fetch(&f.store, current.id).await;
        assert_eq!(current.current_channel, Channel::Voice);
        assert_eq!(current.status, DeliveryStatus::Queued);

        // Voice accepted, 30m of silence: the cascade is exhausted.
        let current = match f
            .store
            .update(current.id, current.version, current.mark_sent("pm-3".into(), now))
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(d) => d,
            other => panic!("unexpected {other:?}"),
        };
        let now = now + Duration::minutes(30);
        let summary = f.scheduler.run_pass(now).await.unwrap();
        assert_eq!(summary.exhausted, 1);

        let terminal = fetch(&f.store, current.id).await;
        assert_eq!(terminal.status, DeliveryStatus::Failed);
        assert_eq!(terminal.current_channel, Channel::Voice);
    }

    #[tokio::test]
    async fn a_pass_before_the_threshold_changes_nothing() {
        let mut f = fixture(three_channel_campaign()).await;
        let d = sent_dispatch(&f.store, f.campaign_id, "r-1", Channel::Chat, "pm-1", LAUNCH).await;

        let summary = f
            .scheduler
            .run_pass(LAUNCH + Duration::minutes(119))
            .await
            .unwrap();
        assert_eq!(summary.escalated, 0);
        assert_eq!(summary.skipped, 1);

        let unchanged = fetch(&f.store, d.id).await;
        assert_eq!(unchanged.current_channel, Channel::Chat);
        assert_eq!(unchanged.status, DeliveryStatus::Sent);
        assert!(f.intent_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn a_read_dispatch_is_never_escalated() {
        let f = fixture(three_channel_campaign()).await;
        let d = sent_dispatch(&f.store, f.campaign_id, "r-1", Channel::Chat, "pm-1", LAUNCH).await;

        // The recipient read the chat message before the threshold.
        let mut change = d.change();
        change.status = DeliveryStatus::Read;
        match f.store.update(d.id, d.version, change).await.unwrap() {
            UpdateOutcome::Applied(_) => {}
            other => panic!("unexpected {other:?}"),
        }

        // Even far past every threshold, nothing moves.
        let summary = f
            .scheduler
            .run_pass(LAUNCH + Duration::days(7))
            .await
            .unwrap();
        assert_eq!(summary.transitions(), 0);

        let stored = fetch(&f.store, d.id).await;
        assert_eq!(stored.current_channel, Channel::Chat);
        assert_eq!(stored.status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn running_a_pass_twice_escalates_at_most_once() {
        let f = fixture(three_channel_campaign()).await;
        let d = sent_dispatch(&f.store, f.campaign_id, "r-1", Channel::Chat, "pm-1", LAUNCH).await;

        let now = LAUNCH + Duration::hours(2);
        let first = f.scheduler.run_pass(now).await.unwrap();
        assert_eq!(first.escalated, 1);

        // Immediately after, the dispatch is queued on sms with no send
        // clock; the second pass only re-emits the send intent.
        let second = f.scheduler.run_pass(now).await.unwrap();
        assert_eq!(second.escalated, 0);
        assert_eq!(second.resent, 1);

        let stored = fetch(&f.store, d.id).await;
        assert_eq!(stored.current_channel, Channel::Sms);
    }

    #[tokio::test]
    async fn single_channel_campaign_fails_directly() {
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: "voice-only".to_string(),
            channel_plan: smallvec![ChannelStep {
                channel: Channel::Voice,
                escalation_threshold: Duration::minutes(30),
                content: "call".to_string(),
            }],
            started_at: None,
        };
        let f = fixture(campaign).await;
        let d = sent_dispatch(&f.store, f.campaign_id, "r-1", Channel::Voice, "pm-1", LAUNCH).await;

        // The callee never picked up.
        let mut change = d.change();
        change.status = DeliveryStatus::NoAnswer;
        let d = match f.store.update(d.id, d.version, change).await.unwrap() {
            UpdateOutcome::Applied(updated) => updated,
            other => panic!("unexpected {other:?}"),
        };

        let summary = f
            .scheduler
            .run_pass(LAUNCH + Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.escalated, 0);

        let terminal = fetch(&f.store, d.id).await;
        assert_eq!(terminal.status, DeliveryStatus::Failed);
        assert_eq!(terminal.current_channel, Channel::Voice);
    }

    #[tokio::test]
    async fn opted_out_recipient_is_failed_fast() {
        let f = fixture(three_channel_campaign()).await;
        let d = sent_dispatch(&f.store, f.campaign_id, "r-1", Channel::Chat, "pm-1", LAUNCH).await;

        // The recipient opts out well before the chat threshold.
        f.store
            .upsert(Recipient {
                id: "r-1".into(),
                opted_out: true,
                chat_id: None,
                phone: None,
                tags: vec![],
            })
            .await
            .unwrap();

        let summary = f
            .scheduler
            .run_pass(LAUNCH + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(summary.opted_out, 1);

        let terminal = fetch(&f.store, d.id).await;
        assert_eq!(terminal.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn queued_dispatch_gets_its_send_retried() {
        let mut f = fixture(three_channel_campaign()).await;
        let dispatch = Dispatch::new(f.campaign_id, "r-1".into(), Channel::Chat, LAUNCH);
        f.store.create(dispatch.clone()).await.unwrap();

        let summary = f
            .scheduler
            .run_pass(LAUNCH + Duration::hours(6))
            .await
            .unwrap();
        assert_eq!(summary.resent, 1);
        assert_eq!(summary.transitions(), 0);

        let intent = f.intent_rx.try_recv().unwrap();
        assert_eq!(intent.dispatch_id, dispatch.id);
        assert_eq!(intent.channel, Channel::Chat);

        // Still queued on chat: resending is not an escalation.
        let stored = fetch(&f.store, dispatch.id).await;
        assert_eq!(stored.status, DeliveryStatus::Queued);
        assert_eq!(stored.current_channel, Channel::Chat);
    }
}
