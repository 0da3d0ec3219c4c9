//! In-memory store implementation.
//!
//! Backs all three storage ports from a single mutex-guarded state, which
//! trivially linearizes writes per dispatch. Used by tests and single-node
//! development runs; production deployments use [`PgStore`](super::PgStore).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use compact_str::CompactString;
use ordis_sdk::objects::StatusCounts;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CampaignStore, CreateOutcome, DispatchStore, RecipientDirectory, StoreError, UpdateOutcome,
};
use crate::entities::DeliveryStatus;
use crate::entities::campaign::Campaign;
use crate::entities::dispatch::{Dispatch, DispatchChange};
use crate::entities::recipient::Recipient;

#[derive(Default)]
struct MemoryState {
    /// All dispatches, single source of truth.
    dispatches: HashMap<Uuid, Dispatch>,
    campaigns: HashMap<Uuid, Campaign>,
    recipients: HashMap<CompactString, Recipient>,
}

/// In-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a campaign. Campaign authoring is external to the engine, so
    /// this is not part of the [`CampaignStore`] port.
    pub async fn insert_campaign(&self, campaign: Campaign) {
        let mut state = self.state.lock().await;
        state.campaigns.insert(campaign.id, campaign);
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn create(&self, dispatch: Dispatch) -> Result<CreateOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let existing = state
            .dispatches
            .values()
            .find(|d| {
                d.campaign_id == dispatch.campaign_id && d.recipient_id == dispatch.recipient_id
            })
            .cloned();
        if let Some(existing) = existing {
            return Ok(CreateOutcome::AlreadyExists(existing));
        }
        state.dispatches.insert(dispatch.id, dispatch.clone());
        Ok(CreateOutcome::Created(dispatch))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Dispatch>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.dispatches.get(&id).cloned())
    }

    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Dispatch>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .dispatches
            .values()
            .find(|d| d.provider_message_id.as_deref() == Some(provider_message_id))
            .cloned())
    }

    async fn scan_by_status(
        &self,
        statuses: &[DeliveryStatus],
    ) -> Result<Vec<Dispatch>, StoreError> {
        let state = self.state.lock().await;
        let mut matches: Vec<Dispatch> = state
            .dispatches
            .values()
            .filter(|d| statuses.contains(&d.status))
            .cloned()
            .collect();
        // Stable scan order keeps pass summaries deterministic in tests.
        matches.sort_by_key(|d| d.id);
        Ok(matches)
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        change: DispatchChange,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.dispatches.get_mut(&id) else {
            return Ok(UpdateOutcome::Missing);
        };
        if stored.status == DeliveryStatus::Failed {
            return Ok(UpdateOutcome::Terminal);
        }
        if stored.version != expected_version {
            return Ok(UpdateOutcome::Conflict);
        }
        stored.current_channel = change.current_channel;
        stored.status = change.status;
        stored.provider_message_id = change.provider_message_id;
        stored.response = change.response;
        stored.sent_at = change.sent_at;
        stored.updated_at = change.updated_at;
        stored.version += 1;
        Ok(UpdateOutcome::Applied(stored.clone()))
    }

    async fn count_by_status(&self, campaign_id: Uuid) -> Result<StatusCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = StatusCounts::default();
        for dispatch in state.dispatches.values() {
            if dispatch.campaign_id != campaign_id {
                continue;
            }
            match dispatch.status {
                DeliveryStatus::Queued => counts.queued += 1,
                DeliveryStatus::Sent => counts.sent += 1,
                DeliveryStatus::Delivered => counts.delivered += 1,
                DeliveryStatus::Read => counts.read += 1,
                DeliveryStatus::Ringing => counts.ringing += 1,
                DeliveryStatus::NoAnswer => counts.no_answer += 1,
                DeliveryStatus::Undeliverable => counts.undeliverable += 1,
                DeliveryStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.campaigns.get(&id).cloned())
    }

    async fn mark_started(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(campaign) = state.campaigns.get_mut(&id)
            && campaign.started_at.is_none()
        {
            campaign.started_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl RecipientDirectory for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Recipient>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.recipients.get(id).cloned())
    }

    async fn upsert(&self, recipient: Recipient) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.recipients.insert(recipient.id.clone(), recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Channel;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-01 10:00 UTC);

    fn dispatch() -> Dispatch {
        Dispatch::new(Uuid::new_v4(), "r-1".into(), Channel::Chat, NOW)
    }

    #[tokio::test]
    async fn create_is_idempotent_per_campaign_recipient() {
        let store = MemoryStore::new();
        let first = dispatch();
        let campaign_id = first.campaign_id;

        let created = store.create(first.clone()).await.unwrap();
        assert!(matches!(created, CreateOutcome::Created(_)));

        // Same pair, different dispatch id: must not create a duplicate.
        let duplicate = Dispatch::new(campaign_id, "r-1".into(), Channel::Chat, NOW);
        match store.create(duplicate).await.unwrap() {
            CreateOutcome::AlreadyExists(existing) => assert_eq!(existing.id, first.id),
            CreateOutcome::Created(_) => panic!("duplicate dispatch created"),
        }
    }

    #[tokio::test]
    async fn update_rejects_stale_version() {
        let store = MemoryStore::new();
        let d = dispatch();
        store.create(d.clone()).await.unwrap();

        let winner = store
            .update(d.id, d.version, d.mark_sent("pm-1".into(), NOW))
            .await
            .unwrap();
        let winner = match winner {
            UpdateOutcome::Applied(updated) => updated,
            other => panic!("expected Applied, got {other:?}"),
        };
        assert_eq!(winner.version, d.version + 1);

        // A second writer still holding the old version loses.
        let loser = store
            .update(d.id, d.version, d.mark_failed(NOW))
            .await
            .unwrap();
        assert_eq!(loser, UpdateOutcome::Conflict);
    }

    #[tokio::test]
    async fn failed_dispatch_is_immutable() {
        let store = MemoryStore::new();
        let d = dispatch();
        store.create(d.clone()).await.unwrap();

        let failed = match store
            .update(d.id, d.version, d.mark_failed(NOW))
            .await
            .unwrap()
        {
            UpdateOutcome::Applied(updated) => updated,
            other => panic!("expected Applied, got {other:?}"),
        };

        // Even a correctly-versioned write is refused now.
        let outcome = store
            .update(failed.id, failed.version, failed.mark_sent("pm-2".into(), NOW))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Terminal);
    }

    #[tokio::test]
    async fn provider_message_id_lookup() {
        let store = MemoryStore::new();
        let d = dispatch();
        store.create(d.clone()).await.unwrap();
        store
            .update(d.id, d.version, d.mark_sent("pm-42".into(), NOW))
            .await
            .unwrap();

        let found = store.find_by_provider_message_id("pm-42").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(d.id));
        assert!(
            store
                .find_by_provider_message_id("pm-unknown")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn scan_filters_by_status() {
        let store = MemoryStore::new();
        let a = dispatch();
        let b = Dispatch::new(a.campaign_id, "r-2".into(), Channel::Chat, NOW);
        store.create(a.clone()).await.unwrap();
        store.create(b.clone()).await.unwrap();
        store
            .update(a.id, a.version, a.mark_sent("pm-1".into(), NOW))
            .await
            .unwrap();

        let queued = store
            .scan_by_status(&[DeliveryStatus::Queued])
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, b.id);
    }
}
