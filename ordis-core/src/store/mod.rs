//! Storage ports for dispatch state.
//!
//! The dispatch store is the sole shared mutable resource in the engine.
//! Every mutation is expressed as "read the current version, compute the new
//! state, write only if the stored version still matches" — optimistic
//! concurrency. That contract is what keeps concurrent escalation passes and
//! webhook ingests from both acting on the same dispatch: exactly one
//! racing writer gets [`UpdateOutcome::Applied`], the other gets
//! [`UpdateOutcome::Conflict`] and must re-evaluate from fresh state.
//!
//! Writes to a single dispatch are linearized by the backing
//! implementation; there is no ordering guarantee across dispatches.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use ordis_sdk::objects::StatusCounts;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::DeliveryStatus;
use crate::entities::campaign::Campaign;
use crate::entities::dispatch::{Dispatch, DispatchChange};
use crate::entities::recipient::Recipient;

/// Errors that can occur in a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a create-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// No dispatch existed for this (campaign, recipient); one was created.
    Created(Dispatch),
    /// A dispatch already existed; nothing was written.
    AlreadyExists(Dispatch),
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write was applied; the stored dispatch after the write.
    Applied(Dispatch),
    /// The stored version no longer matches what the caller read.
    Conflict,
    /// The dispatch is terminally failed and immutable.
    Terminal,
    /// No dispatch with that id.
    Missing,
}

/// Dispatch persistence port.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Create-if-absent, keyed on (campaign, recipient). Idempotent: a
    /// second call for the same pair returns the existing dispatch.
    async fn create(&self, dispatch: Dispatch) -> Result<CreateOutcome, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Dispatch>, StoreError>;

    /// Correlation lookup for inbound provider events.
    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Dispatch>, StoreError>;

    /// All dispatches whose status is one of `statuses`, across campaigns.
    async fn scan_by_status(
        &self,
        statuses: &[DeliveryStatus],
    ) -> Result<Vec<Dispatch>, StoreError>;

    /// Conditional write: applies `change` iff the stored version equals
    /// `expected_version` and the dispatch is not terminally failed.
    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        change: DispatchChange,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Per-status dispatch counts for one campaign.
    async fn count_by_status(&self, campaign_id: Uuid) -> Result<StatusCounts, StoreError>;
}

/// Campaign read port. Campaign authoring lives outside the engine; the only
/// write the engine ever performs is recording the first launch time.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    /// Record the first launch time. Later launches keep the original.
    async fn mark_started(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError>;
}

/// Recipient snapshot port. Opt-out state is owned by the integrator's
/// audience system; the engine keeps a snapshot so the scheduler can
/// short-circuit recipients who opt out mid-cascade.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Recipient>, StoreError>;

    /// Record or refresh the engine's snapshot of a recipient.
    async fn upsert(&self, recipient: Recipient) -> Result<(), StoreError>;
}
