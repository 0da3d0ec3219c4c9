//! Postgres store implementation.
//!
//! One row per dispatch. Conditional writes are expressed directly in SQL:
//! `WHERE version = $n AND status <> 'failed'`, so the version check, the
//! terminal-immutability guard, and the write commit atomically in a single
//! statement. Uses the runtime query API rather than the compile-time
//! macros so the crate builds without a reachable database.

use async_trait::async_trait;
use compact_str::CompactString;
use ordis_sdk::objects::StatusCounts;
use smallvec::SmallVec;
use sqlx::{PgPool, Row};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    CampaignStore, CreateOutcome, DispatchStore, RecipientDirectory, StoreError, UpdateOutcome,
};
use crate::entities::DeliveryStatus;
use crate::entities::campaign::{Campaign, ChannelStep};
use crate::entities::dispatch::{Dispatch, DispatchChange};
use crate::entities::recipient::Recipient;

/// All dispatch columns, in the order the row struct expects.
const DISPATCH_COLUMNS: &str = "id, campaign_id, recipient_id, current_channel, status, \
     provider_message_id, response, sent_at, created_at, updated_at, version";

/// Postgres-backed store for all three ports.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_by_campaign_recipient(
        &self,
        campaign_id: Uuid,
        recipient_id: &str,
    ) -> Result<Option<Dispatch>, StoreError> {
        let sql = format!(
            "SELECT {DISPATCH_COLUMNS} FROM dispatches \
             WHERE campaign_id = $1 AND recipient_id = $2"
        );
        let dispatch = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(campaign_id)
            .bind(recipient_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dispatch)
    }
}

#[async_trait]
impl DispatchStore for PgStore {
    async fn create(&self, dispatch: Dispatch) -> Result<CreateOutcome, StoreError> {
        // ON CONFLICT DO NOTHING makes launch idempotent per (campaign,
        // recipient) without a read-before-write race window.
        let result = sqlx::query(
            "INSERT INTO dispatches \
             (id, campaign_id, recipient_id, current_channel, status, \
              provider_message_id, response, sent_at, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (campaign_id, recipient_id) DO NOTHING",
        )
        .bind(dispatch.id)
        .bind(dispatch.campaign_id)
        .bind(dispatch.recipient_id.as_str())
        .bind(dispatch.current_channel)
        .bind(dispatch.status)
        .bind(dispatch.provider_message_id.as_deref())
        .bind(dispatch.response.as_deref())
        .bind(dispatch.sent_at)
        .bind(dispatch.created_at)
        .bind(dispatch.updated_at)
        .bind(dispatch.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(CreateOutcome::Created(dispatch));
        }

        match self
            .get_by_campaign_recipient(dispatch.campaign_id, dispatch.recipient_id.as_str())
            .await?
        {
            Some(existing) => Ok(CreateOutcome::AlreadyExists(existing)),
            // The conflicting row vanished between the insert and the read;
            // dispatches are never deleted, so surface it as a row-not-found.
            None => Err(StoreError::Database(sqlx::Error::RowNotFound)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Dispatch>, StoreError> {
        let sql = format!("SELECT {DISPATCH_COLUMNS} FROM dispatches WHERE id = $1");
        let dispatch = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dispatch)
    }

    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Dispatch>, StoreError> {
        let sql = format!(
            "SELECT {DISPATCH_COLUMNS} FROM dispatches WHERE provider_message_id = $1"
        );
        let dispatch = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(provider_message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dispatch)
    }

    async fn scan_by_status(
        &self,
        statuses: &[DeliveryStatus],
    ) -> Result<Vec<Dispatch>, StoreError> {
        let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {DISPATCH_COLUMNS} FROM dispatches \
             WHERE status::text = ANY($1) \
             ORDER BY updated_at ASC"
        );
        let dispatches = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(names)
            .fetch_all(&self.pool)
            .await?;
        Ok(dispatches)
    }

    async fn update(
        &self,
        id: Uuid,
        expected_version: i64,
        change: DispatchChange,
    ) -> Result<UpdateOutcome, StoreError> {
        let sql = format!(
            "UPDATE dispatches \
             SET current_channel = $1, status = $2, provider_message_id = $3, \
                 response = $4, sent_at = $5, updated_at = $6, version = version + 1 \
             WHERE id = $7 AND version = $8 AND status <> 'failed' \
             RETURNING {DISPATCH_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(change.current_channel)
            .bind(change.status)
            .bind(change.provider_message_id.as_deref())
            .bind(change.response.as_deref())
            .bind(change.sent_at)
            .bind(change.updated_at)
            .bind(id)
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(dispatch) = updated {
            return Ok(UpdateOutcome::Applied(dispatch));
        }

        // Nothing matched: classify why for the caller.
        let row = sqlx::query("SELECT status FROM dispatches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(UpdateOutcome::Missing),
            Some(row) => {
                let status: DeliveryStatus = row.try_get("status")?;
                if status == DeliveryStatus::Failed {
                    Ok(UpdateOutcome::Terminal)
                } else {
                    Ok(UpdateOutcome::Conflict)
                }
            }
        }
    }

    async fn count_by_status(&self, campaign_id: Uuid) -> Result<StatusCounts, StoreError> {
        let rows = sqlx::query(
            "SELECT status::text AS status, COUNT(*) AS count \
             FROM dispatches WHERE campaign_id = $1 GROUP BY status",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            let count = count.max(0) as u64;
            match status.as_str() {
                "queued" => counts.queued = count,
                "sent" => counts.sent = count,
                "delivered" => counts.delivered = count,
                "read" => counts.read = count,
                "ringing" => counts.ringing = count,
                "no_answer" => counts.no_answer = count,
                "undeliverable" => counts.undeliverable = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl CampaignStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let Some(row) = sqlx::query("SELECT id, name, started_at FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let steps = sqlx::query(
            "SELECT channel, threshold_secs, content \
             FROM campaign_steps WHERE campaign_id = $1 ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let channel_plan = steps
            .into_iter()
            .map(|step| -> Result<ChannelStep, sqlx::Error> {
                Ok(ChannelStep {
                    channel: step.try_get("channel")?,
                    escalation_threshold: Duration::seconds(step.try_get::<i64, _>("threshold_secs")?),
                    content: step.try_get("content")?,
                })
            })
            .collect::<Result<SmallVec<[ChannelStep; 4]>, sqlx::Error>>()?;

        Ok(Some(Campaign {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            channel_plan,
            started_at: row.try_get("started_at")?,
        }))
    }

    async fn mark_started(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        sqlx::query("UPDATE campaigns SET started_at = $2 WHERE id = $1 AND started_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecipientDirectory for PgStore {
    async fn get(&self, id: &str) -> Result<Option<Recipient>, StoreError> {
        let Some(row) = sqlx::query(
            "SELECT id, opted_out, chat_id, phone, tags FROM recipients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let tags: Vec<String> = row.try_get("tags")?;
        Ok(Some(Recipient {
            id: row.try_get::<String, _>("id")?.into(),
            opted_out: row.try_get("opted_out")?,
            chat_id: row
                .try_get::<Option<String>, _>("chat_id")?
                .map(CompactString::from),
            phone: row
                .try_get::<Option<String>, _>("phone")?
                .map(CompactString::from),
            tags: tags.into_iter().map(CompactString::from).collect(),
        }))
    }

    async fn upsert(&self, recipient: Recipient) -> Result<(), StoreError> {
        let tags: Vec<String> = recipient.tags.iter().map(|t| t.to_string()).collect();
        sqlx::query(
            "INSERT INTO recipients (id, opted_out, chat_id, phone, tags) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                 opted_out = EXCLUDED.opted_out, \
                 chat_id = EXCLUDED.chat_id, \
                 phone = EXCLUDED.phone, \
                 tags = EXCLUDED.tags",
        )
        .bind(recipient.id.as_str())
        .bind(recipient.opted_out)
        .bind(recipient.chat_id.as_deref())
        .bind(recipient.phone.as_deref())
        .bind(tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
