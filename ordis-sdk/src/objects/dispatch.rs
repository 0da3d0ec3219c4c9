//! Service API objects for reading dispatch and campaign state.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::channels::{Channel, DeliveryStatus};
use crate::signature::Signature;

/// `POST /dispatches/status` request body (signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDispatchRequest {
    pub dispatch_id: Uuid,
}

impl Signature for GetDispatchRequest {}

/// A dispatch as returned by the Service API.
///
/// Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub dispatch_id: Uuid,
    pub campaign_id: Uuid,
    pub recipient_id: CompactString,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<CompactString>,
    /// DTMF/keypad reply captured on the voice channel, if any.
    pub response: Option<CompactString>,
    pub sent_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// `POST /campaigns/status` request body (signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStatusRequest {
    pub campaign_id: Uuid,
}

impl Signature for CampaignStatusRequest {}

/// Per-status dispatch counts for one campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub sent: u64,
    pub delivered: u64,
    pub read: u64,
    pub ringing: u64,
    pub no_answer: u64,
    pub undeliverable: u64,
    pub failed: u64,
}

/// `POST /campaigns/status` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStatusResponse {
    pub campaign_id: Uuid,
    /// Unix seconds; absent if the campaign has never been launched.
    pub started_at: Option<i64>,
    pub counts: StatusCounts,
}
