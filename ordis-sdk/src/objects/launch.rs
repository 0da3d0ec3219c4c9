//! Service API objects for launching a campaign.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signature::Signature;

/// One recipient of a campaign launch, as posted by the integrating backend.
///
/// The recipient set is expected to be pre-segmented; `opted_out` is carried
/// anyway so the engine can reject stragglers at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientPayload {
    /// Opaque identifier from the integrator's own user store.
    pub id: CompactString,
    #[serde(default)]
    pub opted_out: bool,
    /// Chat handle used by the chat channel provider.
    #[serde(default)]
    pub chat_id: Option<CompactString>,
    /// E.164 phone number used by the SMS and voice channel providers.
    #[serde(default)]
    pub phone: Option<CompactString>,
    /// Free-form segmentation tags.
    #[serde(default)]
    pub tags: Vec<CompactString>,
}

/// `POST /campaigns/launch` request body (signed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCampaignRequest {
    pub campaign_id: Uuid,
    pub recipients: Vec<RecipientPayload>,
    /// Optional tag filter applied by the audience segmenter before launch.
    /// Empty means no tag filtering.
    #[serde(default)]
    pub include_tags: Vec<CompactString>,
}

impl Signature for LaunchCampaignRequest {}

/// `POST /campaigns/launch` response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    /// Dispatches created by this call.
    pub created: u32,
    /// Recipients that already had a dispatch for this campaign (no-op).
    pub already_launched: u32,
    /// Recipients rejected because they are opted out.
    pub rejected_opted_out: u32,
    /// Recipients whose dispatch could not be created; retry the launch to
    /// pick them up (creation is idempotent).
    #[serde(default)]
    pub errored: u32,
}
