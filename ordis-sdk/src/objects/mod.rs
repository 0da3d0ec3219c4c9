pub mod channels;
pub mod dispatch;
pub mod hooks;
pub mod launch;

pub use channels::{Channel, DeliveryStatus};
pub use dispatch::{
    CampaignStatusRequest, CampaignStatusResponse, DispatchResponse, GetDispatchRequest,
    StatusCounts,
};
pub use hooks::{ChatHookEvent, IngestOutcome, IngestResponse, SmsHookEvent, VoiceHookEvent};
pub use launch::{LaunchCampaignRequest, LaunchResponse, RecipientPayload};
