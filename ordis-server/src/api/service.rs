//! Service API handlers.
//!
//! These endpoints are called by the integrating backend and require a
//! signed body verified via the `Ordis-Signature` header.
//!
//! # Endpoints
//!
//! - `POST /campaigns/launch`   – launch a campaign for a recipient set
//! - `POST /campaigns/status`   – per-status dispatch counts for a campaign
//! - `POST /dispatches/status`  – read one dispatch
//!
//! Campaign authoring has no endpoint here: campaigns are written by the
//! authoring side directly and only read by the engine.

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::post};
use ordis_core::entities::dispatch::Dispatch;
use ordis_core::entities::recipient::Recipient;
use ordis_core::processors::LaunchError;
use ordis_core::segment::{AudienceSegmenter, SegmentFilter};
use ordis_core::store::{CampaignStore, DispatchStore, StoreError};
use ordis_sdk::objects::{
    CampaignStatusRequest, CampaignStatusResponse, DispatchResponse, GetDispatchRequest,
    LaunchCampaignRequest, LaunchResponse,
};
use time::OffsetDateTime;

use crate::api::extractors::SignedBody;
use crate::state::AppState;

/// Build the Service API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/campaigns/launch", post(launch_campaign))
        .route("/campaigns/status", post(get_campaign_status))
        .route("/dispatches/status", post(get_dispatch_status))
}

/// Convert a `Dispatch` (store model) into a `DispatchResponse` (API model).
fn to_response(dispatch: &Dispatch) -> DispatchResponse {
    DispatchResponse {
        dispatch_id: dispatch.id,
        campaign_id: dispatch.campaign_id,
        recipient_id: dispatch.recipient_id.clone(),
        channel: dispatch.current_channel.into(),
        status: dispatch.status.into(),
        provider_message_id: dispatch.provider_message_id.clone(),
        response: dispatch.response.clone(),
        sent_at: dispatch.sent_at.map(|t| t.unix_timestamp()),
        created_at: dispatch.created_at.unix_timestamp(),
        updated_at: dispatch.updated_at.unix_timestamp(),
    }
}

/// `POST /campaigns/launch` — launch a campaign for a recipient set.
///
/// The posted set is expected to be pre-segmented; the optional tag filter
/// is applied here, and the launcher itself still rejects opted-out
/// recipients at creation time.
async fn launch_campaign(
    state: axum::extract::State<AppState>,
    SignedBody(payload): SignedBody<LaunchCampaignRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let recipients: Vec<Recipient> = payload
        .recipients
        .into_iter()
        .map(Recipient::from)
        .collect();

    let filter = SegmentFilter {
        include_tags: payload.include_tags,
    };
    let recipients = state
        .segmenter
        .segment(recipients, &filter)
        .await
        .map_err(ServiceApiError::Store)?;

    let result = state
        .launcher
        .launch(payload.campaign_id, &recipients, OffsetDateTime::now_utc())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LaunchResponse {
            created: result.created,
            already_launched: result.already_launched,
            rejected_opted_out: result.rejected_opted_out,
            errored: result.errored,
        }),
    ))
}

/// `POST /campaigns/status` — per-status dispatch counts for one campaign.
async fn get_campaign_status(
    state: axum::extract::State<AppState>,
    SignedBody(payload): SignedBody<CampaignStatusRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let campaign = state
        .campaigns
        .get(payload.campaign_id)
        .await
        .map_err(ServiceApiError::Store)?
        .ok_or(ServiceApiError::NotFound)?;

    let counts = state
        .dispatches
        .count_by_status(campaign.id)
        .await
        .map_err(ServiceApiError::Store)?;

    Ok(Json(CampaignStatusResponse {
        campaign_id: campaign.id,
        started_at: campaign.started_at.map(|t| t.unix_timestamp()),
        counts,
    }))
}

/// `POST /dispatches/status` — read one dispatch.
async fn get_dispatch_status(
    state: axum::extract::State<AppState>,
    SignedBody(payload): SignedBody<GetDispatchRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let dispatch = state
        .dispatches
        .get(payload.dispatch_id)
        .await
        .map_err(ServiceApiError::Store)?
        .ok_or(ServiceApiError::NotFound)?;

    Ok(Json(to_response(&dispatch)))
}

/// Errors that can occur in Service API handlers.
#[derive(Debug)]
enum ServiceApiError {
    /// A store operation failed.
    Store(StoreError),
    /// The requested campaign or dispatch was not found.
    NotFound,
    /// The launch request was rejected before any dispatch was created.
    Launch(LaunchError),
}

impl From<LaunchError> for ServiceApiError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Store(e) => Self::Store(e),
            other => Self::Launch(other),
        }
    }
}

impl IntoResponse for ServiceApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ServiceApiError::Store(e) => {
                tracing::error!(error = %e, "Service API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            ServiceApiError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            ServiceApiError::Launch(LaunchError::CampaignNotFound(_)) => {
                (StatusCode::NOT_FOUND, "campaign not found").into_response()
            }
            ServiceApiError::Launch(LaunchError::NoRecipients) => {
                (StatusCode::BAD_REQUEST, "empty recipient set").into_response()
            }
            ServiceApiError::Launch(LaunchError::EmptyChannelPlan(_)) => {
                (StatusCode::BAD_REQUEST, "campaign has no channels").into_response()
            }
            ServiceApiError::Launch(e) => {
                tracing::error!(error = %e, "Launch failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
