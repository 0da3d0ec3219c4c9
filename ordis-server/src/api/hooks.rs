//! Hook API handlers: inbound delivery webhooks, one per channel.
//!
//! Channel providers push delivery/response events here. Each endpoint is
//! authenticated by the provider's shared secret in the `Ordis-Hook-Secret`
//! header (providers sign their callbacks with their own schemes; a static
//! secret is the common denominator across them).
//!
//! Soft conditions — unknown provider message id, unknown event vocabulary,
//! late events — are `200 OK` with the outcome in the body, so providers do
//! not retry events we have deliberately discarded.
//!
//! # Endpoints
//!
//! - `POST /chat`  – chat provider delivery events
//! - `POST /sms`   – SMS provider delivery events
//! - `POST /voice` – voice provider call events (with optional DTMF)

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use ordis_core::entities::Channel;
use ordis_core::processors::IngestError;
use ordis_sdk::objects::{ChatHookEvent, IngestResponse, SmsHookEvent, VoiceHookEvent};
use ordis_sdk::signature::HOOK_SECRET_HEADER;
use time::OffsetDateTime;

use crate::state::AppState;

/// Build the Hook API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat_hook))
        .route("/sms", post(sms_hook))
        .route("/voice", post(voice_hook))
}

/// `POST /chat` — chat provider delivery events.
async fn chat_hook(
    state: axum::extract::State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ChatHookEvent>,
) -> Result<impl IntoResponse, HookApiError> {
    verify_hook_secret(&state, Channel::Chat, &headers).await?;
    let outcome = state
        .ingestor
        .ingest(
            Channel::Chat,
            &event.message_id,
            &event.event,
            None,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok(Json(IngestResponse {
        outcome: outcome.into(),
    }))
}

/// `POST /sms` — SMS provider delivery events.
async fn sms_hook(
    state: axum::extract::State<AppState>,
    headers: HeaderMap,
    Json(event): Json<SmsHookEvent>,
) -> Result<impl IntoResponse, HookApiError> {
    verify_hook_secret(&state, Channel::Sms, &headers).await?;
    let outcome = state
        .ingestor
        .ingest(
            Channel::Sms,
            &event.message_id,
            &event.event,
            None,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok(Json(IngestResponse {
        outcome: outcome.into(),
    }))
}

/// `POST /voice` — voice provider call events, with optional DTMF digits.
async fn voice_hook(
    state: axum::extract::State<AppState>,
    headers: HeaderMap,
    Json(event): Json<VoiceHookEvent>,
) -> Result<impl IntoResponse, HookApiError> {
    verify_hook_secret(&state, Channel::Voice, &headers).await?;
    let outcome = state
        .ingestor
        .ingest(
            Channel::Voice,
            &event.call_id,
            &event.event,
            event.dtmf.as_deref(),
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok(Json(IngestResponse {
        outcome: outcome.into(),
    }))
}

/// Check the `Ordis-Hook-Secret` header against the configured secret for
/// `channel`, in constant time.
async fn verify_hook_secret(
    state: &AppState,
    channel: Channel,
    headers: &HeaderMap,
) -> Result<(), HookApiError> {
    let presented = headers
        .get(HOOK_SECRET_HEADER)
        .ok_or(HookApiError::Unauthorized)?
        .as_bytes();

    let providers = state.config.providers.read().await;
    let provider = providers
        .iter()
        .find(|p| p.channel == channel.into())
        .ok_or(HookApiError::Unauthorized)?;

    ring::constant_time::verify_slices_are_equal(presented, provider.hook_secret.as_bytes())
        .map_err(|_| HookApiError::Unauthorized)
}

/// Errors that can occur in Hook API handlers.
#[derive(Debug)]
enum HookApiError {
    /// Missing or wrong hook secret, or no provider for the channel.
    Unauthorized,
    /// Malformed event payload.
    BadPayload,
    /// Transient failure; the provider should redeliver the event.
    Retryable,
}

impl From<IngestError> for HookApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::EmptyProviderMessageId => Self::BadPayload,
            IngestError::Store(e) => {
                tracing::error!(error = %e, "Hook API store error");
                Self::Retryable
            }
            IngestError::RetriesExhausted => Self::Retryable,
        }
    }
}

impl IntoResponse for HookApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            HookApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "invalid hook secret").into_response()
            }
            HookApiError::BadPayload => {
                (StatusCode::BAD_REQUEST, "malformed event payload").into_response()
            }
            HookApiError::Retryable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "temporarily unable to apply event, retry later",
            )
                .into_response(),
        }
    }
}
