//! Service API client (integrator backend → Ordis server).
//!
//! All requests use body-signed HMAC-SHA256 authentication via
//! [`SignedObject`].

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::dispatch::{
    CampaignStatusRequest, CampaignStatusResponse, DispatchResponse, GetDispatchRequest,
};
use crate::objects::launch::{LaunchCampaignRequest, LaunchResponse};
use crate::signature::{SIGNATURE_HEADER, Signature, SignedObject};

/// Typed HTTP client for the Ordis **Service API**.
///
/// The Service API is called by the integrating backend to launch campaigns
/// and query dispatch state. Every request body is signed with
/// `HMAC-SHA256("{timestamp}.{json}", service_secret)`.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
}

impl ServiceClient {
    /// Create a new `ServiceClient`.
    ///
    /// * `base_url` – root URL of the Ordis server (e.g. `https://outreach.example.com`).
    /// * `service_secret` – the shared HMAC secret for body signing.
    pub fn new(base_url: Url, service_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: service_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/service/campaigns/launch` – launch a campaign for a
    /// recipient set.
    pub async fn launch(
        &self,
        payload: LaunchCampaignRequest,
    ) -> Result<LaunchResponse, ClientError> {
        self.post_signed("/api/v1/service/campaigns/launch", payload)
            .await
    }

    /// `POST /api/v1/service/dispatches/status` – read one dispatch.
    pub async fn dispatch_status(
        &self,
        dispatch_id: Uuid,
    ) -> Result<DispatchResponse, ClientError> {
        self.post_signed(
            "/api/v1/service/dispatches/status",
            GetDispatchRequest { dispatch_id },
        )
        .await
    }

    /// `POST /api/v1/service/campaigns/status` – per-status dispatch counts
    /// for one campaign.
    pub async fn campaign_status(
        &self,
        campaign_id: Uuid,
    ) -> Result<CampaignStatusResponse, ClientError> {
        self.post_signed(
            "/api/v1/service/campaigns/status",
            CampaignStatusRequest { campaign_id },
        )
        .await
    }

    async fn post_signed<B, T>(&self, path: &str, body: B) -> Result<T, ClientError>
    where
        B: Signature,
        T: serde::de::DeserializeOwned,
    {
        let signed = SignedObject::new(body, &self.secret).map_err(ClientError::Json)?;
        let url = self.base_url.join(path)?;

        let resp = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await?;

        parse_response(resp).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
