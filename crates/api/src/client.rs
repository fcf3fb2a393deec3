//! Platform API client.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::poller::{PollSchedule, await_ready};
use crate::{ApiError, TokenProvider};

/// Bound on every API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body for creating a data entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityRequest {
    pub name: String,
    pub description: String,
    pub data_type: String,
    pub version: u32,
    /// Always `true`: entities are created for resumable uploads.
    pub resumable: bool,
}

impl EntityRequest {
    /// A gzip-archive entity request for one upload version.
    pub fn gzip(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            description: version.to_string(),
            data_type: "gzip".to_string(),
            version,
            resumable: true,
        }
    }
}

/// Per-session upload credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadCredentials {
    /// Server-side name of the upload resource for this session.
    #[serde(rename = "data_upload_id")]
    pub upload_id: String,
    /// Secret scoped to this one session.
    pub token: String,
}

/// A data entity as described by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Entity {
    pub id: String,
    /// Present once the byte transfer has completed.
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// A stored resource undergoing post-processing.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub state: ResourceState,
}

/// Server-side resource states; `Valid` is the terminal ready value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Queued,
    Unpacking,
    Valid,
    Invalid,
    #[serde(other)]
    Other,
}

impl ResourceState {
    /// Returns `true` once the resource is fully unpacked and usable.
    pub fn is_ready(&self) -> bool {
        matches!(self, ResourceState::Valid)
    }
}

/// Thin client for the platform REST API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Creates a client for `base_url` (no trailing slash).
    pub fn new(base_url: &str, token: Arc<dyn TokenProvider>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Creates the data entity the upload will fill; returns its id.
    pub async fn create_entity(&self, request: &EntityRequest) -> Result<String, ApiError> {
        debug!(name = %request.name, version = request.version, "creating entity");
        let response = self
            .request(reqwest::Method::POST, "/modules/")
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let body = Self::check(response).await?;

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))?;
        value
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Malformed("entity response missing id".into()))
    }

    /// Issues fresh per-session upload credentials for an entity.
    pub async fn upload_credentials(&self, entity_id: &str) -> Result<UploadCredentials, ApiError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/modules/{entity_id}/upload_credentials"),
            )
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let body = Self::check(response).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// Describes an entity; used after the byte loop to learn the
    /// server-assigned resource id.
    pub async fn get_entity(&self, entity_id: &str) -> Result<Entity, ApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/modules/{entity_id}"))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let body = Self::check(response).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// Fetches the current state of a stored resource.
    pub async fn get_resource(&self, resource_id: &str) -> Result<Resource, ApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/resources/{resource_id}"))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let body = Self::check(response).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// Polls the resource until it reaches the ready state or the retry
    /// budget runs out. `on_retry` receives the retry counter after each
    /// unready poll.
    pub async fn wait_for_ready(
        &self,
        resource_id: &str,
        on_retry: impl FnMut(u32),
    ) -> Result<(), ApiError> {
        let schedule = PollSchedule::default();
        await_ready(
            || async move { Ok(self.get_resource(resource_id).await?.state) },
            &schedule,
            on_retry,
        )
        .await
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = self.token.bearer() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Maps error statuses to the closed taxonomy; returns the body text
    /// on success.
    async fn check(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if (200..300).contains(&status) {
            return Ok(body);
        }
        Err(classify_status(status, &body))
    }
}

/// HTTP status → error variant mapping.
fn classify_status(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("errors"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_default();

    match status {
        400 => ApiError::BadRequest(message),
        401 => ApiError::Authentication,
        403 => ApiError::Authorization,
        404 => ApiError::NotFound,
        423 => ApiError::Locked,
        429 => ApiError::OverLimit(message),
        502 => ApiError::BadGateway,
        504 => ApiError::GatewayTimeout,
        500..=599 => ApiError::Server(message),
        other => ApiError::Unexpected(other),
    }
}
