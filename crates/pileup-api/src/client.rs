//! `QueueApi` trait and its `reqwest` implementation.

use std::time::Duration;

use async_trait::async_trait;
use pileup_core::{ActiveSession, Identifier, QueueEntry, QueueList, SystemStatus};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{ApiError, Result};

/// Snapshot reads and the registration write the sync engine depends on.
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// `GET /queue/list`.
    async fn queue_list(&self) -> Result<QueueList>;

    /// `GET /queue/current`. `None` when no session is active.
    async fn current_session(&self) -> Result<Option<ActiveSession>>;

    /// `GET /queue/status`.
    async fn system_status(&self) -> Result<SystemStatus>;

    /// `POST /queue/register`. Returns the entry the server created.
    async fn register(&self, identifier: &Identifier) -> Result<QueueEntry>;

    /// `GET /queue/status/{callsign}`. `None` when the identifier is not
    /// waiting.
    async fn lookup(&self, identifier: &Identifier) -> Result<Option<QueueEntry>>;
}

/// The register endpoint answers `{message, entry}`; older deployments
/// answered with the bare entry.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegisterResponse {
    Wrapped { entry: QueueEntry },
    Bare(QueueEntry),
}

impl RegisterResponse {
    fn into_entry(self) -> QueueEntry {
        match self {
            Self::Wrapped { entry } | Self::Bare(entry) => entry,
        }
    }
}

/// [`QueueApi`] over HTTP.
pub struct HttpQueueApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpQueueApi {
    /// Create a client for `base_url` (e.g. `http://localhost:5000/api`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pileup-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::Network(format!("invalid base url {base_url}: {e}")))?;
        Ok(Self { client, base })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::Network(format!("base url cannot be a base: {}", self.base)))?;
            let _ = path.pop_if_empty();
            let _ = path.extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        decode(check(response).await?).await
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let err = ApiError::from_response(status.as_u16(), &body);
    warn!(status = status.as_u16(), error = %err, "request rejected");
    Err(err)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl QueueApi for HttpQueueApi {
    async fn queue_list(&self) -> Result<QueueList> {
        self.get_json(&["queue", "list"]).await
    }

    async fn current_session(&self) -> Result<Option<ActiveSession>> {
        let value: serde_json::Value = self.get_json(&["queue", "current"]).await?;
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Object(ref map) if map.is_empty() => Ok(None),
            other => Ok(Some(serde_json::from_value(other)?)),
        }
    }

    async fn system_status(&self) -> Result<SystemStatus> {
        self.get_json(&["queue", "status"]).await
    }

    async fn register(&self, identifier: &Identifier) -> Result<QueueEntry> {
        let url = self.endpoint(&["queue", "register"])?;
        debug!(%url, identifier = %identifier, "POST register");
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "callsign": identifier }))
            .send()
            .await?;
        let body: RegisterResponse = decode(check(response).await?).await?;
        Ok(body.into_entry())
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Option<QueueEntry>> {
        let url = self.endpoint(&["queue", "status", identifier.as_str()])?;
        debug!(%url, "GET lookup");
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(decode(check(response).await?).await?))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
