//! Server endpoint settings.

use std::time::Duration;

use pileup_core::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use serde::{Deserialize, Serialize};

/// Where the snapshot API and push channel live.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Base URL of the HTTP API, including the `/api` prefix.
    pub api_base_url: String,
    /// Push-channel URL. Derived from `api_base_url` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            ws_url: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ServerSettings {
    /// The push-channel URL: explicit `ws_url`, or `<api_base_url>/ws` with
    /// the scheme switched to `ws`/`wss`.
    pub fn resolved_ws_url(&self) -> String {
        if let Some(url) = self.ws_url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        let base = self.api_base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
