//! Connection, reconciliation, and logging settings.

use std::time::Duration;

use pileup_core::constants::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};

/// Push-channel recovery and keepalive.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Fixed delay before each reconnect attempt.
    pub reconnect_interval_ms: u64,
    /// Consecutive failures before giving up.
    pub max_reconnect_attempts: u32,
    /// Client keepalive interval while open.
    pub heartbeat_interval_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl ConnectionSettings {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Reconciliation behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Reject malformed callsigns locally before calling the write endpoint.
    pub validate_callsigns: bool,
    /// Re-run the snapshot bootstrap every time the channel reopens.
    pub resync_on_reconnect: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            validate_callsigns: true,
            resync_on_reconnect: true,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` wins).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
