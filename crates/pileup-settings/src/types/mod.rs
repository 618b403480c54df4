//! Settings type definitions.

mod server;
mod sync;

pub use server::ServerSettings;
pub use sync::{ConnectionSettings, LoggingSettings, SyncSettings};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PileupSettings {
    /// Where the server lives.
    pub server: ServerSettings,
    /// Push-channel recovery and keepalive.
    pub connection: ConnectionSettings,
    /// Reconciliation behavior.
    pub sync: SyncSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl PileupSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.api_base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("apiBaseUrl must not be empty".into()));
        }
        if self.connection.max_reconnect_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "maxReconnectAttempts must be > 0".into(),
            ));
        }
        if self.connection.reconnect_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "reconnectIntervalMs must be > 0".into(),
            ));
        }
        if self.connection.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalMs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(PileupSettings::default()).unwrap();
        assert!(value["server"]["apiBaseUrl"].is_string());
        assert!(value["connection"]["maxReconnectAttempts"].is_number());
        assert!(value["sync"]["validateCallsigns"].is_boolean());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut settings = PileupSettings::default();
        settings.connection.max_reconnect_attempts = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("maxReconnectAttempts")
        ));
    }

    #[test]
    fn empty_base_url_rejected() {
        let mut settings = PileupSettings::default();
        settings.server.api_base_url = "  ".into();
        assert!(settings.validate().is_err());
    }
}
