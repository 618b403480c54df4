//! The three entities mirrored by the client: waiting queue, active session,
//! and system status.
//!
//! Field names follow the Rust side; the server's spellings (`callsign`,
//! `timestamp`, `qrz`) are used on the wire and accepted alongside the Rust
//! names on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::identifier::Identifier;

/// Opaque enrichment attached to an active session (e.g. a QRZ lookup).
pub type Enrichment = serde_json::Map<String, serde_json::Value>;

/// One station waiting in line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Normalized station identifier; unique within the queue.
    #[serde(rename = "callsign", alias = "identifier")]
    pub identifier: Identifier,
    /// When the station joined the queue.
    #[serde(rename = "timestamp", alias = "enqueued_at", with = "crate::time::flexible")]
    pub enqueued_at: DateTime<Utc>,
    /// 1-based place in line. Recomputed from list order by the store.
    #[serde(default)]
    pub position: u32,
}

impl QueueEntry {
    /// Build an entry with an explicit position.
    pub fn new(identifier: Identifier, enqueued_at: DateTime<Utc>, position: u32) -> Self {
        Self {
            identifier,
            enqueued_at,
            position,
        }
    }
}

/// The station currently being worked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Normalized station identifier.
    #[serde(rename = "callsign", alias = "identifier")]
    pub identifier: Identifier,
    /// When the session started.
    #[serde(rename = "timestamp", alias = "started_at", with = "crate::time::flexible")]
    pub started_at: DateTime<Utc>,
    /// Optional lookup data; non-object values are dropped.
    #[serde(
        rename = "qrz",
        alias = "enrichment",
        default,
        deserialize_with = "object_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub enrichment: Option<Enrichment>,
}

/// Whether the operator has the system switched on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// `true` while registrations are accepted.
    #[serde(default)]
    pub active: bool,
}

/// Response of the queue-list snapshot read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueList {
    /// Entries in arrival order.
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
    /// Server-reported length.
    #[serde(default)]
    pub total: u32,
    /// Configured queue capacity, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,
    /// Status flag piggybacked on the list, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_active: Option<bool>,
}

fn object_or_none<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Enrichment>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_entry_from_server_shape() {
        let entry: QueueEntry = serde_json::from_value(json!({
            "callsign": "k1abc",
            "timestamp": "2025-06-01T12:00:00.000001",
            "position": 3
        }))
        .unwrap();
        assert_eq!(entry.identifier.as_str(), "K1ABC");
        assert_eq!(entry.position, 3);
    }

    #[test]
    fn queue_entry_accepts_rust_names() {
        let entry: QueueEntry = serde_json::from_value(json!({
            "identifier": "W1AW",
            "enqueued_at": "2025-06-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(entry.identifier.as_str(), "W1AW");
        assert_eq!(entry.position, 0);
    }

    #[test]
    fn queue_entry_serializes_wire_names() {
        let entry: QueueEntry = serde_json::from_value(json!({
            "callsign": "W1AW",
            "timestamp": "2025-06-01T12:00:00Z",
            "position": 1
        }))
        .unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["callsign"], "W1AW");
        assert_eq!(value["position"], 1);
        assert!(value["timestamp"].as_str().unwrap().starts_with("2025-06-01T12:00:00"));
    }

    #[test]
    fn session_keeps_object_enrichment() {
        let session: ActiveSession = serde_json::from_value(json!({
            "callsign": "EI0IRTS",
            "timestamp": "2025-06-01T12:00:00Z",
            "qrz": {"name": "Radio Club", "location": "Dublin"}
        }))
        .unwrap();
        let qrz = session.enrichment.unwrap();
        assert_eq!(qrz["location"], "Dublin");
    }

    #[test]
    fn session_drops_non_object_enrichment() {
        let session: ActiveSession = serde_json::from_value(json!({
            "callsign": "EI0IRTS",
            "timestamp": "2025-06-01T12:00:00Z",
            "qrz": "unavailable"
        }))
        .unwrap();
        assert!(session.enrichment.is_none());
    }

    #[test]
    fn queue_list_tolerates_missing_extras() {
        let list: QueueList = serde_json::from_value(json!({"queue": [], "total": 0})).unwrap();
        assert!(list.queue.is_empty());
        assert_eq!(list.max_size, None);
        assert_eq!(list.system_active, None);
    }

    #[test]
    fn status_defaults_inactive() {
        let status: SystemStatus = serde_json::from_value(json!({})).unwrap();
        assert!(!status.active);
    }
}
