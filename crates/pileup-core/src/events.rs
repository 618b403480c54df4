//! Push-channel envelope and its typed decoding.
//!
//! Every frame on the channel is a JSON envelope `{ type, timestamp, data }`.
//! [`InboundEvent::from_wire`] turns the loosely typed `data` object into an
//! explicit tagged union per `type`/`action` pair. Actions the client does not
//! know decode into `Unknown` arms, and payloads missing required fields into
//! [`EventPayload::Malformed`]; neither is dropped silently, both ask the
//! orchestrator for a resync.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::HEARTBEAT_TYPE;
use crate::errors::Result;
use crate::identifier::Identifier;
use crate::model::Enrichment;
use crate::time::parse_timestamp;

// ─────────────────────────────────────────────────────────────────────────────
// Wire envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Raw push-channel frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Event type tag (`queue_update`, `session_update`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// ISO-8601 emission time. Connection and heartbeat frames omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Type-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Top-level fields outside the envelope (`status`, `message` on
    /// connection frames).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl WireMessage {
    /// The keepalive frame the client sends while the channel is open.
    pub fn heartbeat() -> Self {
        Self {
            kind: HEARTBEAT_TYPE.to_string(),
            timestamp: None,
            data: Value::Null,
            extra: serde_json::Map::new(),
        }
    }

    /// Parse a text frame.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatch key for inbound events.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum EventKind {
    /// Waiting-queue changes.
    Queue,
    /// Active-session changes.
    Session,
    /// System on/off changes.
    Status,
    /// Server greeting on connect.
    Connection,
    /// Server keepalive reply.
    Heartbeat,
}

impl EventKind {
    /// Every kind, in a stable order.
    pub const ALL: [EventKind; 5] = [
        Self::Queue,
        Self::Session,
        Self::Status,
        Self::Connection,
        Self::Heartbeat,
    ];

    /// Map a wire `type` tag. Accepts the legacy `qso_update` and
    /// `system_status_update` spellings.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "queue_update" => Some(Self::Queue),
            "session_update" | "qso_update" => Some(Self::Session),
            "status_update" | "system_status_update" => Some(Self::Status),
            "connection" => Some(Self::Connection),
            "heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }

    /// Canonical wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue_update",
            Self::Session => "session_update",
            Self::Status => "status_update",
            Self::Connection => "connection",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Whether events of this kind mutate the mirrored state.
    pub fn is_stateful(self) -> bool {
        matches!(self, Self::Queue | Self::Session | Self::Status)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `queue_update` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueUpdate {
    /// A station joined the queue.
    Add {
        /// Joining station.
        identifier: Identifier,
        /// Entry time; falls back to the envelope timestamp.
        enqueued_at: Option<DateTime<Utc>>,
        /// Server-assigned position, when present and ≥ 1.
        position: Option<u32>,
    },
    /// A station left or was removed.
    Remove {
        /// Departing station.
        identifier: Identifier,
    },
    /// The queue was emptied.
    Clear,
    /// The head of the queue moved to the active session. A separate
    /// `session_update: start` is expected independently.
    Next {
        /// Station promoted out of the queue.
        identifier: Identifier,
    },
    /// An action this client does not know.
    Unknown {
        /// The unrecognized action tag (empty when missing).
        action: String,
    },
}

/// `session_update` payload.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// A new active session replaces any current one.
    Start {
        /// Station now being worked.
        identifier: Identifier,
        /// Start time; falls back to the envelope timestamp.
        started_at: Option<DateTime<Utc>>,
        /// Optional lookup data.
        enrichment: Option<Enrichment>,
    },
    /// The active session ended.
    End,
    /// An action this client does not know.
    Unknown {
        /// The unrecognized action tag (empty when missing).
        action: String,
    },
}

/// `status_update` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    /// New system flag.
    pub active: bool,
    /// The server cleared the queue together with this flag change.
    pub queue_cleared: bool,
}

/// `connection` greeting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionNotice {
    /// Server-reported status (`connected`).
    pub status: Option<String>,
    /// Human-readable greeting.
    pub message: Option<String>,
}

/// Typed event body.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// Queue change.
    Queue(QueueUpdate),
    /// Session change.
    Session(SessionUpdate),
    /// Status change.
    Status(StatusUpdate),
    /// Connection greeting.
    Connection(ConnectionNotice),
    /// Keepalive.
    Heartbeat,
    /// A known stateful kind whose payload lacked required fields.
    Malformed {
        /// Kind the envelope claimed.
        kind: EventKind,
        /// Decoder message.
        reason: String,
    },
    /// An envelope `type` this client does not know.
    Unrecognized {
        /// The raw type tag.
        kind: String,
    },
}

/// A decoded push event.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEvent {
    /// Envelope emission time, when present and parseable.
    pub timestamp: Option<DateTime<Utc>>,
    /// Typed body.
    pub payload: EventPayload,
}

impl InboundEvent {
    /// Build an event with no envelope timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: None,
            payload,
        }
    }

    /// Attach an envelope timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Decode a raw text frame.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self::from_wire(WireMessage::parse(raw)?))
    }

    /// Decode an envelope. Never fails: unknown shapes map to explicit arms.
    pub fn from_wire(msg: WireMessage) -> Self {
        let timestamp = msg.timestamp.as_deref().and_then(|t| parse_timestamp(t).ok());
        let payload = match EventKind::from_wire(&msg.kind) {
            Some(EventKind::Queue) => EventPayload::Queue(decode_queue(&msg.data)),
            Some(EventKind::Session) => EventPayload::Session(decode_session(&msg.data)),
            Some(EventKind::Status) => match serde_json::from_value::<StatusWire>(msg.data) {
                Ok(wire) => EventPayload::Status(StatusUpdate {
                    active: wire.active,
                    queue_cleared: wire.queue_cleared,
                }),
                Err(e) => EventPayload::Malformed {
                    kind: EventKind::Status,
                    reason: e.to_string(),
                },
            },
            Some(EventKind::Connection) => {
                EventPayload::Connection(decode_connection(&msg.data, &msg.extra))
            }
            Some(EventKind::Heartbeat) => EventPayload::Heartbeat,
            None => EventPayload::Unrecognized { kind: msg.kind },
        };
        Self { timestamp, payload }
    }

    /// Dispatch key, `None` for unrecognized types.
    pub fn kind(&self) -> Option<EventKind> {
        match &self.payload {
            EventPayload::Queue(_) => Some(EventKind::Queue),
            EventPayload::Session(_) => Some(EventKind::Session),
            EventPayload::Status(_) => Some(EventKind::Status),
            EventPayload::Connection(_) => Some(EventKind::Connection),
            EventPayload::Heartbeat => Some(EventKind::Heartbeat),
            EventPayload::Malformed { kind, .. } => Some(*kind),
            EventPayload::Unrecognized { .. } => None,
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> String {
        match &self.payload {
            EventPayload::Queue(update) => format!("queue:{}", update.action()),
            EventPayload::Session(update) => format!("session:{}", update.action()),
            EventPayload::Status(update) => format!("status:{}", update.active),
            EventPayload::Connection(_) => "connection".to_string(),
            EventPayload::Heartbeat => "heartbeat".to_string(),
            EventPayload::Malformed { kind, .. } => format!("{kind}:malformed"),
            EventPayload::Unrecognized { kind } => format!("unrecognized:{kind}"),
        }
    }
}

impl QueueUpdate {
    /// Wire action tag.
    pub fn action(&self) -> &str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Clear => "clear",
            Self::Next { .. } => "next",
            Self::Unknown { action } => action,
        }
    }
}

impl SessionUpdate {
    /// Wire action tag.
    pub fn action(&self) -> &str {
        match self {
            Self::Start { .. } => "start",
            Self::End => "end",
            Self::Unknown { action } => action,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding helpers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum QueueWire {
    Add {
        #[serde(alias = "identifier")]
        callsign: Identifier,
        #[serde(default, with = "crate::time::flexible_option")]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        position: Option<u32>,
    },
    Remove {
        #[serde(alias = "identifier")]
        callsign: Identifier,
    },
    Clear {},
    Next {
        #[serde(alias = "identifier")]
        callsign: Identifier,
    },
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum SessionWire {
    Start {
        #[serde(alias = "identifier")]
        callsign: Identifier,
        #[serde(default, with = "crate::time::flexible_option")]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default, alias = "enrichment")]
        qrz: Option<Value>,
    },
    End {},
}

#[derive(Deserialize)]
struct StatusWire {
    active: bool,
    #[serde(default)]
    queue_cleared: bool,
}

fn action_of(data: &Value) -> String {
    data.get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn decode_queue(data: &Value) -> QueueUpdate {
    match serde_json::from_value::<QueueWire>(data.clone()) {
        Ok(QueueWire::Add {
            callsign,
            timestamp,
            position,
        }) if !callsign.is_empty() => QueueUpdate::Add {
            identifier: callsign,
            enqueued_at: timestamp,
            position: position.filter(|p| *p >= 1),
        },
        Ok(QueueWire::Remove { callsign }) if !callsign.is_empty() => QueueUpdate::Remove {
            identifier: callsign,
        },
        Ok(QueueWire::Next { callsign }) if !callsign.is_empty() => QueueUpdate::Next {
            identifier: callsign,
        },
        Ok(QueueWire::Clear {}) => QueueUpdate::Clear,
        _ => QueueUpdate::Unknown {
            action: action_of(data),
        },
    }
}

fn decode_session(data: &Value) -> SessionUpdate {
    match serde_json::from_value::<SessionWire>(data.clone()) {
        Ok(SessionWire::Start {
            callsign,
            timestamp,
            qrz,
        }) if !callsign.is_empty() => SessionUpdate::Start {
            identifier: callsign,
            started_at: timestamp,
            enrichment: match qrz {
                Some(Value::Object(map)) => Some(map),
                _ => None,
            },
        },
        Ok(SessionWire::End {}) => SessionUpdate::End,
        _ => SessionUpdate::Unknown {
            action: action_of(data),
        },
    }
}

fn decode_connection(data: &Value, extra: &serde_json::Map<String, Value>) -> ConnectionNotice {
    let field = |name: &str| {
        data.get(name)
            .or_else(|| extra.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    ConnectionNotice {
        status: field("status"),
        message: field("message"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
