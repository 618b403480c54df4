//! Error types for the sync engine.

use std::fmt;

use pileup_api::ApiError;

/// Lifecycle misuse of the connection manager.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// `start` was called after `stop` without an intervening `reset`.
    #[error("connection manager is stopped; call reset() before starting again")]
    Stopped,
}

/// Failure to open the push channel.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The URL could not be used to open a channel.
    #[error("invalid channel url {url}: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

/// One of the three snapshot reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotEndpoint {
    /// `GET /queue/list`.
    QueueList,
    /// `GET /queue/current`.
    CurrentSession,
    /// `GET /queue/status`.
    SystemStatus,
}

impl fmt::Display for SnapshotEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QueueList => "queue list",
            Self::CurrentSession => "current session",
            Self::SystemStatus => "system status",
        })
    }
}

/// A single failed snapshot read.
#[derive(Clone, Debug)]
pub struct BootstrapFailure {
    /// Which read failed.
    pub endpoint: SnapshotEndpoint,
    /// Why.
    pub error: ApiError,
}

/// Aggregated snapshot failure. Nothing was applied to the store.
#[derive(Clone, Debug, thiserror::Error)]
#[error("bootstrap failed: {}", summarize(.failures))]
pub struct BootstrapError {
    /// Every read that failed, in endpoint order.
    pub failures: Vec<BootstrapFailure>,
}

impl BootstrapError {
    /// Whether the given read is among the failures.
    pub fn failed(&self, endpoint: SnapshotEndpoint) -> bool {
        self.failures.iter().any(|f| f.endpoint == endpoint)
    }
}

fn summarize(failures: &[BootstrapFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.endpoint, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of an optimistic registration. The store is left untouched.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RegisterError {
    /// Rejected locally before calling the write endpoint.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    /// The write endpoint failed or rejected the request.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A reducer met an event it cannot apply incrementally.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("resync required: {reason}")]
pub struct ResyncRequired {
    /// What could not be applied.
    pub reason: String,
}

impl ResyncRequired {
    /// Build from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
