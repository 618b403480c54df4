//! # pileup-sync
//!
//! Client-side realtime synchronization engine.
//!
//! - [`connection`]: push-channel lifecycle (state machine, transport,
//!   reconnect and heartbeat driver)
//! - [`dispatcher`]: typed, isolated, in-order event delivery
//! - [`store`]: the mirrored queue/session/status, mutated only through pure
//!   reducers, observable via subscribe, snapshot and watch
//! - [`orchestrator`]: [`SyncEngine`], tying the three together with the
//!   snapshot API, resync on unknown input, and optimistic registration

#![deny(unsafe_code)]

pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod orchestrator;
pub mod store;

pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connectivity, DisconnectReason,
    ReconnectPolicy, Transport, WebSocketTransport,
};
pub use dispatcher::{DispatchReport, EventDispatcher, ListenerId};
pub use errors::{
    BootstrapError, BootstrapFailure, ConnectionError, RegisterError, ResyncRequired,
    SnapshotEndpoint, TransportError,
};
pub use orchestrator::{EngineConfig, EngineNotice, SyncEngine};
pub use store::{Revisions, Snapshot, SnapshotOutcome, StateStore, SubscriptionId, SyncState};
