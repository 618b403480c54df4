//! # pileup-core
//!
//! Foundation types shared by every Pileup client crate:
//!
//! - **Identifiers**: [`Identifier`], the case-normalized callsign used as the
//!   dedup key everywhere
//! - **Model**: [`QueueEntry`], [`ActiveSession`], [`SystemStatus`] and the
//!   [`QueueList`] snapshot shape
//! - **Events**: the push-channel [`WireMessage`] envelope and its typed
//!   decoding into [`InboundEvent`]
//! - **Time**: tolerant timestamp parsing (RFC 3339 or naive UTC)
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer
//!   for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod identifier;
pub mod logging;
pub mod model;
pub mod time;

pub use errors::CoreError;
pub use events::{
    ConnectionNotice, EventKind, EventPayload, InboundEvent, QueueUpdate, SessionUpdate,
    StatusUpdate, WireMessage,
};
pub use identifier::Identifier;
pub use model::{ActiveSession, Enrichment, QueueEntry, QueueList, SystemStatus};
