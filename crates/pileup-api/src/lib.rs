//! # pileup-api
//!
//! Request/response collaborator for the Pileup client.
//!
//! [`QueueApi`] is the seam the sync engine depends on: the three snapshot
//! reads (queue list, current session, system status), the registration
//! write, and a single-identifier lookup. [`HttpQueueApi`] implements it over
//! `reqwest` against the deployed REST endpoints under `{base}/queue/...`.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;

pub use client::{HttpQueueApi, QueueApi};
pub use errors::{ApiError, Result};
