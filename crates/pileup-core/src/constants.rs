//! Package-level constants and protocol defaults.

/// Current version of the Pileup client (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "pileup";

/// Delay between a channel close and the next connection attempt.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;

/// Consecutive failed connection attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Interval of the client-initiated keepalive while the channel is open.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Timeout applied to every snapshot or write request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// `type` tag of the keepalive frame the client sends.
pub const HEARTBEAT_TYPE: &str = "heartbeat";
