//! Pure connection state machine.
//!
//! [`ConnectionMachine`] owns the lifecycle rules and nothing else: each
//! input returns the [`ConnectionAction`]s the driver must perform (open a
//! channel, arm a timer, emit an event). No I/O and no clock, so every
//! transition is testable without a runtime.

use std::time::Duration;

use pileup_settings::ConnectionSettings;

use super::transport::DisconnectReason;
use crate::errors::ConnectionError;

/// Coarse channel state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Channel usable.
    Open,
    /// No channel.
    Closed,
}

/// Detailed connectivity, distinguishing "retrying" from "gave up".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Never started.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Channel usable.
    Open,
    /// Closed; a reconnect is scheduled.
    Retrying {
        /// Consecutive failures so far.
        attempt: u32,
    },
    /// Closed; attempts exhausted. Only an explicit `start` leaves this state.
    GaveUp {
        /// Consecutive failures that led here.
        attempts: u32,
    },
    /// Stopped by the owner. Only `reset` leaves this state.
    Stopped,
}

impl Connectivity {
    /// Collapse to the coarse three-state view.
    pub fn state(self) -> ConnectionState {
        match self {
            Self::Connecting => ConnectionState::Connecting,
            Self::Open => ConnectionState::Open,
            Self::Idle | Self::Retrying { .. } | Self::GaveUp { .. } | Self::Stopped => {
                ConnectionState::Closed
            }
        }
    }

    /// Whether this is a persistent failure the owner must act on.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::GaveUp { .. })
    }
}

/// Observable lifecycle effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake succeeded.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The channel closed or the handshake failed.
    Closed {
        /// Why.
        reason: DisconnectReason,
        /// Consecutive failures including this one.
        attempt: u32,
        /// Delay before the next attempt; `None` when giving up.
        retry_in: Option<Duration>,
    },
    /// A transport error was observed.
    Error(String),
    /// Attempts exhausted; no further automatic connects.
    GaveUp {
        /// Consecutive failures.
        attempts: u32,
    },
}

/// Side effects requested by a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Begin a handshake.
    Connect,
    /// Arm the reconnect timer.
    ScheduleRetry(Duration),
    /// Disarm the reconnect timer.
    CancelRetry,
    /// Arm the heartbeat timer.
    StartHeartbeat,
    /// Disarm the heartbeat timer.
    StopHeartbeat,
    /// Drop the channel.
    CloseChannel,
    /// Deliver an event to the owner.
    Emit(ConnectionEvent),
}

/// Reconnect timing and cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay before each reconnect.
    pub interval: Duration,
    /// Consecutive failures before giving up (at least 1).
    pub max_attempts: u32,
    /// Heartbeat period while open.
    pub heartbeat: Duration,
}

impl From<&ConnectionSettings> for ReconnectPolicy {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            interval: settings.reconnect_interval(),
            max_attempts: settings.max_reconnect_attempts.max(1),
            heartbeat: settings.heartbeat_interval(),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ConnectionSettings::default())
    }
}

/// Lifecycle rules for one push channel.
#[derive(Debug)]
pub struct ConnectionMachine {
    policy: ReconnectPolicy,
    connectivity: Connectivity,
    failures: u32,
}

impl ConnectionMachine {
    /// A machine in [`Connectivity::Idle`].
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            connectivity: Connectivity::Idle,
            failures: 0,
        }
    }

    /// Current connectivity.
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Consecutive failures since the last successful handshake.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Policy in force.
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Begin connecting. A no-op while connecting, open or retrying; an
    /// explicit restart (counter zeroed) from idle or after giving up.
    pub fn start(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match self.connectivity {
            Connectivity::Stopped => Err(ConnectionError::Stopped),
            Connectivity::Idle | Connectivity::GaveUp { .. } => {
                self.failures = 0;
                self.connectivity = Connectivity::Connecting;
                Ok(vec![ConnectionAction::Connect])
            }
            Connectivity::Connecting | Connectivity::Open | Connectivity::Retrying { .. } => {
                Ok(Vec::new())
            }
        }
    }

    /// The handshake completed.
    pub fn on_open(&mut self) -> Vec<ConnectionAction> {
        if self.connectivity != Connectivity::Connecting {
            return vec![ConnectionAction::CloseChannel];
        }
        self.failures = 0;
        self.connectivity = Connectivity::Open;
        vec![
            ConnectionAction::StartHeartbeat,
            ConnectionAction::Emit(ConnectionEvent::Opened),
        ]
    }

    /// The handshake failed.
    pub fn on_connect_failed(&mut self, error: &str) -> Vec<ConnectionAction> {
        if self.connectivity != Connectivity::Connecting {
            return Vec::new();
        }
        let mut actions = vec![ConnectionAction::Emit(ConnectionEvent::Error(
            error.to_string(),
        ))];
        actions.extend(self.fail(DisconnectReason::new(error)));
        actions
    }

    /// An open channel closed.
    pub fn on_closed(&mut self, reason: DisconnectReason) -> Vec<ConnectionAction> {
        match self.connectivity {
            Connectivity::Open => {
                let mut actions = vec![
                    ConnectionAction::StopHeartbeat,
                    ConnectionAction::CloseChannel,
                ];
                actions.extend(self.fail(reason));
                actions
            }
            Connectivity::Connecting => self.fail(reason),
            _ => Vec::new(),
        }
    }

    /// The reconnect timer fired.
    pub fn on_retry_elapsed(&mut self) -> Vec<ConnectionAction> {
        if let Connectivity::Retrying { .. } = self.connectivity {
            self.connectivity = Connectivity::Connecting;
            vec![ConnectionAction::Connect]
        } else {
            Vec::new()
        }
    }

    /// Terminal stop: disarm everything and refuse further starts.
    pub fn stop(&mut self) -> Vec<ConnectionAction> {
        self.connectivity = Connectivity::Stopped;
        vec![
            ConnectionAction::CancelRetry,
            ConnectionAction::StopHeartbeat,
            ConnectionAction::CloseChannel,
        ]
    }

    /// Leave [`Connectivity::Stopped`] so `start` is accepted again.
    pub fn reset(&mut self) {
        if self.connectivity == Connectivity::Stopped {
            self.connectivity = Connectivity::Idle;
            self.failures = 0;
        }
    }

    fn fail(&mut self, reason: DisconnectReason) -> Vec<ConnectionAction> {
        self.failures = self.failures.saturating_add(1);
        let attempt = self.failures;

        if attempt >= self.policy.max_attempts {
            self.connectivity = Connectivity::GaveUp { attempts: attempt };
            vec![
                ConnectionAction::Emit(ConnectionEvent::Closed {
                    reason,
                    attempt,
                    retry_in: None,
                }),
                ConnectionAction::Emit(ConnectionEvent::GaveUp { attempts: attempt }),
            ]
        } else {
            self.connectivity = Connectivity::Retrying { attempt };
            vec![
                ConnectionAction::ScheduleRetry(self.policy.interval),
                ConnectionAction::Emit(ConnectionEvent::Closed {
                    reason,
                    attempt,
                    retry_in: Some(self.policy.interval),
                }),
            ]
        }
    }
}
