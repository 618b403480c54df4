//! Push-channel lifecycle: pure state machine, transport seam, and the
//! manager that drives one against the other.

pub mod machine;
pub mod manager;
pub mod transport;

pub use machine::{
    ConnectionAction, ConnectionEvent, ConnectionMachine, ConnectionState, Connectivity,
    ReconnectPolicy,
};
pub use manager::{ConnectionEvents, ConnectionManager};
pub use transport::{
    ChannelFrame, ChannelHandle, DisconnectReason, Transport, WebSocketTransport,
};
