//! Push-channel transport seam.
//!
//! A [`Transport`] opens one bidirectional text channel and hands back a
//! [`ChannelHandle`]: an outbound sender and an inbound frame stream. Dropping
//! the outbound sender closes the channel. [`WebSocketTransport`] implements
//! it over `tokio-tungstenite`; tests substitute in-memory transports.

use std::fmt;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::errors::TransportError;

/// Default capacity of the per-channel frame buffers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Why a channel closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description.
    pub message: String,
    /// WebSocket close code, when the peer sent one (1000 = normal,
    /// 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Reason without a close code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Reason with a close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One inbound item from an open channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelFrame {
    /// A text frame.
    Text(String),
    /// A transport error was observed. A `Closed` frame follows.
    Error(String),
    /// The channel is gone. Nothing follows.
    Closed(DisconnectReason),
}

/// An open channel.
#[derive(Debug)]
pub struct ChannelHandle {
    /// Frames to send. Dropping it closes the channel.
    pub outbound: mpsc::Sender<String>,
    /// Frames received.
    pub inbound: mpsc::Receiver<ChannelFrame>,
}

/// Opens push channels.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake against `url`.
    async fn connect(&self, url: &str) -> Result<ChannelHandle, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// [`Transport`] over `tokio-tungstenite`.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    capacity: usize,
}

impl WebSocketTransport {
    /// Transport with the default buffer capacity.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Transport with a custom buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<ChannelHandle, TransportError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: "scheme must be ws or wss".to_string(),
            });
        }

        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        debug!(url, "websocket handshake complete");

        let (out_tx, out_rx) = mpsc::channel::<String>(self.capacity);
        let (in_tx, in_rx) = mpsc::channel::<ChannelFrame>(self.capacity);
        drop(tokio::spawn(pump(ws, out_rx, in_tx)));

        Ok(ChannelHandle {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Shuttle frames between the socket and the handle until either side ends.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<ChannelFrame>,
) {
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            out = outbound.recv() => {
                let Some(text) = out else {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    debug!("outbound handle dropped, websocket closed");
                    return;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "websocket send failed");
                    let _ = inbound.send(ChannelFrame::Error(e.to_string())).await;
                    break DisconnectReason::new(format!("send failed: {e}"));
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(ChannelFrame::Text(text.to_string())).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if inbound.send(ChannelFrame::Text(text)).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => debug!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => DisconnectReason::with_code(
                            frame.reason.to_string(),
                            u16::from(frame.code),
                        ),
                        None => DisconnectReason::new("closed by server"),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = inbound.send(ChannelFrame::Error(e.to_string())).await;
                    break DisconnectReason::with_code(e.to_string(), 1006);
                }
                None => break DisconnectReason::with_code("stream ended", 1006),
            },
        }
    };

    let _ = inbound.send(ChannelFrame::Closed(reason)).await;
}
