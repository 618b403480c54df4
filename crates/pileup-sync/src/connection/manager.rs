//! Connection manager: drives a [`ConnectionMachine`] against a [`Transport`].
//!
//! One driver task per started session owns the channel, the reconnect timer
//! and the heartbeat timer. Timers use the tokio clock, so tests run with a
//! paused clock. Lifecycle events are delivered in order on the receiver
//! returned by [`ConnectionManager::new`].

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use pileup_core::WireMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::machine::{
    ConnectionAction, ConnectionEvent, ConnectionMachine, Connectivity, ReconnectPolicy,
};
use super::transport::{ChannelFrame, ChannelHandle, DisconnectReason, Transport};
use crate::errors::{ConnectionError, TransportError};

/// Ordered stream of lifecycle events.
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

struct Shared {
    machine: Mutex<ConnectionMachine>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    cancel: Mutex<CancellationToken>,
    driver: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    transport: Arc<dyn Transport>,
}

/// Owns one push channel and its recovery.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create an idle manager and the receiver its events are delivered on.
    pub fn new(transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> (Self, ConnectionEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            machine: Mutex::new(ConnectionMachine::new(policy)),
            outbound: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            driver: Mutex::new(None),
            events,
            transport,
        });
        (Self { shared }, rx)
    }

    /// Begin connecting to `url`. No-op while already connecting, open or
    /// retrying; restarts with a zeroed counter after giving up.
    pub fn start(&self, url: &str) -> Result<(), ConnectionError> {
        let actions = self.shared.machine.lock().start()?;
        if actions.is_empty() {
            debug!("start ignored, connection already active");
            return Ok(());
        }

        info!(url, "connecting");
        let cancel = self.shared.cancel.lock().clone();
        let driver = Driver::new(Arc::clone(&self.shared), url.to_string(), cancel);
        let handle = tokio::spawn(driver.run(actions));
        if let Some(previous) = self.shared.driver.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Terminal stop. Disarms the retry and heartbeat timers, closes the
    /// channel and aborts the driver before returning; no event is emitted
    /// afterwards.
    pub fn stop(&self) {
        let _ = self.shared.machine.lock().stop();
        self.shared.cancel.lock().cancel();
        if let Some(driver) = self.shared.driver.lock().take() {
            driver.abort();
        }
        drop(self.shared.outbound.lock().take());
        info!("connection stopped");
    }

    /// Allow `start` again after `stop`.
    pub fn reset(&self) {
        self.shared.machine.lock().reset();
        *self.shared.cancel.lock() = CancellationToken::new();
    }

    /// Send a text frame. Delivered only while open; otherwise dropped with a
    /// warning and `false` returned.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        self.shared.send(payload.into())
    }

    /// Current connectivity.
    pub fn connectivity(&self) -> Connectivity {
        self.shared.machine.lock().connectivity()
    }

    /// Consecutive failures since the last successful handshake.
    pub fn failures(&self) -> u32 {
        self.shared.machine.lock().failures()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn send(&self, payload: String) -> bool {
        if self.machine.lock().connectivity() != Connectivity::Open {
            warn!("send while channel not open, dropping frame");
            return false;
        }
        let Some(outbound) = self.outbound.lock().clone() else {
            warn!("send with no channel handle, dropping frame");
            return false;
        };
        match outbound.try_send(payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "outbound frame dropped");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver task
// ─────────────────────────────────────────────────────────────────────────────

type PendingConnect = BoxFuture<'static, Result<ChannelHandle, TransportError>>;

struct Driver {
    shared: Arc<Shared>,
    url: String,
    cancel: CancellationToken,
    connecting: Option<PendingConnect>,
    inbound: Option<mpsc::Receiver<ChannelFrame>>,
    retry_at: Option<Instant>,
    heartbeat: Option<Interval>,
    finished: bool,
}

impl Driver {
    fn new(shared: Arc<Shared>, url: String, cancel: CancellationToken) -> Self {
        Self {
            shared,
            url,
            cancel,
            connecting: None,
            inbound: None,
            retry_at: None,
            heartbeat: None,
            finished: false,
        }
    }

    async fn run(mut self, initial: Vec<ConnectionAction>) {
        self.perform(initial);

        while !self.finished {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = handshake(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_handshake(result);
                }
                frame = next_frame(&mut self.inbound) => self.on_frame(frame),
                () = retry_elapsed(self.retry_at) => {
                    self.retry_at = None;
                    let actions = self.shared.machine.lock().on_retry_elapsed();
                    self.perform(actions);
                }
                () = heartbeat_tick(&mut self.heartbeat) => self.send_heartbeat(),
            }
        }
        debug!(url = %self.url, "connection driver exiting");
    }

    fn on_handshake(&mut self, result: Result<ChannelHandle, TransportError>) {
        match result {
            Ok(handle) => {
                *self.shared.outbound.lock() = Some(handle.outbound);
                self.inbound = Some(handle.inbound);
                let actions = self.shared.machine.lock().on_open();
                if actions.contains(&ConnectionAction::Emit(ConnectionEvent::Opened)) {
                    info!(url = %self.url, "channel open");
                }
                self.perform(actions);
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "handshake failed");
                let actions = self.shared.machine.lock().on_connect_failed(&e.to_string());
                self.perform(actions);
            }
        }
    }

    fn on_frame(&mut self, frame: Option<ChannelFrame>) {
        match frame {
            Some(ChannelFrame::Text(text)) => {
                self.emit(ConnectionEvent::Message(text));
            }
            Some(ChannelFrame::Error(message)) => {
                debug!(error = %message, "channel error");
                self.emit(ConnectionEvent::Error(message));
            }
            Some(ChannelFrame::Closed(reason)) => self.on_closed(reason),
            None => self.on_closed(DisconnectReason::with_code("channel dropped", 1006)),
        }
    }

    fn on_closed(&mut self, reason: DisconnectReason) {
        self.inbound = None;
        drop(self.shared.outbound.lock().take());
        info!(reason = %reason, "channel closed");
        let actions = self.shared.machine.lock().on_closed(reason);
        self.perform(actions);
    }

    fn send_heartbeat(&self) {
        let frame = match serde_json::to_string(&WireMessage::heartbeat()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "heartbeat encode failed");
                return;
            }
        };
        if !self.shared.send(frame) {
            debug!("heartbeat not sent");
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.shared.events.send(event);
    }

    fn perform(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::Connect => {
                    let transport = Arc::clone(&self.shared.transport);
                    let url = self.url.clone();
                    self.connecting = Some(Box::pin(async move { transport.connect(&url).await }));
                }
                ConnectionAction::ScheduleRetry(delay) => {
                    debug!(delay_ms = delay.as_millis(), "reconnect scheduled");
                    self.retry_at = Some(Instant::now() + delay);
                }
                ConnectionAction::CancelRetry => self.retry_at = None,
                ConnectionAction::StartHeartbeat => {
                    let period = self.shared.machine.lock().policy().heartbeat;
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.heartbeat = Some(interval);
                }
                ConnectionAction::StopHeartbeat => self.heartbeat = None,
                ConnectionAction::CloseChannel => {
                    self.inbound = None;
                    drop(self.shared.outbound.lock().take());
                }
                ConnectionAction::Emit(event) => {
                    if let ConnectionEvent::GaveUp { attempts } = event {
                        warn!(attempts, url = %self.url, "reconnect attempts exhausted, giving up");
                        self.finished = true;
                    }
                    self.emit(event);
                }
            }
        }
    }
}

async fn handshake(
    pending: &mut Option<PendingConnect>,
) -> Result<ChannelHandle, TransportError> {
    match pending {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(inbound: &mut Option<mpsc::Receiver<ChannelFrame>>) -> Option<ChannelFrame> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn retry_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn heartbeat_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
