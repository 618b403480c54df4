//! In-memory collaborators shared by the integration tests.

#![allow(dead_code, missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use pileup_api::{ApiError, QueueApi};
use pileup_core::{ActiveSession, Identifier, QueueEntry, QueueList, SystemStatus};
use pileup_sync::connection::{ChannelFrame, ChannelHandle, DisconnectReason, Transport};
use pileup_sync::{
    EngineConfig, EngineNotice, ReconnectPolicy, SyncEngine, SyncState, TransportError,
};
use pileup_settings::SyncSettings;
use tokio::sync::{Semaphore, broadcast, mpsc};

pub const WS_URL: &str = "ws://pileup.test/api/ws";

pub fn ts(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
}

pub fn entry(id: &str, position: u32) -> QueueEntry {
    QueueEntry::new(id.into(), ts(position), position)
}

pub fn policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        interval: Duration::from_millis(3_000),
        max_attempts,
        heartbeat: Duration::from_secs(30),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Server side of one accepted fake channel.
pub struct FakePeer {
    to_client: mpsc::Sender<ChannelFrame>,
    from_client: mpsc::Receiver<String>,
}

impl FakePeer {
    pub async fn send_json(&self, value: serde_json::Value) {
        self.send_text(value.to_string()).await;
    }

    pub async fn send_text(&self, text: impl Into<String>) {
        self.to_client
            .send(ChannelFrame::Text(text.into()))
            .await
            .expect("client side dropped");
    }

    pub async fn close(&self, code: u16) {
        let _ = self
            .to_client
            .send(ChannelFrame::Closed(DisconnectReason::with_code("server closed", code)))
            .await;
    }

    /// Next frame the client sent, or `None` once the client dropped the
    /// channel.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }
}

/// Transport that hands each accepted channel's server side to the test.
pub struct FakeTransport {
    refusing: AtomicBool,
    connects: AtomicUsize,
    peers: mpsc::UnboundedSender<FakePeer>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                refusing: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                peers,
            }),
            rx,
        )
    }

    /// Refuse (or accept again) every subsequent handshake.
    pub fn refuse(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _url: &str) -> Result<ChannelHandle, TransportError> {
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Handshake("connection refused".into()));
        }
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let _ = self.peers.send(FakePeer {
            to_client: in_tx,
            from_client: out_rx,
        });
        Ok(ChannelHandle {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted snapshot and write endpoints.
pub struct FakeApi {
    pub queue: Mutex<Result<QueueList, ApiError>>,
    pub session: Mutex<Result<Option<ActiveSession>, ApiError>>,
    pub status: Mutex<Result<SystemStatus, ApiError>>,
    pub register_result: Mutex<Option<Result<QueueEntry, ApiError>>>,
    pub lookup_result: Mutex<Option<QueueEntry>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub list_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(Ok(QueueList {
                queue: Vec::new(),
                total: 0,
                max_size: None,
                system_active: None,
            })),
            session: Mutex::new(Ok(None)),
            status: Mutex::new(Ok(SystemStatus { active: true })),
            register_result: Mutex::new(None),
            lookup_result: Mutex::new(None),
            gate: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_queue(&self, entries: Vec<QueueEntry>) {
        let total = u32::try_from(entries.len()).unwrap();
        *self.queue.lock() = Ok(QueueList {
            queue: entries,
            total,
            max_size: Some(10),
            system_active: Some(true),
        });
    }

    /// Block every snapshot read until the returned semaphore gets permits.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl QueueApi for FakeApi {
    async fn queue_list(&self) -> pileup_api::Result<QueueList> {
        let _ = self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        self.queue.lock().clone()
    }

    async fn current_session(&self) -> pileup_api::Result<Option<ActiveSession>> {
        self.wait_gate().await;
        self.session.lock().clone()
    }

    async fn system_status(&self) -> pileup_api::Result<SystemStatus> {
        self.wait_gate().await;
        self.status.lock().clone()
    }

    async fn register(&self, identifier: &Identifier) -> pileup_api::Result<QueueEntry> {
        let _ = self.register_calls.fetch_add(1, Ordering::SeqCst);
        match self.register_result.lock().clone() {
            Some(result) => result,
            None => Ok(QueueEntry::new(identifier.clone(), ts(30), 1)),
        }
    }

    async fn lookup(&self, identifier: &Identifier) -> pileup_api::Result<Option<QueueEntry>> {
        Ok(self
            .lookup_result
            .lock()
            .clone()
            .filter(|e| &e.identifier == identifier))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn engine(api: Arc<FakeApi>, transport: Arc<FakeTransport>, sync: SyncSettings) -> SyncEngine {
    SyncEngine::new(
        EngineConfig {
            ws_url: WS_URL.to_string(),
            policy: policy(3),
            sync,
        },
        api,
        transport,
    )
}

/// Wait until the store satisfies `predicate`.
pub async fn wait_for_state<F>(engine: &SyncEngine, predicate: F) -> SyncState
where
    F: Fn(&SyncState) -> bool,
{
    let mut rx = engine.store().watch();
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            {
                let state = rx.borrow_and_update();
                if predicate(&state) {
                    return state.clone();
                }
            }
            rx.changed().await.expect("store dropped");
        }
    })
    .await
    .expect("state condition not reached")
}

/// Wait for the first notice matching `predicate`.
pub async fn wait_for_notice<F>(rx: &mut broadcast::Receiver<EngineNotice>, predicate: F) -> EngineNotice
where
    F: Fn(&EngineNotice) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Ok(notice) if predicate(&notice) => return notice,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("notice channel closed"),
            }
        }
    })
    .await
    .expect("notice not received")
}
