//! The sync engine: bootstrap, live routing, resync and optimistic intents.
//!
//! [`SyncEngine`] wires a [`ConnectionManager`], an [`EventDispatcher`] and a
//! [`StateStore`] to a [`QueueApi`]. One pump task consumes connection events
//! in arrival order; every frame is decoded, reduced into the store, then
//! handed to dispatcher listeners. Bootstraps and registrations run
//! concurrently and commit through the same lock-guarded reducers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use pileup_api::{ApiError, HttpQueueApi, QueueApi};
use pileup_core::{EventPayload, Identifier, InboundEvent, QueueEntry};
use pileup_settings::{PileupSettings, SyncSettings};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::connection::{
    ConnectionEvent, ConnectionEvents, ConnectionManager, Connectivity, DisconnectReason,
    ReconnectPolicy, Transport, WebSocketTransport,
};
use crate::dispatcher::EventDispatcher;
use crate::errors::{
    BootstrapError, BootstrapFailure, ConnectionError, RegisterError, SnapshotEndpoint,
};
use crate::store::{Snapshot, SnapshotOutcome, StateStore};

/// Capacity of the notice broadcast.
const NOTICE_CAPACITY: usize = 64;

/// Consecutive follow-up bootstraps scheduled after a partially stale one.
const MAX_STALE_FOLLOWUPS: u32 = 3;

/// Engine construction parameters.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Push-channel URL.
    pub ws_url: String,
    /// Reconnect and heartbeat timing.
    pub policy: ReconnectPolicy,
    /// Reconciliation behavior.
    pub sync: SyncSettings,
}

impl EngineConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &PileupSettings) -> Self {
        Self {
            ws_url: settings.server.resolved_ws_url(),
            policy: ReconnectPolicy::from(&settings.connection),
            sync: settings.sync.clone(),
        }
    }
}

/// Out-of-band engine status for the presentation layer.
#[derive(Clone, Debug)]
pub enum EngineNotice {
    /// Connectivity changed.
    Connectivity(Connectivity),
    /// A channel close was observed.
    Disconnected {
        /// Why.
        reason: DisconnectReason,
        /// Consecutive failures.
        attempt: u32,
    },
    /// A snapshot was applied.
    Bootstrapped(SnapshotOutcome),
    /// A snapshot failed; nothing was applied.
    BootstrapFailed(BootstrapError),
    /// An event could not be applied incrementally; a snapshot was requested.
    ResyncRequested {
        /// What triggered it.
        reason: String,
    },
    /// Reconnect attempts exhausted. The owner must restart explicitly.
    ConnectionGaveUp {
        /// Consecutive failures.
        attempts: u32,
    },
}

struct EngineInner {
    config: EngineConfig,
    api: Arc<dyn QueueApi>,
    connection: ConnectionManager,
    dispatcher: EventDispatcher,
    store: StateStore,
    notices: broadcast::Sender<EngineNotice>,
    bootstraps: Mutex<JoinSet<()>>,
    opened_once: AtomicBool,
    stale_followups: AtomicU32,
    shut_down: AtomicBool,
}

/// Client-side synchronization engine.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    events: Mutex<Option<ConnectionEvents>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Build an engine around explicit collaborators. Nothing runs until
    /// [`start`](Self::start) or [`bootstrap`](Self::bootstrap).
    pub fn new(config: EngineConfig, api: Arc<dyn QueueApi>, transport: Arc<dyn Transport>) -> Self {
        let (connection, events) = ConnectionManager::new(transport, config.policy);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                config,
                api,
                connection,
                dispatcher: EventDispatcher::new(),
                store: StateStore::new(),
                notices,
                bootstraps: Mutex::new(JoinSet::new()),
                opened_once: AtomicBool::new(false),
                stale_followups: AtomicU32::new(0),
                shut_down: AtomicBool::new(false),
            }),
            events: Mutex::new(Some(events)),
            pump: Mutex::new(None),
        }
    }

    /// Build an engine over HTTP and WebSocket from loaded settings.
    pub fn from_settings(settings: &PileupSettings) -> Result<Self, ApiError> {
        let api = HttpQueueApi::new(
            &settings.server.api_base_url,
            settings.server.request_timeout(),
        )?;
        Ok(Self::new(
            EngineConfig::from_settings(settings),
            Arc::new(api),
            Arc::new(WebSocketTransport::new()),
        ))
    }

    /// Open the push channel. Every successful open triggers a bootstrap
    /// (only the first one when `resync_on_reconnect` is off).
    pub fn start(&self) -> Result<(), ConnectionError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(ConnectionError::Stopped);
        }
        if let Some(events) = self.events.lock().take() {
            let inner = Arc::clone(&self.inner);
            *self.pump.lock() = Some(tokio::spawn(pump(inner, events)));
        }
        self.inner.connection.start(&self.inner.config.ws_url)
    }

    /// Fetch the three snapshots concurrently and apply them all, or nothing.
    pub async fn bootstrap(&self) -> Result<SnapshotOutcome, BootstrapError> {
        self.inner.bootstrap().await
    }

    /// Manual resync.
    pub async fn refresh(&self) -> Result<SnapshotOutcome, BootstrapError> {
        info!("manual refresh");
        self.inner.bootstrap().await
    }

    /// Register `raw` with the server and show it in the queue immediately.
    ///
    /// The identifier is normalized first; empty (and, when validation is on,
    /// malformed) input is rejected without calling the server. On success
    /// the returned entry is appended unless the identifier is already
    /// waiting. On failure the store is untouched.
    pub async fn register_identifier(&self, raw: &str) -> Result<QueueEntry, RegisterError> {
        let identifier = Identifier::normalize(raw);
        if identifier.is_empty()
            || (self.inner.config.sync.validate_callsigns && !identifier.is_valid_callsign())
        {
            warn!(input = raw, "rejecting identifier locally");
            return Err(RegisterError::InvalidIdentifier(raw.to_string()));
        }

        let entry = self
            .inner
            .api
            .register(&identifier)
            .await
            .inspect_err(|e| warn!(identifier = %identifier, error = %e, "registration failed"))?;

        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Ok(entry);
        }
        let inserted = self.inner.store.insert_optimistic(entry.clone());
        info!(
            identifier = %entry.identifier,
            position = entry.position,
            inserted,
            "registered"
        );
        Ok(entry)
    }

    /// Ask the server for one identifier's entry. `None` when not waiting.
    pub async fn lookup_identifier(&self, raw: &str) -> Result<Option<QueueEntry>, ApiError> {
        let identifier = Identifier::normalize(raw);
        if identifier.is_empty() {
            return Ok(None);
        }
        self.inner.api.lookup(&identifier).await
    }

    /// The observable store.
    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    /// Listener registry for decoded events.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Current push-channel connectivity.
    pub fn connectivity(&self) -> Connectivity {
        self.inner.connection.connectivity()
    }

    /// Subscribe to out-of-band notices.
    pub fn notices(&self) -> broadcast::Receiver<EngineNotice> {
        self.inner.notices.subscribe()
    }

    /// Tear down: stop the channel and its timers, abort the pump and any
    /// in-flight bootstrap, and silence every listener. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.connection.stop();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.inner.bootstraps.lock().abort_all();
        self.inner.dispatcher.dispose();
        info!("sync engine shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) ran.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump(inner: Arc<EngineInner>, mut events: ConnectionEvents) {
    while let Some(event) = events.recv().await {
        if inner.shut_down.load(Ordering::SeqCst) {
            break;
        }
        inner.on_connection_event(event);
    }
}

impl EngineInner {
    fn notify(&self, notice: EngineNotice) {
        let _ = self.notices.send(notice);
    }

    fn on_connection_event(self: &Arc<Self>, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                self.notify(EngineNotice::Connectivity(self.connection.connectivity()));
                let first = !self.opened_once.swap(true, Ordering::SeqCst);
                if first || self.config.sync.resync_on_reconnect {
                    self.spawn_bootstrap(if first { "initial open" } else { "reconnect" });
                }
            }
            ConnectionEvent::Message(raw) => self.handle_frame(&raw),
            ConnectionEvent::Closed {
                reason,
                attempt,
                retry_in,
            } => {
                info!(
                    reason = %reason,
                    attempt,
                    retry_in_ms = retry_in.map(|d| d.as_millis()),
                    "push channel closed"
                );
                self.notify(EngineNotice::Disconnected { reason, attempt });
                self.notify(EngineNotice::Connectivity(self.connection.connectivity()));
            }
            ConnectionEvent::Error(message) => debug!(error = %message, "push channel error"),
            ConnectionEvent::GaveUp { attempts } => {
                error!(attempts, "push channel unavailable, giving up");
                self.notify(EngineNotice::ConnectionGaveUp { attempts });
            }
        }
    }

    fn handle_frame(self: &Arc<Self>, raw: &str) {
        let event = match InboundEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                self.request_resync(format!("undecodable frame: {e}"));
                return;
            }
        };
        if let EventPayload::Unrecognized { kind } = &event.payload {
            debug!(kind = %kind, "ignoring unrecognized event type");
            return;
        }

        match self.store.apply_event(&event) {
            Ok(changed) => debug!(event = %event.label(), changed, "event applied"),
            Err(resync) => self.request_resync(resync.reason),
        }
        let _ = self.dispatcher.dispatch(&event);
    }

    fn request_resync(self: &Arc<Self>, reason: String) {
        warn!(reason = %reason, "resync requested");
        self.notify(EngineNotice::ResyncRequested { reason });
        self.spawn_bootstrap("resync");
    }

    fn spawn_bootstrap(self: &Arc<Self>, trigger: &'static str) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        debug!(trigger, "scheduling bootstrap");
        let inner = Arc::clone(self);
        let mut bootstraps = self.bootstraps.lock();
        while bootstraps.try_join_next().is_some() {}
        let _ = bootstraps.spawn(async move {
            let _ = inner.bootstrap().await;
        });
    }

    async fn bootstrap(self: &Arc<Self>) -> Result<SnapshotOutcome, BootstrapError> {
        let marker = self.store.revisions();
        let (queue, session, status) = tokio::join!(
            self.api.queue_list(),
            self.api.current_session(),
            self.api.system_status(),
        );

        let mut failures = Vec::new();
        let mut record = |endpoint, error| failures.push(BootstrapFailure { endpoint, error });
        let queue = queue.map_err(|e| record(SnapshotEndpoint::QueueList, e)).ok();
        let session = session
            .map_err(|e| record(SnapshotEndpoint::CurrentSession, e))
            .ok();
        let status = status.map_err(|e| record(SnapshotEndpoint::SystemStatus, e)).ok();

        let (Some(queue), Some(session), Some(status)) = (queue, session, status) else {
            let err = BootstrapError { failures };
            warn!(error = %err, "bootstrap failed, store untouched");
            self.notify(EngineNotice::BootstrapFailed(err.clone()));
            return Err(err);
        };

        if self.shut_down.load(Ordering::SeqCst) {
            return Ok(SnapshotOutcome::default());
        }
        let outcome = self.store.apply_snapshot(
            Snapshot {
                queue,
                session,
                status,
            },
            marker,
        );
        info!(
            queue = outcome.queue,
            session = outcome.session,
            status = outcome.status,
            "bootstrap applied"
        );
        self.notify(EngineNotice::Bootstrapped(outcome));
        self.follow_up_stale(outcome);
        Ok(outcome)
    }

    /// A skipped entity kept only the live deltas that raced the fetch, so
    /// read it again. Bounded so a steady event stream cannot loop forever.
    fn follow_up_stale(self: &Arc<Self>, outcome: SnapshotOutcome) {
        if outcome.is_complete() {
            self.stale_followups.store(0, Ordering::SeqCst);
            return;
        }
        let pass = self.stale_followups.fetch_add(1, Ordering::SeqCst) + 1;
        if pass > MAX_STALE_FOLLOWUPS {
            warn!(pass, "snapshot still stale, waiting for the next resync");
            self.stale_followups.store(0, Ordering::SeqCst);
            return;
        }
        debug!(pass, "snapshot partially stale, fetching again");
        self.spawn_bootstrap("stale snapshot");
    }
}
