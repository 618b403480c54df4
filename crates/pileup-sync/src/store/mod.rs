//! Observable state store for the three mirrored entities.
//!
//! All mutation goes through the pure reducers. Each event's complete effect
//! is committed under one lock, and subscribers are then notified once with
//! the committed state, so cross-entity effects (a status change that clears
//! the queue) are never observed half-applied.

pub mod reconcile;
pub mod reducers;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use pileup_core::{ActiveSession, InboundEvent, QueueEntry, QueueList, SystemStatus};
use serde_json::json;
use tokio::sync::watch;
use tracing::debug;

use crate::errors::ResyncRequired;

/// Per-entity local revision, bumped on every committed change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Revisions {
    /// Queue revision.
    pub queue: u64,
    /// Active-session revision.
    pub session: u64,
    /// System-status revision.
    pub status: u64,
}

/// The mirrored state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncState {
    /// Waiting line, positions 1..=len in order.
    pub queue: Vec<QueueEntry>,
    /// Station currently being worked.
    pub session: Option<ActiveSession>,
    /// System on/off.
    pub status: SystemStatus,
    /// Staleness markers.
    pub revisions: Revisions,
    /// Whether a snapshot has been applied at least once.
    pub bootstrapped: bool,
}

impl SyncState {
    /// Whether `identifier` is waiting.
    pub fn contains(&self, identifier: &pileup_core::Identifier) -> bool {
        reconcile::find(&self.queue, identifier).is_some()
    }

    /// JSON rendering in the server's field spelling.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "queue": self.queue,
            "current": self.session,
            "status": self.status,
        })
    }
}

/// Result of the three snapshot reads.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// Queue list read.
    pub queue: QueueList,
    /// Current session read.
    pub session: Option<ActiveSession>,
    /// Status read.
    pub status: SystemStatus,
}

/// Which entities a snapshot replaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    /// Queue replaced.
    pub queue: bool,
    /// Session replaced.
    pub session: bool,
    /// Status replaced.
    pub status: bool,
}

impl SnapshotOutcome {
    /// Whether every entity was replaced.
    pub fn is_complete(&self) -> bool {
        self.queue && self.session && self.status
    }
}

/// Handle for removing a store subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&SyncState) + Send + Sync>;

/// Owner of the mirrored state.
pub struct StateStore {
    state: Mutex<SyncState>,
    /// Serializes commit + notify so subscribers see commits in order.
    commit: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
    watch: watch::Sender<SyncState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// An empty store.
    pub fn new() -> Self {
        let (watch, _) = watch::channel(SyncState::default());
        Self {
            state: Mutex::new(SyncState::default()),
            commit: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            watch,
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SyncState {
        self.state.lock().clone()
    }

    /// Current revisions, captured as a staleness marker.
    pub fn revisions(&self) -> Revisions {
        self.state.lock().revisions
    }

    /// Register a synchronous change listener. It runs after every commit
    /// with the committed state and must not mutate the store.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Async view of the committed state.
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.watch.subscribe()
    }

    /// Route one event through the reducers and commit its effect.
    /// Returns whether anything changed.
    pub fn apply_event(&self, event: &InboundEvent) -> Result<bool, ResyncRequired> {
        self.commit_with(|state| {
            let next = reducers::reduce(state, event)?;
            Ok(match next {
                Some(next) if next != *state => {
                    *state = next;
                    true
                }
                _ => false,
            })
        })
    }

    /// Apply a snapshot fetched after `marker` was captured. Each entity is
    /// replaced only if its revision has not moved since; a live event that
    /// landed in the meantime wins.
    pub fn apply_snapshot(&self, snapshot: Snapshot, marker: Revisions) -> SnapshotOutcome {
        let result: Result<SnapshotOutcome, ResyncRequired> = self.commit_with(|state| {
            let mut outcome = SnapshotOutcome::default();

            if state.revisions.queue == marker.queue {
                state.queue = reconcile::normalize_snapshot(snapshot.queue.queue);
                state.revisions.queue += 1;
                outcome.queue = true;
            } else {
                debug!(
                    marker = marker.queue,
                    current = state.revisions.queue,
                    "queue snapshot stale, keeping live data"
                );
            }

            if state.revisions.session == marker.session {
                state.session = snapshot.session;
                state.revisions.session += 1;
                outcome.session = true;
            } else {
                debug!("session snapshot stale, keeping live data");
            }

            if state.revisions.status == marker.status {
                state.status = snapshot.status;
                state.revisions.status += 1;
                outcome.status = true;
            } else {
                debug!("status snapshot stale, keeping live data");
            }

            state.bootstrapped = true;
            Ok(outcome)
        });
        result.unwrap_or_default()
    }

    /// Append a confirmed registration unless the identifier is already
    /// waiting. Returns whether the queue changed.
    pub fn insert_optimistic(&self, entry: QueueEntry) -> bool {
        let result: Result<bool, ResyncRequired> = self.commit_with(|state| {
            let inserted = reconcile::insert_optimistic(&mut state.queue, entry);
            if inserted {
                state.revisions.queue += 1;
            }
            Ok(inserted)
        });
        result.unwrap_or(false)
    }

    /// Run `mutate` under the state lock; when it reports a change, publish
    /// the committed state to every subscriber.
    fn commit_with<R, F>(&self, mutate: F) -> Result<R, ResyncRequired>
    where
        F: FnOnce(&mut SyncState) -> Result<R, ResyncRequired>,
        R: Changed,
    {
        let _order = self.commit.lock();
        let (result, committed) = {
            let mut state = self.state.lock();
            let before = state.revisions;
            let bootstrapped = state.bootstrapped;
            let result = mutate(&mut state)?;
            let changed = result.changed()
                && (state.revisions != before || state.bootstrapped != bootstrapped);
            (result, changed.then(|| state.clone()))
        };

        if let Some(committed) = committed {
            let _ = self.watch.send_replace(committed.clone());
            let subscribers: Vec<Subscriber> = self
                .subscribers
                .lock()
                .iter()
                .map(|(_, s)| Arc::clone(s))
                .collect();
            for subscriber in subscribers {
                subscriber(&committed);
            }
        }
        Ok(result)
    }
}

/// Whether a commit result represents a change worth publishing.
trait Changed {
    fn changed(&self) -> bool;
}

impl Changed for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl Changed for SnapshotOutcome {
    fn changed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pileup_core::{EventPayload, QueueUpdate, SessionUpdate, StatusUpdate};

    fn ts(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
    }

    fn add(id: &str) -> InboundEvent {
        InboundEvent::new(EventPayload::Queue(QueueUpdate::Add {
            identifier: id.into(),
            enqueued_at: Some(ts(1)),
            position: None,
        }))
    }

    fn snapshot(ids: &[&str], active: bool) -> Snapshot {
        Snapshot {
            queue: QueueList {
                queue: ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| QueueEntry::new((*id).into(), ts(0), u32::try_from(i + 1).unwrap()))
                    .collect(),
                total: u32::try_from(ids.len()).unwrap(),
                max_size: None,
                system_active: None,
            },
            session: None,
            status: SystemStatus { active },
        }
    }

    #[test]
    fn apply_event_commits_and_notifies_once() {
        let store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _ = store.subscribe(move |state| s.lock().push(state.queue.len()));

        assert!(store.apply_event(&add("W1AW")).unwrap());
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(store.revisions().queue, 1);
    }

    #[test]
    fn no_op_event_does_not_notify() {
        let store = StateStore::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let _ = store.subscribe(move |_| {
            let _ = c.fetch_add(1, Ordering::SeqCst);
        });

        let remove = InboundEvent::new(EventPayload::Queue(QueueUpdate::Remove {
            identifier: "W1AW".into(),
        }));
        assert!(!store.apply_event(&remove).unwrap());
        assert!(!store.apply_event(&InboundEvent::new(EventPayload::Heartbeat)).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_action_leaves_state_untouched() {
        let store = StateStore::new();
        let _ = store.apply_event(&add("W1AW")).unwrap();
        let before = store.snapshot();

        let unknown = InboundEvent::new(EventPayload::Session(SessionUpdate::Unknown {
            action: "pause".into(),
        }));
        assert!(store.apply_event(&unknown).is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn status_clear_is_observed_atomically() {
        let store = StateStore::new();
        let _ = store.apply_snapshot(snapshot(&["W1AW", "K1ABC"], true), Revisions::default());

        let observed = Arc::new(Mutex::new(Vec::new()));
        let o = Arc::clone(&observed);
        let _ = store.subscribe(move |state| {
            o.lock().push((state.queue.len(), state.status.active));
        });

        let event = InboundEvent::new(EventPayload::Status(StatusUpdate {
            active: false,
            queue_cleared: true,
        }));
        assert!(store.apply_event(&event).unwrap());
        assert_eq!(*observed.lock(), vec![(0, false)]);
    }

    #[test]
    fn stale_queue_snapshot_keeps_live_add() {
        let store = StateStore::new();
        let marker = store.revisions();

        // Live event lands while the snapshot is in flight.
        let _ = store.apply_event(&add("N0CALL")).unwrap();

        let outcome = store.apply_snapshot(snapshot(&["W1AW"], true), marker);
        assert!(!outcome.queue);
        assert!(outcome.session && outcome.status);

        let state = store.snapshot();
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.queue[0].identifier.as_str(), "N0CALL");
        assert!(state.status.active);
        assert!(state.bootstrapped);
    }

    #[test]
    fn snapshot_replaces_when_fresh() {
        let store = StateStore::new();
        let _ = store.apply_event(&add("N0CALL")).unwrap();
        let outcome = store.apply_snapshot(snapshot(&["W1AW", "K1ABC"], false), store.revisions());
        assert!(outcome.is_complete());
        let ids: Vec<_> = store
            .snapshot()
            .queue
            .iter()
            .map(|e| e.identifier.to_string())
            .collect();
        assert_eq!(ids, vec!["W1AW", "K1ABC"]);
    }

    #[test]
    fn optimistic_insert_is_deduplicated() {
        let store = StateStore::new();
        assert!(store.insert_optimistic(QueueEntry::new("K1ABC".into(), ts(0), 1)));
        assert!(!store.insert_optimistic(QueueEntry::new("K1ABC".into(), ts(0), 1)));
        assert_eq!(store.snapshot().queue.len(), 1);
    }

    #[tokio::test]
    async fn watch_sees_committed_state() {
        let store = StateStore::new();
        let mut rx = store.watch();
        let _ = store.apply_event(&add("W1AW")).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().queue.len(), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = StateStore::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = store.subscribe(move |_| {
            let _ = c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(store.unsubscribe(id));
        let _ = store.apply_event(&add("W1AW")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn json_uses_wire_names() {
        let store = StateStore::new();
        let _ = store.apply_event(&add("W1AW")).unwrap();
        let json = store.snapshot().to_json();
        assert_eq!(json["queue"][0]["callsign"], "W1AW");
        assert_eq!(json["status"]["active"], false);
    }
}
