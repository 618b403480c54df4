//! Typed publish/subscribe for inbound events.
//!
//! Delivery is synchronous and in registration order. Each listener is
//! isolated: an `Err` return or a panic is logged and counted, and the
//! remaining listeners still run. Events are not retained; a listener added
//! after an event was dispatched never sees it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use pileup_core::{EventKind, InboundEvent};
use tracing::{debug, error, warn};

/// Listener callback.
pub type Listener = Arc<dyn Fn(&InboundEvent) -> anyhow::Result<()> + Send + Sync>;

/// Handle for removing a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Outcome of one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked.
    pub failed: usize,
}

/// Routes events to the listeners registered for their kind.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

impl EventDispatcher {
    /// An empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`.
    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&InboundEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self.is_disposed() {
            debug!(%kind, "listener added after dispose, ignoring");
            return id;
        }
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        list.len() != before
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every listener of its kind.
    pub fn dispatch(&self, event: &InboundEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        if self.is_disposed() {
            return report;
        }
        let Some(kind) = event.kind() else {
            return report;
        };

        // Snapshot so listeners may add or remove listeners re-entrantly.
        let targets: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for (id, listener) in targets {
            if self.is_disposed() {
                break;
            }
            match std::panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(%kind, listener = id.0, error = %e, "listener failed");
                    report.failed += 1;
                }
                Err(_panic) => {
                    error!(%kind, listener = id.0, "listener panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Drop every listener and refuse further delivery.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.listeners.write().clear();
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pileup_core::logging::capture_logs;
    use pileup_core::{EventPayload, QueueUpdate, StatusUpdate};
    use tracing::Level;

    fn clear_event() -> InboundEvent {
        InboundEvent::new(EventPayload::Queue(QueueUpdate::Clear))
    }

    #[test]
    fn delivers_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = Arc::clone(&seen);
            let _ = dispatcher.add_listener(EventKind::Queue, move |_| {
                seen.lock().push(n);
                Ok(())
            });
        }

        let report = dispatcher.dispatch(&clear_event());
        assert_eq!(report.delivered, 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn routes_by_kind_only() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let _ = dispatcher.add_listener(EventKind::Status, move |_| {
            let _ = h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let _ = dispatcher.dispatch(&clear_event());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let status = InboundEvent::new(EventPayload::Status(StatusUpdate {
            active: true,
            queue_cleared: false,
        }));
        let _ = dispatcher.dispatch(&status);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let dispatcher = EventDispatcher::new();
        let reached = Arc::new(AtomicBool::new(false));
        let _ = dispatcher.add_listener(EventKind::Queue, |_| anyhow::bail!("render failed"));
        let _ = dispatcher.add_listener(EventKind::Queue, |_| panic!("listener bug"));
        let r = Arc::clone(&reached);
        let _ = dispatcher.add_listener(EventKind::Queue, move |_| {
            r.store(true, Ordering::SeqCst);
            Ok(())
        });

        let report = dispatcher.dispatch(&clear_event());
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert!(reached.load(Ordering::SeqCst));
    }

    #[test]
    fn listener_failures_are_logged() {
        let (logs, _guard) = capture_logs();
        let dispatcher = EventDispatcher::new();
        let _ = dispatcher.add_listener(EventKind::Queue, |_| anyhow::bail!("render failed"));
        let _ = dispatcher.add_listener(EventKind::Queue, |_| panic!("listener bug"));

        let _ = dispatcher.dispatch(&clear_event());
        assert!(logs.has_event(Level::WARN, "listener failed"));
        assert!(logs.has_event(Level::ERROR, "listener panicked"));
    }

    #[test]
    fn remove_listener_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let id = dispatcher.add_listener(EventKind::Queue, |_| Ok(()));
        assert_eq!(dispatcher.listener_count(EventKind::Queue), 1);
        assert!(dispatcher.remove_listener(EventKind::Queue, id));
        assert!(!dispatcher.remove_listener(EventKind::Queue, id));
        assert_eq!(dispatcher.dispatch(&clear_event()).delivered, 0);
    }

    #[test]
    fn listener_may_register_during_dispatch() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let d = Arc::clone(&dispatcher);
        let _ = dispatcher.add_listener(EventKind::Queue, move |_| {
            let _ = d.add_listener(EventKind::Queue, |_| Ok(()));
            Ok(())
        });

        // The listener added mid-dispatch is not part of this round.
        assert_eq!(dispatcher.dispatch(&clear_event()).delivered, 1);
        assert_eq!(dispatcher.listener_count(EventKind::Queue), 2);
    }

    #[test]
    fn unrecognized_events_reach_nobody() {
        let dispatcher = EventDispatcher::new();
        let _ = dispatcher.add_listener(EventKind::Queue, |_| Ok(()));
        let event = InboundEvent::new(EventPayload::Unrecognized {
            kind: "chat_message".into(),
        });
        assert_eq!(dispatcher.dispatch(&event), DispatchReport::default());
    }

    #[test]
    fn dispose_silences_everything() {
        let dispatcher = EventDispatcher::new();
        let _ = dispatcher.add_listener(EventKind::Queue, |_| Ok(()));
        dispatcher.dispose();
        assert_eq!(dispatcher.dispatch(&clear_event()).delivered, 0);
        let _ = dispatcher.add_listener(EventKind::Queue, |_| Ok(()));
        assert_eq!(dispatcher.listener_count(EventKind::Queue), 0);
    }
}
