//! Pure reducers: next entity value from the current value and one event.
//!
//! Reducers never touch the store. They return the new value, or
//! [`ResyncRequired`] when the event cannot be applied incrementally.

use chrono::{DateTime, Utc};
use pileup_core::{
    ActiveSession, EventPayload, InboundEvent, QueueEntry, QueueUpdate, SessionUpdate,
    StatusUpdate, SystemStatus,
};

use super::SyncState;
use super::reconcile;
use crate::errors::ResyncRequired;

/// Effect of a `status_update`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusEffect {
    /// New status value.
    pub status: SystemStatus,
    /// The queue must be emptied in the same commit.
    pub clear_queue: bool,
}

/// Next queue for a `queue_update`. `now` stands in for a missing timestamp.
pub fn reduce_queue(
    queue: &[QueueEntry],
    update: &QueueUpdate,
    now: DateTime<Utc>,
) -> Result<Vec<QueueEntry>, ResyncRequired> {
    let mut next = queue.to_vec();
    match update {
        QueueUpdate::Add {
            identifier,
            enqueued_at,
            position,
        } => {
            reconcile::merge_add(
                &mut next,
                identifier.clone(),
                enqueued_at.unwrap_or(now),
                *position,
            );
        }
        QueueUpdate::Remove { identifier } | QueueUpdate::Next { identifier } => {
            let _ = reconcile::remove(&mut next, identifier);
        }
        QueueUpdate::Clear => next.clear(),
        QueueUpdate::Unknown { action } => {
            return Err(ResyncRequired::new(format!("unknown queue action {action:?}")));
        }
    }
    Ok(next)
}

/// Next active session for a `session_update`.
///
/// A repeated `start` for the current identifier without a timestamp keeps
/// the original start time.
pub fn reduce_session(
    current: Option<&ActiveSession>,
    update: &SessionUpdate,
    now: DateTime<Utc>,
) -> Result<Option<ActiveSession>, ResyncRequired> {
    match update {
        SessionUpdate::Start {
            identifier,
            started_at,
            enrichment,
        } => {
            let started_at = started_at
                .or_else(|| {
                    current
                        .filter(|s| &s.identifier == identifier)
                        .map(|s| s.started_at)
                })
                .unwrap_or(now);
            Ok(Some(ActiveSession {
                identifier: identifier.clone(),
                started_at,
                enrichment: enrichment.clone(),
            }))
        }
        SessionUpdate::End => Ok(None),
        SessionUpdate::Unknown { action } => Err(ResyncRequired::new(format!(
            "unknown session action {action:?}"
        ))),
    }
}

/// Next status for a `status_update`.
pub fn reduce_status(update: StatusUpdate) -> StatusEffect {
    StatusEffect {
        status: SystemStatus {
            active: update.active,
        },
        clear_queue: update.queue_cleared,
    }
}

/// Full effect of one event on the mirrored state.
///
/// Returns `Ok(None)` for events that never change state (connection
/// greetings, heartbeats, unrecognized envelope types). Revisions are bumped
/// for every entity whose value changed.
pub fn reduce(state: &SyncState, event: &InboundEvent) -> Result<Option<SyncState>, ResyncRequired> {
    let now = event.timestamp.unwrap_or_else(Utc::now);
    let mut next = state.clone();

    match &event.payload {
        EventPayload::Queue(update) => {
            next.queue = reduce_queue(&state.queue, update, now)?;
        }
        EventPayload::Session(update) => {
            next.session = reduce_session(state.session.as_ref(), update, now)?;
        }
        EventPayload::Status(update) => {
            let effect = reduce_status(*update);
            next.status = effect.status;
            if effect.clear_queue {
                next.queue.clear();
            }
        }
        EventPayload::Malformed { kind, reason } => {
            return Err(ResyncRequired::new(format!("malformed {kind} payload: {reason}")));
        }
        EventPayload::Connection(_) | EventPayload::Heartbeat | EventPayload::Unrecognized { .. } => {
            return Ok(None);
        }
    }

    if next.queue != state.queue {
        next.revisions.queue += 1;
    }
    if next.session != state.session {
        next.revisions.session += 1;
    }
    if next.status != state.status {
        next.revisions.status += 1;
    }
    Ok(Some(next))
}
