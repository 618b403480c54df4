//! Queue reconciliation: dedup on the normalized identifier, push-wins merge,
//! and position renumbering.

use chrono::{DateTime, Utc};
use pileup_core::{Identifier, QueueEntry};

/// Recompute every `position` from list order (1-based).
pub fn renumber(queue: &mut [QueueEntry]) {
    for (idx, entry) in queue.iter_mut().enumerate() {
        entry.position = u32::try_from(idx + 1).unwrap_or(u32::MAX);
    }
}

/// Index of the entry for `identifier`, if present.
pub fn find(queue: &[QueueEntry], identifier: &Identifier) -> Option<usize> {
    queue.iter().position(|e| &e.identifier == identifier)
}

/// Apply a pushed `add`.
///
/// A new identifier is always appended; its pushed position is ignored so a
/// stale payload cannot jump it ahead of earlier arrivals. An identifier
/// already present (for example from an optimistic insert) is merged: the
/// pushed timestamp replaces the local one and a pushed position moves the
/// entry to that slot; without a position it stays where it is. The queue is
/// renumbered afterwards.
pub fn merge_add(
    queue: &mut Vec<QueueEntry>,
    identifier: Identifier,
    enqueued_at: DateTime<Utc>,
    position: Option<u32>,
) {
    match find(queue, &identifier) {
        Some(idx) => {
            let mut existing = queue.remove(idx);
            existing.enqueued_at = enqueued_at;
            let slot = position
                .and_then(|p| usize::try_from(p).ok())
                .map_or(idx, |p| p.saturating_sub(1).min(queue.len()));
            queue.insert(slot, existing);
        }
        None => queue.push(QueueEntry::new(identifier, enqueued_at, 0)),
    }
    renumber(queue);
}

/// Append a locally confirmed entry unless its identifier is already present.
/// Returns whether the queue changed.
pub fn insert_optimistic(queue: &mut Vec<QueueEntry>, entry: QueueEntry) -> bool {
    if find(queue, &entry.identifier).is_some() {
        return false;
    }
    queue.push(entry);
    renumber(queue);
    true
}

/// Drop every entry for `identifier`. Returns whether the queue changed.
pub fn remove(queue: &mut Vec<QueueEntry>, identifier: &Identifier) -> bool {
    let before = queue.len();
    queue.retain(|e| &e.identifier != identifier);
    let changed = queue.len() != before;
    if changed {
        renumber(queue);
    }
    changed
}

/// Normalize a snapshot list: keep the first entry per identifier, drop empty
/// identifiers, renumber.
pub fn normalize_snapshot(entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    let mut queue: Vec<QueueEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.identifier.is_empty() || find(&queue, &entry.identifier).is_some() {
            continue;
        }
        queue.push(entry);
    }
    renumber(&mut queue);
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
    }

    fn ids(queue: &[QueueEntry]) -> Vec<&str> {
        queue.iter().map(|e| e.identifier.as_str()).collect()
    }

    fn queue_of(names: &[&str]) -> Vec<QueueEntry> {
        let mut q: Vec<QueueEntry> = names
            .iter()
            .enumerate()
            .map(|(i, n)| QueueEntry::new((*n).into(), ts(u32::try_from(i).unwrap()), 0))
            .collect();
        renumber(&mut q);
        q
    }

    #[test]
    fn merge_add_appends_new() {
        let mut q = queue_of(&["W1AW"]);
        merge_add(&mut q, "K1ABC".into(), ts(5), None);
        assert_eq!(ids(&q), vec!["W1AW", "K1ABC"]);
        assert_eq!(q[1].position, 2);
    }

    #[test]
    fn merge_add_existing_push_wins_timestamp() {
        let mut q = queue_of(&["W1AW", "K1ABC"]);
        merge_add(&mut q, "k1abc".into(), ts(30), Some(2));
        assert_eq!(ids(&q), vec!["W1AW", "K1ABC"]);
        assert_eq!(q[1].enqueued_at, ts(30));
    }

    #[test]
    fn merge_add_without_position_keeps_slot() {
        let mut q = queue_of(&["W1AW", "K1ABC", "N0CALL"]);
        merge_add(&mut q, "W1AW".into(), ts(0), None);
        assert_eq!(ids(&q), vec!["W1AW", "K1ABC", "N0CALL"]);
    }

    #[test]
    fn merge_add_moves_to_pushed_position() {
        let mut q = queue_of(&["W1AW", "N0CALL", "K1ABC"]);
        merge_add(&mut q, "K1ABC".into(), ts(30), Some(1));
        assert_eq!(ids(&q), vec!["K1ABC", "W1AW", "N0CALL"]);
        assert_eq!(q.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn merge_add_new_entry_ignores_low_position() {
        let mut q = queue_of(&["W1AW", "N0CALL", "EI0IRTS"]);
        merge_add(&mut q, "K1ABC".into(), ts(10), Some(1));
        assert_eq!(ids(&q), vec!["W1AW", "N0CALL", "EI0IRTS", "K1ABC"]);
        assert_eq!(q[3].position, 4);
    }

    #[test]
    fn merge_add_position_past_end_appends() {
        let mut q = queue_of(&["W1AW"]);
        merge_add(&mut q, "K1ABC".into(), ts(1), Some(9));
        assert_eq!(ids(&q), vec!["W1AW", "K1ABC"]);
        assert_eq!(q[1].position, 2);
    }

    #[test]
    fn optimistic_insert_dedups() {
        let mut q = queue_of(&["W1AW"]);
        assert!(insert_optimistic(&mut q, QueueEntry::new("K1ABC".into(), ts(1), 7)));
        assert!(!insert_optimistic(&mut q, QueueEntry::new("k1abc".into(), ts(2), 2)));
        assert_eq!(ids(&q), vec!["W1AW", "K1ABC"]);
        assert_eq!(q[1].position, 2);
    }

    #[test]
    fn remove_renumbers() {
        let mut q = queue_of(&["W1AW", "K1ABC", "N0CALL"]);
        assert!(remove(&mut q, &"W1AW".into()));
        assert!(!remove(&mut q, &"W1AW".into()));
        assert_eq!(q[0].position, 1);
        assert_eq!(q[1].position, 2);
    }

    #[test]
    fn snapshot_drops_duplicates_and_blanks() {
        let mut raw = queue_of(&["W1AW", "K1ABC"]);
        raw.push(QueueEntry::new("w1aw".into(), ts(9), 3));
        raw.push(QueueEntry::new("  ".into(), ts(9), 4));
        let q = normalize_snapshot(raw);
        assert_eq!(ids(&q), vec!["W1AW", "K1ABC"]);
    }
}
