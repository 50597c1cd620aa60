use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use parking_lot::Mutex;
use patterncore_model::ScheduledMessage;
use tokio::time::Instant;

/// A dispatch deferred past the step it was computed on, by swing or a
/// positive `offset_ms` micro-timing shift.
pub enum DeferredAction {
    Osc(ScheduledMessage),
    MidiNoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
        off_delay: Duration,
    },
}

struct Entry {
    target: Instant,
    seq: u64,
    action: DeferredAction,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.target.cmp(&self.target).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of sub-step dispatches, polled by the same task that
/// drives [`crate::noteoff::NoteOffScheduler`] rather than firing each one
/// off a detached `tokio::spawn`. Two events submitted for the same step
/// keep the submission-order tie-break the concurrency model requires —
/// a per-event spawn gives the scheduler no such guarantee, since spawned
/// tasks race each other to completion.
pub struct DispatchScheduler {
    heap: Mutex<BinaryHeap<Entry>>,
    next_seq: AtomicU64,
}

impl Default for DispatchScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchScheduler {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn schedule(&self, target: Instant, action: DeferredAction) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(Entry { target, seq, action });
    }

    /// Pops and returns every action due at or before `now`, in
    /// `(target, submission order)`.
    pub fn tick(&self, now: Instant) -> Vec<DeferredAction> {
        let mut due = Vec::new();
        let mut heap = self.heap.lock();
        while matches!(heap.peek(), Some(entry) if entry.target <= now) {
            let entry = heap.pop().expect("peek confirmed an entry is present");
            due.push(entry.action);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patterncore_model::ScheduledMessage;

    fn msg(destination_id: &str) -> ScheduledMessage {
        ScheduledMessage {
            destination_id: destination_id.to_string(),
            cycle: 0.0,
            step: 0,
            params: Default::default(),
        }
    }

    #[test]
    fn tick_pops_only_due_entries_earliest_first() {
        let scheduler = DispatchScheduler::new();
        let base = Instant::now();
        scheduler.schedule(base + Duration::from_millis(10), DeferredAction::Osc(msg("late")));
        scheduler.schedule(base + Duration::from_millis(5), DeferredAction::Osc(msg("early")));

        let due = scheduler.tick(base + Duration::from_millis(7));
        assert_eq!(due.len(), 1);
        assert!(matches!(&due[0], DeferredAction::Osc(m) if m.destination_id == "early"));
    }

    #[test]
    fn equal_targets_pop_in_submission_order() {
        let scheduler = DispatchScheduler::new();
        let t = Instant::now();
        scheduler.schedule(t, DeferredAction::Osc(msg("first")));
        scheduler.schedule(t, DeferredAction::Osc(msg("second")));

        let due = scheduler.tick(t);
        let ids: Vec<_> = due
            .iter()
            .map(|a| match a {
                DeferredAction::Osc(m) => m.destination_id.clone(),
                DeferredAction::MidiNoteOn { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
