use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::time::Instant;

/// A pending note-off, ordered by `(off_time, seq)` ascending (earliest and
/// earliest-submitted first) even though it sits in a max-heap — see
/// [`Ord`] below, which inverts the comparison.
struct Entry {
    off_time: Instant,
    seq: u64,
    channel: u8,
    note: u8,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.off_time == other.off_time && self.seq == other.seq
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
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest
        // `off_time` first; equal timestamps pop in submission order.
        other
            .off_time
            .cmp(&self.off_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of pending note-offs. Pops may fire up to ~1ms late
/// (the poll granularity the loop engine drives this at) — that tolerance
/// is the system's audible timing floor for note-off.
pub struct NoteOffScheduler {
    heap: Mutex<BinaryHeap<Entry>>,
    next_seq: AtomicU64,
}

impl Default for NoteOffScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteOffScheduler {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn schedule(&self, channel: u8, note: u8, off_time: Instant) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(Entry {
            off_time,
            seq,
            channel,
            note,
        });
    }

    /// Pops and returns every entry due at or before `now`, in
    /// `(off_time, submission order)`.
    pub fn tick(&self, now: Instant) -> Vec<(u8, u8)> {
        let mut due = Vec::new();
        let mut heap = self.heap.lock();
        while matches!(heap.peek(), Some(entry) if entry.off_time <= now) {
            let entry = heap.pop().expect("peek confirmed an entry is present");
            due.push((entry.channel, entry.note));
        }
        due
    }

    /// Empties the queue, returning everything regardless of due time.
    /// Used by `panic()` and `stop`.
    pub fn flush_all(&self) -> Vec<(u8, u8)> {
        let mut heap = self.heap.lock();
        let mut all = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            all.push((entry.channel, entry.note));
        }
        all
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tick_pops_only_due_entries_in_time_order() {
        let scheduler = NoteOffScheduler::new();
        let base = Instant::now();
        scheduler.schedule(0, 60, base + Duration::from_millis(10));
        scheduler.schedule(0, 61, base + Duration::from_millis(5));
        scheduler.schedule(0, 62, base + Duration::from_millis(20));

        let due = scheduler.tick(base + Duration::from_millis(12));
        assert_eq!(due, vec![(0, 61), (0, 60)]);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn equal_timestamps_pop_in_submission_order() {
        let scheduler = NoteOffScheduler::new();
        let t = Instant::now();
        scheduler.schedule(0, 1, t);
        scheduler.schedule(0, 2, t);
        scheduler.schedule(0, 3, t);
        assert_eq!(scheduler.tick(t), vec![(0, 1), (0, 2), (0, 3)]);
    }

    #[test]
    fn flush_all_empties_queue_regardless_of_due_time() {
        let scheduler = NoteOffScheduler::new();
        let far = Instant::now() + Duration::from_secs(60);
        scheduler.schedule(0, 60, far);
        let flushed = scheduler.flush_all();
        assert_eq!(flushed, vec![(0, 60)]);
        assert!(scheduler.is_empty());
    }
}
