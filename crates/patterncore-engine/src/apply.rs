use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use patterncore_model::{ApplyTiming, Session, LOOP_STEPS};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

/// Grace period after a change is applied during which its id still shows
/// up from [`ApplyScheduler::pending`] (marked applied), so an idempotent
/// client retry can observe completion instead of a 404.
const APPLIED_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum ChangeKind {
    /// Partial merge into `Session::environment`.
    Environment(Value),
    /// Partial merge into named tracks' `params`/`fx`/`track_fx`.
    TrackParams(HashMap<String, Value>),
    /// Full session replacement (a freshly loaded session awaiting its
    /// apply boundary).
    Session(Box<Session>),
    /// Scene activation by name.
    Scene(String),
}

#[derive(Debug, Clone)]
pub struct PendingChange {
    pub id: String,
    pub kind: ChangeKind,
    pub timing: ApplyTiming,
    pub track_ids: Vec<String>,
    pub target_step: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Waiting,
    Applied,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub id: String,
    pub target_step: u16,
    pub status: PendingStatus,
}

/// Holds [`PendingChange`]s awaiting their apply boundary and releases them
/// when the step cursor reaches it.
pub struct ApplyScheduler {
    pending: Mutex<Vec<PendingChange>>,
    applied_recently: Mutex<HashMap<String, Instant>>,
    next_id: AtomicU64,
}

impl Default for ApplyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplyScheduler {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            applied_recently: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Schedules `kind` per `timing`, computed from `from_step` — the step
    /// about to begin (`current_step + 1`), which the caller must NOT wrap
    /// mod 256 before passing in: `Bar`/`Beat`/`Seq` boundaries need to see
    /// the unwrapped value 256 to correctly target step 0 of the next lap.
    pub fn schedule(
        &self,
        kind: ChangeKind,
        timing: ApplyTiming,
        from_step: u16,
        track_ids: Vec<String>,
    ) -> String {
        let id = format!("chg-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let target_step = timing.target_step(from_step) % LOOP_STEPS;
        self.pending.lock().push(PendingChange {
            id: id.clone(),
            kind,
            timing,
            track_ids,
            target_step,
        });
        id
    }

    /// Cancels a not-yet-applied change by id. Returns `true` if it was
    /// found and removed.
    pub fn cancel(&self, id: &str) -> bool {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|c| c.id != id);
        pending.len() != before
    }

    pub fn cancel_all(&self) {
        self.pending.lock().clear();
    }

    /// Removes and returns every change whose `target_step` is `step`,
    /// recording each as recently-applied for the grace window.
    pub fn due(&self, step: u16) -> Vec<PendingChange> {
        let mut pending = self.pending.lock();
        let (due, remaining): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|c| c.target_step == step);
        *pending = remaining;
        drop(pending);

        if !due.is_empty() {
            let mut applied = self.applied_recently.lock();
            let now = Instant::now();
            for change in &due {
                applied.insert(change.id.clone(), now);
            }
        }
        due
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// All not-yet-applied changes, plus any applied within the grace
    /// window (marked `Applied`).
    pub fn pending(&self) -> Vec<PendingSummary> {
        let now = Instant::now();
        let mut out: Vec<PendingSummary> = self
            .pending
            .lock()
            .iter()
            .map(|c| PendingSummary {
                id: c.id.clone(),
                target_step: c.target_step,
                status: PendingStatus::Waiting,
            })
            .collect();

        let mut applied = self.applied_recently.lock();
        applied.retain(|_, at| now.duration_since(*at) < APPLIED_GRACE);
        for (id, _) in applied.iter() {
            out.push(PendingSummary {
                id: id.clone(),
                target_step: 0,
                status: PendingStatus::Applied,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_bar_from_unwrapped_step_targets_next_bar_mod_256() {
        let scheduler = ApplyScheduler::new();
        // current_step = 250, from_step = 251 -> next bar boundary is 256 -> wraps to 0.
        let id = scheduler.schedule(
            ChangeKind::Environment(serde_json::json!({})),
            ApplyTiming::Bar,
            251,
            vec![],
        );
        let due = scheduler.due(0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
    }

    #[test]
    fn cancel_removes_unapplied_change() {
        let scheduler = ApplyScheduler::new();
        let id = scheduler.schedule(
            ChangeKind::Environment(serde_json::json!({})),
            ApplyTiming::Now,
            0,
            vec![],
        );
        assert!(scheduler.cancel(&id));
        assert!(scheduler.due(0).is_empty());
    }

    #[test]
    fn applied_change_appears_in_pending_during_grace_period() {
        let scheduler = ApplyScheduler::new();
        let id = scheduler.schedule(
            ChangeKind::Environment(serde_json::json!({})),
            ApplyTiming::Now,
            5,
            vec![],
        );
        let due = scheduler.due(5);
        assert_eq!(due.len(), 1);
        let summaries = scheduler.pending();
        assert!(summaries
            .iter()
            .any(|s| s.id == id && s.status == PendingStatus::Applied));
    }

    #[test]
    fn cancel_all_empties_queue() {
        let scheduler = ApplyScheduler::new();
        scheduler.schedule(ChangeKind::Environment(serde_json::json!({})), ApplyTiming::Now, 0, vec![]);
        scheduler.schedule(ChangeKind::Environment(serde_json::json!({})), ApplyTiming::Bar, 0, vec![]);
        scheduler.cancel_all();
        assert!(!scheduler.has_pending());
    }
}
