use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// A single scheduled hit within an [`EventSequence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub step: u16,
    pub velocity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<u8>,
    pub gate: f64,
    #[serde(default)]
    pub offset_ms: f64,
}

impl Event {
    pub fn validate(&self) -> Result<()> {
        if self.step > 255 {
            return Err(ModelError::OutOfRange {
                field: "event.step".into(),
                detail: format!("must be within 0..=255, got {}", self.step),
            });
        }
        if !(0.0..=1.0).contains(&self.velocity) {
            return Err(ModelError::OutOfRange {
                field: "event.velocity".into(),
                detail: format!("must be within 0.0..=1.0, got {}", self.velocity),
            });
        }
        if let Some(note) = self.note {
            if note > 127 {
                return Err(ModelError::OutOfRange {
                    field: "event.note".into(),
                    detail: format!("must be within 0..=127, got {note}"),
                });
            }
        }
        if !(self.gate > 0.0) {
            return Err(ModelError::OutOfRange {
                field: "event.gate".into(),
                detail: format!("must be > 0, got {}", self.gate),
            });
        }
        Ok(())
    }
}

/// An immutable ordered tuple of [`Event`]s for one track, plus the step
/// index consulted on every tick.
///
/// The index is the truth: `events_at` never rescans `events`. It is built
/// once, at construction, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSequence {
    pub track_id: String,
    pub events: Vec<Event>,
    #[serde(skip)]
    step_index: HashMap<u16, Vec<usize>>,
}

impl EventSequence {
    pub fn new(track_id: impl Into<String>, events: Vec<Event>) -> Self {
        let step_index = build_step_index(&events);
        Self {
            track_id: track_id.into(),
            events,
            step_index,
        }
    }

    /// Rebuilds the step index. Called after deserialization, since `serde`
    /// never reconstructs the skipped `step_index` field on its own — the
    /// wire form never carries the index; it is rebuilt on load.
    pub fn rebuild_index(&mut self) {
        self.step_index = build_step_index(&self.events);
    }

    pub fn validate(&self) -> Result<()> {
        for event in &self.events {
            event.validate()?;
        }
        Ok(())
    }

    /// O(1) expected lookup; empty slice if no events reference this step.
    pub fn events_at(&self, step: u16) -> impl Iterator<Item = &Event> {
        self.step_index
            .get(&step)
            .into_iter()
            .flat_map(|positions| positions.iter().map(move |&i| &self.events[i]))
    }
}

fn build_step_index(events: &[Event]) -> HashMap<u16, Vec<usize>> {
    let mut index: HashMap<u16, Vec<usize>> = HashMap::new();
    for (i, event) in events.iter().enumerate() {
        index.entry(event.step).or_default().push(i);
    }
    index
}
