use serde::{Deserialize, Serialize};

/// Boundary at which a deferred change takes effect.
///
/// `beat` = next step where `step mod 4 == 0`; `bar` = next step where
/// `step mod 16 == 0`; `seq` = next step 0; `now` = next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplyTiming {
    Now,
    #[default]
    Beat,
    Bar,
    Seq,
}

impl ApplyTiming {
    /// Smallest step >= `from` satisfying this boundary's modulus. `now`
    /// resolves to `from` itself.
    ///
    /// Callers pass `current_step + 1` (the step about to begin), not the
    /// step that just fired — a change submitted while step s is in flight
    /// can only possibly land at s+1 or later.
    pub fn target_step(self, from: u16) -> u16 {
        match self {
            ApplyTiming::Now => from,
            ApplyTiming::Beat => next_multiple(from, 4),
            ApplyTiming::Bar => next_multiple(from, 16),
            ApplyTiming::Seq => {
                if from == 0 {
                    0
                } else {
                    256
                }
            }
        }
    }
}

fn next_multiple(from: u16, modulus: u16) -> u16 {
    let rem = from % modulus;
    if rem == 0 {
        from
    } else {
        from + (modulus - rem)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ApplyCommand {
    #[serde(default)]
    pub timing: ApplyTiming,
    /// Empty means "all tracks".
    #[serde(default)]
    pub track_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_boundary_rounds_up_to_next_multiple_of_four() {
        assert_eq!(ApplyTiming::Beat.target_step(7), 8);
        assert_eq!(ApplyTiming::Beat.target_step(8), 8);
    }

    /// A `bar` change submitted at step s takes effect at step
    /// 16*ceil((s+1)/16) — the next bar boundary strictly after s.
    #[test]
    fn bar_boundary_lands_on_next_bar_after_submission() {
        for s in 0u16..255 {
            let target = ApplyTiming::Bar.target_step(s + 1) as u32;
            let expected = 16 * ((s as u32 + 1).div_ceil(16));
            assert_eq!(target, expected, "step {s} -> target {target}, expected {expected}");
        }
    }

    #[test]
    fn seq_boundary_wraps_to_zero() {
        assert_eq!(ApplyTiming::Seq.target_step(37), 256);
        assert_eq!(ApplyTiming::Seq.target_step(0), 0);
    }
}
