//! Sequence Trigger Resolver
//!
//! Decides, once per loop, which sequences play. Every playable sequence gets
//! exactly one uniform draw in [0, 1) per loop, in channel-major order, so a
//! seeded generator reproduces the same arm/skip pattern.

use bgm_core::{SequenceKey, Track};
use rand::Rng;

/// Result of a sequence's roll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Will be scheduled on the output device
    Armed,
    /// Lost the roll; only a skip event is scheduled
    Skipped,
}

/// Per-loop decision for one sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerDecision {
    pub key: SequenceKey,
    pub outcome: TriggerOutcome,
    /// The uniform draw that decided the outcome
    pub roll: f32,
    /// Start relative to loop start (seconds)
    pub start: f64,
    /// End relative to loop start (seconds)
    pub end: f64,
}

impl TriggerDecision {
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.outcome == TriggerOutcome::Armed
    }
}

/// True if `roll` arms a sequence with `probability`
///
/// Probability 1 always arms and probability 0 always skips, because draws
/// lie in [0, 1).
#[inline]
pub fn roll_passes(roll: f32, probability: f32) -> bool {
    roll < probability.clamp(0.0, 1.0)
}

/// Roll every playable sequence for one loop
///
/// Keys that no longer resolve against `track` are ignored.
pub fn resolve_loop<R: Rng + ?Sized>(
    track: &Track,
    playable: &[SequenceKey],
    rng: &mut R,
) -> Vec<TriggerDecision> {
    playable
        .iter()
        .filter_map(|&key| {
            let (_, sequence) = track.sequence(key)?;
            let roll: f32 = rng.random();
            let outcome = if roll_passes(roll, sequence.probability) {
                TriggerOutcome::Armed
            } else {
                TriggerOutcome::Skipped
            };
            Some(TriggerDecision {
                key,
                outcome,
                roll,
                start: sequence.start_time,
                end: sequence.end_time(),
            })
        })
        .collect()
}
