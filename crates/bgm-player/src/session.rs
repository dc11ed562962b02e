//! Play Session
//!
//! Working state of one play-through: the track snapshot, the sequences that
//! survived inspection, the handle pool, the strength envelope and the loop
//! clock. Created on `play()` from Stopped, dropped at teardown.
//!
//! All times here are device times (`AudioOutput::now`). A loop that starts
//! at `loop_start` ends at `loop_start + duration`; the next loop is
//! scheduled slightly earlier than that (the look-ahead) but starts exactly
//! at the boundary.

use std::sync::Arc;

use bgm_core::{Channel, Sequence, SequenceKey, Track};
use bgm_event::{EventBus, PlayerEvent, PlayerEventKind};
use rand::Rng;

use crate::config::PlayerConfig;
use crate::output::{AudioOutput, OutputHandle};
use crate::pool::{Occurrence, OutputPool};
use crate::resolver::resolve_loop;
use crate::strength::{FadeDirection, StrengthEnvelope};

/// Result of stepping a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    /// Fade-out finished or a non-looping track ran out
    Finished,
}

/// Volume of one sequence at loop time `loop_t`
///
/// Exactly 0 outside `[start, start + duration]`.
pub fn sequence_volume(channel: &Channel, sequence: &Sequence, strength: f32, loop_t: f64) -> f32 {
    if !sequence.contains(loop_t) {
        return 0.0;
    }
    channel.effective_volume()
        * sequence.strength_curve.evaluate(strength)
        * sequence.volume_curve.evaluate(sequence.progress(loop_t))
}

/// Scheduler working state for one play-through
#[derive(Debug)]
pub struct PlaySession {
    track: Arc<Track>,
    playable: Vec<SequenceKey>,
    pool: OutputPool,
    envelope: StrengthEnvelope,
    look_ahead: f64,
    loop_index: u64,
    loop_start: f64,
    prev_loop_start: f64,
    loop_closed: bool,
}

impl PlaySession {
    /// Inspect `track` and prepare a session; nothing is scheduled yet
    pub fn open(track: Arc<Track>, config: &PlayerConfig) -> Self {
        let report = track.inspect();
        for issue in &report.issues {
            log::warn!("track '{}': {}", track.name, issue);
        }

        let duration = track.effective_duration();
        let look_ahead = config.sanitized().look_ahead.min(duration / 2.0);

        log::debug!(
            "session opened for '{}' ({} playable sequences, look-ahead {:.3}s)",
            track.name,
            report.playable.len(),
            look_ahead
        );

        Self {
            playable: report.playable,
            pool: OutputPool::new(),
            envelope: StrengthEnvelope::from_config(config),
            look_ahead,
            loop_index: 0,
            loop_start: 0.0,
            prev_loop_start: 0.0,
            loop_closed: false,
            track,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loop lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a loop at device time `start`: roll every playable sequence and
    /// schedule the armed ones on the device
    pub fn begin_loop<O, R>(&mut self, start: f64, output: &mut O, events: &mut EventBus, rng: &mut R)
    where
        O: AudioOutput + ?Sized,
        R: Rng + ?Sized,
    {
        let track = Arc::clone(&self.track);
        self.prev_loop_start = self.loop_start;
        self.loop_start = start;
        self.loop_closed = false;

        events.schedule(
            start,
            PlayerEvent::player(PlayerEventKind::TrackLoopStarted, track.id, self.loop_index, start),
        );

        for decision in resolve_loop(&track, &self.playable, rng) {
            let key = decision.key;
            let at = start + decision.start;
            let end = start + decision.end;

            if !decision.is_armed() {
                self.schedule_sequence_event(events, PlayerEventKind::SequenceSkipped, key, at);
                continue;
            }

            let Some((channel, sequence)) = track.sequence(key) else {
                continue;
            };
            let Some(clip) = &channel.clip else {
                continue;
            };

            let handle = match self.pool.acquire(key, clip, track.output_bus.as_deref(), output) {
                Ok(handle) => handle,
                Err(err) => {
                    log::warn!("excluding {:?} for this session: {}", key, err);
                    self.pool.exclude(key);
                    continue;
                }
            };

            if let Err(err) = output.schedule_start(handle, at, sequence.offset) {
                log::warn!("failed to schedule start of {:?} at {:.3}: {}", key, at, err);
                self.schedule_sequence_event(events, PlayerEventKind::SequenceSkipped, key, at);
                continue;
            }

            // A started voice without a stop would sound unbounded
            if let Err(err) = output.schedule_stop(handle, end) {
                log::warn!(
                    "failed to schedule stop of {:?} at {:.3}: {}; releasing {:?}",
                    key,
                    end,
                    err,
                    handle
                );
                self.pool.discard(key, output);
                self.schedule_sequence_event(events, PlayerEventKind::SequenceSkipped, key, at);
                continue;
            }

            self.pool.record(
                key,
                Occurrence {
                    loop_start: start,
                    start: at,
                    end,
                },
            );
            self.schedule_sequence_event(events, PlayerEventKind::SequenceStarted, key, at);
            self.schedule_sequence_event(events, PlayerEventKind::SequenceEnded, key, end);
        }

        let pool = &self.pool;
        self.playable.retain(|&key| !pool.is_excluded(key));

        log::trace!("loop {} begins at {:.3}", self.loop_index, start);
    }

    /// Schedule `TrackLoopEnded` for the current loop at `at`, once
    pub fn close_loop(&mut self, at: f64, events: &mut EventBus) {
        if self.loop_closed {
            return;
        }
        self.loop_closed = true;
        events.schedule(
            at,
            PlayerEvent::player(PlayerEventKind::TrackLoopEnded, self.track.id, self.loop_index, at),
        );
    }

    /// Drop a loop that was pre-rolled but has not started by `now`
    ///
    /// Its pending events are cancelled along with the `TrackLoopEnded` of
    /// the loop still sounding, which becomes current again (and open).
    /// Returns false if no loop is pending.
    pub fn abandon_preroll(&mut self, now: f64, events: &mut EventBus) -> bool {
        if now >= self.loop_start || self.loop_index == 0 {
            return false;
        }

        let pending = self.loop_index;
        let cancelled = events.cancel_pending_where(now, |e| {
            e.loop_index == pending
                || (e.loop_index + 1 == pending && e.kind == PlayerEventKind::TrackLoopEnded)
        });

        self.loop_index -= 1;
        self.loop_start = self.prev_loop_start;
        self.loop_closed = false;

        log::debug!(
            "abandoned pre-rolled loop {} ({} pending events dropped)",
            pending,
            cancelled
        );
        true
    }

    /// Step the session to device time `now`
    ///
    /// The envelope moves by `dt` unless `paused`; loop rollover follows the
    /// device clock regardless. At most one loop is begun per step: when the
    /// clock has jumped past whole loops, they are skipped and the next loop
    /// is re-anchored one look-ahead after `now`.
    pub fn step<O, R>(
        &mut self,
        now: f64,
        dt: f64,
        paused: bool,
        output: &mut O,
        events: &mut EventBus,
        rng: &mut R,
    ) -> SessionStatus
    where
        O: AudioOutput + ?Sized,
        R: Rng + ?Sized,
    {
        if !paused {
            self.envelope.advance(dt);
        }
        if self.envelope.is_silent() {
            return SessionStatus::Finished;
        }

        let duration = self.track.effective_duration();
        if self.can_loop() {
            let rollover = duration - self.look_ahead;
            if now - self.loop_start >= rollover {
                let mut next = self.loop_end();
                self.close_loop(next, events);

                if now - next >= rollover {
                    log::warn!(
                        "device clock is {:.3}s past the end of loop {}; skipping ahead",
                        now - next,
                        self.loop_index
                    );
                    next = now + self.look_ahead;
                }

                self.loop_index += 1;
                self.begin_loop(next, output, events, rng);
            }
        } else if now - self.loop_start >= duration {
            let end = self.loop_end();
            self.close_loop(end, events);
            return SessionStatus::Finished;
        }

        if !paused {
            self.update_volumes(now, output);
        }
        SessionStatus::Running
    }

    /// Push the current volume of every bound sequence to the device
    pub fn update_volumes<O: AudioOutput + ?Sized>(&mut self, now: f64, output: &mut O) {
        let track = Arc::clone(&self.track);
        let strength = self.envelope.strength();

        for (key, binding) in self.pool.bindings_mut() {
            binding.prune(now);
            let volume = match (binding.active(now), track.sequence(*key)) {
                (Some(occurrence), Some((channel, sequence))) => {
                    sequence_volume(channel, sequence, strength, now - occurrence.loop_start)
                }
                _ => 0.0,
            };
            output.set_volume(binding.handle, volume);
        }
    }

    /// Release every bound handle. Returns how many were released.
    pub fn release<O: AudioOutput + ?Sized>(&mut self, output: &mut O) -> usize {
        self.pool.release_all(output)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fades
    // ─────────────────────────────────────────────────────────────────────────

    pub fn fade_in(&mut self) {
        self.envelope.set_direction(FadeDirection::In);
    }

    pub fn fade_out(&mut self) {
        self.envelope.set_direction(FadeDirection::Out);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// True if loops repeat (a zero-length track never does)
    #[inline]
    pub fn can_loop(&self) -> bool {
        self.track.looping && self.track.effective_duration() > 0.0
    }

    /// Nominal end of the current loop (device time)
    #[inline]
    pub fn loop_end(&self) -> f64 {
        self.loop_start + self.track.effective_duration()
    }

    #[inline]
    pub fn loop_start(&self) -> f64 {
        self.loop_start
    }

    #[inline]
    pub fn loop_index(&self) -> u64 {
        self.loop_index
    }

    #[inline]
    pub fn strength(&self) -> f32 {
        self.envelope.strength()
    }

    #[inline]
    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    /// Sequences still eligible for scheduling
    pub fn playable(&self) -> &[SequenceKey] {
        &self.playable
    }

    /// Handle bound to `key`, if any
    pub fn handle_for(&self, key: SequenceKey) -> Option<OutputHandle> {
        self.pool.handle(key)
    }

    /// Sequences excluded after a device bind failure
    pub fn excluded(&self) -> Vec<SequenceKey> {
        self.pool.excluded().collect()
    }

    /// Number of handles bound in this session
    pub fn bound_count(&self) -> usize {
        self.pool.len()
    }

    fn schedule_sequence_event(&self, events: &mut EventBus, kind: PlayerEventKind, key: SequenceKey, at: f64) {
        events.schedule(
            at,
            PlayerEvent::sequence(kind, self.track.id, key, self.loop_index, at),
        );
    }
}
