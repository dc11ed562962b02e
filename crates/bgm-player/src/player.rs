//! Player
//!
//! Per-track state machine. The host calls `advance(dt)` once per frame;
//! control calls (`play`, `pause`, `stop`) may come at any time between
//! frames. Loop time and event delivery follow the output device clock, the
//! strength envelope follows host `dt`.

use std::sync::Arc;

use bgm_core::{SequenceKey, Track};
use bgm_event::{EventBus, PlayerEvent, PlayerEventKind, SubscriptionId};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::PlayerConfig;
use crate::output::{AudioOutput, OutputHandle};
use crate::session::{PlaySession, SessionStatus};

/// Player state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    /// No session (initial and terminal)
    #[default]
    Stopped,
    /// Fading in or at full strength
    Playing,
    /// Fading out; session ends when strength reaches 0
    Stopping,
    /// Envelope and volumes frozen, device keeps playing
    Paused,
}

impl PlayState {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            PlayState::Stopped => "Stopped",
            PlayState::Playing => "Playing",
            PlayState::Stopping => "Stopping",
            PlayState::Paused => "Paused",
        }
    }
}

/// What `play()` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// New session created
    Started,
    /// Existing session resumed from Paused or Stopping
    Resumed,
    /// Already playing; nothing changed
    AlreadyPlaying,
}

/// Adaptive music player bound to one output device
pub struct Player<O: AudioOutput> {
    track: Arc<Track>,
    output: O,
    config: PlayerConfig,
    state: PlayState,
    session: Option<PlaySession>,
    events: EventBus,
    rng: Box<dyn RngCore + Send>,
    sessions_started: u64,
}

impl<O: AudioOutput> std::fmt::Debug for Player<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("track", &self.track.name)
            .field("state", &self.state)
            .field("session", &self.session.is_some())
            .field("pending_events", &self.events.pending())
            .finish()
    }
}

impl<O: AudioOutput> Player<O> {
    /// Create a stopped player
    ///
    /// Trigger rolls use `config.seed` when set, OS entropy otherwise.
    pub fn new(track: impl Into<Arc<Track>>, output: O, config: PlayerConfig) -> Self {
        let rng: Box<dyn RngCore + Send> = match config.seed {
            Some(seed) => Box::new(ChaCha8Rng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_os_rng()),
        };

        if let Err(errors) = config.validate() {
            for error in &errors {
                log::warn!("player config: {} (using 0)", error);
            }
        }

        Self {
            track: track.into(),
            output,
            config: config.sanitized(),
            state: PlayState::Stopped,
            session: None,
            events: EventBus::new(),
            rng,
            sessions_started: 0,
        }
    }

    /// Replace the random generator used for trigger rolls
    pub fn with_rng<R: RngCore + Send + 'static>(mut self, rng: R) -> Self {
        self.rng = Box::new(rng);
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CONTROL
    // ═══════════════════════════════════════════════════════════════════════

    /// Start or resume playback
    pub fn play(&mut self) -> PlayOutcome {
        let now = self.output.now();

        let outcome = match self.state {
            PlayState::Playing => {
                log::debug!("play() ignored: '{}' already playing", self.track.name);
                return PlayOutcome::AlreadyPlaying;
            }
            PlayState::Paused | PlayState::Stopping if self.session.is_some() => {
                if let Some(session) = self.session.as_mut() {
                    session.fade_in();
                }
                PlayOutcome::Resumed
            }
            _ => PlayOutcome::Started,
        };

        self.state = PlayState::Playing;
        self.events.schedule(
            now,
            PlayerEvent::player(PlayerEventKind::PlayerPlay, self.track.id, self.loop_index(), now),
        );

        if outcome == PlayOutcome::Started {
            let mut session = PlaySession::open(Arc::clone(&self.track), &self.config);
            session.begin_loop(now, &mut self.output, &mut self.events, &mut *self.rng);
            self.session = Some(session);
            self.sessions_started += 1;
            log::info!("playing '{}' at {:.3}", self.track.name, now);
        }

        self.events.dispatch_due(now);
        outcome
    }

    /// Pause playback. Returns false unless the player was Playing.
    pub fn pause(&mut self) -> bool {
        if self.state != PlayState::Playing {
            return false;
        }

        let now = self.output.now();
        self.state = PlayState::Paused;
        self.events.schedule(
            now,
            PlayerEvent::player(PlayerEventKind::PlayerPause, self.track.id, self.loop_index(), now),
        );
        self.events.dispatch_due(now);
        true
    }

    /// Begin the fade-out. Returns false unless Playing or Paused.
    ///
    /// `PlayerStop` is emitted once the fade completes and the session is
    /// torn down.
    pub fn stop(&mut self) -> bool {
        if !matches!(self.state, PlayState::Playing | PlayState::Paused) {
            return false;
        }

        self.state = PlayState::Stopping;
        if let Some(session) = self.session.as_mut() {
            session.fade_out();
        }
        log::debug!("stopping '{}'", self.track.name);
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TICK
    // ═══════════════════════════════════════════════════════════════════════

    /// Step the player by `dt` seconds of host time
    pub fn advance(&mut self, dt: f64) {
        let now = self.output.now();

        // 1. Envelope, loop rollover and volumes
        if let Some(mut session) = self.session.take() {
            let paused = self.state == PlayState::Paused;
            let status = session.step(
                now,
                dt,
                paused,
                &mut self.output,
                &mut self.events,
                &mut *self.rng,
            );

            match status {
                SessionStatus::Running => self.session = Some(session),
                SessionStatus::Finished => self.teardown(session, now),
            }
        }

        // 2. Deliver everything due on the device clock
        self.events.dispatch_due(now);
    }

    fn teardown(&mut self, mut session: PlaySession, now: f64) {
        // A loop pre-rolled during the look-ahead never starts
        session.abandon_preroll(now, &mut self.events);
        session.close_loop(now, &mut self.events);
        let released = session.release(&mut self.output);

        if self.config.cancel_pending_on_stop {
            let cancelled = self.events.cancel_pending_sequence_events(now);
            log::debug!("cancelled {} pending sequence events", cancelled);
        }

        self.events.schedule(
            now,
            PlayerEvent::player(PlayerEventKind::PlayerStop, self.track.id, session.loop_index(), now),
        );
        self.state = PlayState::Stopped;

        log::info!(
            "stopped '{}' at {:.3} ({} loops, {} handles released)",
            self.track.name,
            now,
            session.loop_index() + 1,
            released
        );
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EVENTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Register an event callback
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&PlayerEvent) + Send + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Remove an event callback
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Events scheduled but not yet delivered
    pub fn pending_events(&self) -> usize {
        self.events.pending()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn state(&self) -> PlayState {
        self.state
    }

    /// Current strength (0 without a session)
    pub fn strength(&self) -> f32 {
        self.session.as_ref().map_or(0.0, |s| s.strength())
    }

    /// Seconds into the loop that is currently sounding
    pub fn current_loop_time(&self) -> f64 {
        let Some(session) = &self.session else {
            return 0.0;
        };
        let t = self.output.now() - session.loop_start();
        if t < 0.0 {
            // next loop already scheduled during the look-ahead
            t + session.track().effective_duration()
        } else {
            t
        }
    }

    /// Index of the current loop (0 without a session)
    pub fn loop_index(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.loop_index())
    }

    #[inline]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Number of sessions created so far
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started
    }

    /// Sequences the device refused to bind in the current session
    pub fn excluded_sequences(&self) -> Vec<SequenceKey> {
        self.session.as_ref().map_or_else(Vec::new, |s| s.excluded())
    }

    /// Device handle bound to `key` in the current session
    pub fn handle_for(&self, key: SequenceKey) -> Option<OutputHandle> {
        self.session.as_ref().and_then(|s| s.handle_for(key))
    }

    /// Track used by the next session
    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    /// Swap the track; a running session keeps its snapshot
    pub fn set_track(&mut self, track: impl Into<Arc<Track>>) {
        self.track = track.into();
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Mutable output access (hosts advance a virtual device clock here)
    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Consume the player and return its output device
    pub fn into_output(self) -> O {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::VirtualOutput;
    use bgm_core::{Channel, ClipRef, Curve, Sequence};
    use parking_lot::Mutex;

    fn simple_track() -> Track {
        Track::new("simple", 4.0).with_loop(true).with_channel(
            Channel::new(ClipRef::new("bed", 4.0)).with_sequence(Sequence::covering(4.0)),
        )
    }

    fn seeded(config: PlayerConfig) -> Player<VirtualOutput> {
        Player::new(simple_track(), VirtualOutput::new(), config.with_seed(1))
    }

    fn tick(player: &mut Player<VirtualOutput>, dt: f64) {
        player.output_mut().advance(dt);
        player.advance(dt);
    }

    #[test]
    fn test_state_transitions() {
        let mut player = seeded(PlayerConfig::default());
        assert_eq!(player.state(), PlayState::Stopped);
        assert!(!player.pause());
        assert!(!player.stop());

        assert_eq!(player.play(), PlayOutcome::Started);
        assert_eq!(player.state(), PlayState::Playing);
        assert!(player.pause());
        assert_eq!(player.state(), PlayState::Paused);
        assert!(!player.pause());

        assert_eq!(player.play(), PlayOutcome::Resumed);
        assert!(player.stop());
        assert_eq!(player.state(), PlayState::Stopping);
        assert!(!player.stop());
        assert_eq!(player.sessions_started(), 1);
    }

    #[test]
    fn test_play_twice_is_noop() {
        let mut player = seeded(PlayerConfig::default());
        assert_eq!(player.play(), PlayOutcome::Started);
        assert_eq!(player.play(), PlayOutcome::AlreadyPlaying);
        assert_eq!(player.sessions_started(), 1);
        assert_eq!(player.output().bind_count(), 1);
    }

    #[test]
    fn test_loop_time_wraps_during_preroll() {
        let config = PlayerConfig::default().with_fade_in(0.0, Curve::constant(1.0));
        let mut player = seeded(config);
        player.play();

        tick(&mut player, 3.95);
        assert_eq!(player.loop_index(), 1);
        assert!((player.current_loop_time() - 3.95).abs() < 1e-9);

        tick(&mut player, 0.1);
        assert!((player.current_loop_time() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_stop_without_fade() {
        let config = PlayerConfig::default()
            .with_fade_in(0.0, Curve::constant(1.0))
            .with_fade_out(0.0, Curve::constant(1.0));
        let mut player = seeded(config);
        let stops = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&stops);
        player.subscribe(move |e| {
            if e.kind == PlayerEventKind::PlayerStop {
                *sink.lock() += 1;
            }
        });

        player.play();
        tick(&mut player, 0.5);
        player.stop();
        tick(&mut player, 0.1);

        assert_eq!(player.state(), PlayState::Stopped);
        assert!(!player.has_session());
        assert_eq!(player.strength(), 0.0);
        assert_eq!(*stops.lock(), 1);
        assert_eq!(player.output().live_handles(), 0);
    }

    #[test]
    fn test_set_track_applies_to_next_session() {
        let config = PlayerConfig::default()
            .with_fade_in(0.0, Curve::constant(1.0))
            .with_fade_out(0.0, Curve::constant(1.0));
        let mut player = seeded(config);
        player.play();

        player.set_track(Track::new("other", 2.0));
        assert_eq!(player.track().name, "other");
        assert!(player.handle_for(SequenceKey::new(0, 0)).is_some());

        player.stop();
        tick(&mut player, 0.1);
        player.play();
        assert!(player.handle_for(SequenceKey::new(0, 0)).is_none());
    }

    #[test]
    fn test_invalid_config_is_sanitized() {
        let config = PlayerConfig {
            fade_in_time: f64::NAN,
            look_ahead: -1.0,
            ..Default::default()
        };
        let player = Player::new(simple_track(), VirtualOutput::new(), config);
        assert_eq!(player.config().fade_in_time, 0.0);
        assert_eq!(player.config().look_ahead, 0.0);
    }

    #[test]
    fn test_debug_output() {
        let player = seeded(PlayerConfig::default());
        let text = format!("{:?}", player);
        assert!(text.contains("simple"));
        assert!(text.contains("Stopped"));
    }
}
