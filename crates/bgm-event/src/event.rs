//! Player Event Definition

use bgm_core::{SequenceKey, TrackId};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT KIND
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlayerEventKind {
    /// Player entered Playing (new session or resume)
    PlayerPlay = 0,
    /// Player entered Paused
    PlayerPause = 1,
    /// Session torn down, all handles released
    PlayerStop = 2,
    /// A loop iteration began
    TrackLoopStarted = 3,
    /// A loop iteration finished
    TrackLoopEnded = 4,
    /// An armed sequence reached its start time
    SequenceStarted = 5,
    /// A sequence lost its probability roll (delivered at its nominal start)
    SequenceSkipped = 6,
    /// An armed sequence reached its end time
    SequenceEnded = 7,
}

impl PlayerEventKind {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEventKind::PlayerPlay => "PlayerPlay",
            PlayerEventKind::PlayerPause => "PlayerPause",
            PlayerEventKind::PlayerStop => "PlayerStop",
            PlayerEventKind::TrackLoopStarted => "TrackLoopStarted",
            PlayerEventKind::TrackLoopEnded => "TrackLoopEnded",
            PlayerEventKind::SequenceStarted => "SequenceStarted",
            PlayerEventKind::SequenceSkipped => "SequenceSkipped",
            PlayerEventKind::SequenceEnded => "SequenceEnded",
        }
    }

    /// True for events tied to one sequence occurrence
    #[inline]
    pub fn is_sequence_level(&self) -> bool {
        matches!(
            self,
            PlayerEventKind::SequenceStarted
                | PlayerEventKind::SequenceSkipped
                | PlayerEventKind::SequenceEnded
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYER EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEvent {
    /// Event type
    pub kind: PlayerEventKind,
    /// Originating track
    pub track: TrackId,
    /// Channel index (None for track/player events)
    pub channel: Option<usize>,
    /// Sequence index within the channel (None for track/player events)
    pub sequence: Option<usize>,
    /// Loop iteration the event belongs to
    pub loop_index: u64,
    /// Device time the event is scheduled for (seconds)
    pub time: f64,
}

impl PlayerEvent {
    /// Player-level event (play / pause / stop)
    pub fn player(kind: PlayerEventKind, track: TrackId, loop_index: u64, time: f64) -> Self {
        Self {
            kind,
            track,
            channel: None,
            sequence: None,
            loop_index,
            time,
        }
    }

    /// Sequence-level event
    pub fn sequence(
        kind: PlayerEventKind,
        track: TrackId,
        key: SequenceKey,
        loop_index: u64,
        time: f64,
    ) -> Self {
        Self {
            kind,
            track,
            channel: Some(key.channel),
            sequence: Some(key.sequence),
            loop_index,
            time,
        }
    }

    /// Sequence this event refers to, if any
    pub fn key(&self) -> Option<SequenceKey> {
        match (self.channel, self.sequence) {
            (Some(channel), Some(sequence)) => Some(SequenceKey::new(channel, sequence)),
            _ => None,
        }
    }

    /// Channel index, -1 for track/player events
    #[inline]
    pub fn channel_index(&self) -> i64 {
        self.channel.map_or(-1, |c| c as i64)
    }

    /// Sequence index, -1 for track/player events
    #[inline]
    pub fn sequence_index(&self) -> i64 {
        self.sequence.map_or(-1, |s| s as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_event_indices() {
        let ev = PlayerEvent::player(PlayerEventKind::PlayerPlay, TrackId(3), 0, 1.5);
        assert_eq!(ev.channel_index(), -1);
        assert_eq!(ev.sequence_index(), -1);
        assert!(ev.key().is_none());
    }

    #[test]
    fn test_sequence_event_indices() {
        let ev = PlayerEvent::sequence(
            PlayerEventKind::SequenceStarted,
            TrackId(3),
            SequenceKey::new(2, 5),
            1,
            4.0,
        );
        assert_eq!(ev.channel_index(), 2);
        assert_eq!(ev.sequence_index(), 5);
        assert_eq!(ev.key(), Some(SequenceKey::new(2, 5)));
        assert!(ev.kind.is_sequence_level());
        assert!(!PlayerEventKind::TrackLoopEnded.is_sequence_level());
    }
}
