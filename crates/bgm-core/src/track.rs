//! Track / Channel / Sequence Model
//!
//! The authored description of a piece of adaptive background music:
//!
//! ```text
//! Track (duration, loop, bpm, output bus)
//!  ├── Channel 0 (clip, base volume)
//!  │    ├── Sequence 0  [start, start+duration)  offset into clip, probability, curves
//!  │    └── Sequence 1  (may overlap sequence 0)
//!  └── Channel 1 ...
//! ```
//!
//! Sequences inside a channel are neither required to be time-ordered nor
//! non-overlapping. Everything here is plain data; the player treats a track
//! as read-only for the whole play session.

use serde::{Deserialize, Serialize};

use crate::{BOUNDS_EPSILON, Curve, MAX_CHANNEL_VOLUME, TrackError, TrackResult};

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique track identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl TrackId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get as u64
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Stable identity of a sequence within a track: channel index + sequence index
///
/// Used as the key for per-session resources. Ordering is channel-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    pub channel: usize,
    pub sequence: usize,
}

impl SequenceKey {
    pub fn new(channel: usize, sequence: usize) -> Self {
        Self { channel, sequence }
    }
}

/// Reference to an audio asset owned by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRef {
    /// Asset identifier understood by the audio output
    pub id: String,
    /// Asset length in seconds
    pub length: f64,
}

impl ClipRef {
    pub fn new(id: impl Into<String>, length: f64) -> Self {
        Self {
            id: id.into(),
            length,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SEQUENCE
// ═══════════════════════════════════════════════════════════════════════════════

/// One scheduled playback window of a channel's clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Start time relative to loop start (seconds)
    #[serde(default)]
    pub start_time: f64,
    /// Playback length (seconds)
    pub duration: f64,
    /// Seek position into the clip (seconds)
    #[serde(default)]
    pub offset: f64,
    /// Chance of playing on each loop (0.0-1.0)
    #[serde(default = "default_probability")]
    pub probability: f32,
    /// Volume over elapsed fraction of the sequence
    #[serde(default)]
    pub volume_curve: Curve,
    /// Volume over global strength
    #[serde(default = "default_strength_curve")]
    pub strength_curve: Curve,
}

fn default_probability() -> f32 {
    1.0
}

fn default_strength_curve() -> Curve {
    Curve::linear(0.0, 0.0, 1.0, 1.0)
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            duration: 1.0,
            offset: 0.0,
            probability: 1.0,
            volume_curve: Curve::constant(1.0),
            strength_curve: default_strength_curve(),
        }
    }
}

impl Sequence {
    /// Create a sequence at `start_time` lasting `duration` seconds
    pub fn new(start_time: f64, duration: f64) -> Self {
        Self {
            start_time,
            duration,
            ..Default::default()
        }
    }

    /// Sequence spanning a whole clip of `clip_length` seconds
    pub fn covering(clip_length: f64) -> Self {
        Self::new(0.0, clip_length)
    }

    /// Builder: seek offset into the clip
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Builder: trigger probability
    pub fn with_probability(mut self, probability: f32) -> Self {
        self.probability = probability;
        self
    }

    /// Builder: volume-over-time curve
    pub fn with_volume_curve(mut self, curve: Curve) -> Self {
        self.volume_curve = curve;
        self
    }

    /// Builder: volume-over-strength curve
    pub fn with_strength_curve(mut self, curve: Curve) -> Self {
        self.strength_curve = curve;
        self
    }

    /// End time relative to loop start
    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// True if loop time `t` lies inside `[start, start + duration]`
    #[inline]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_time && t <= self.end_time()
    }

    /// Elapsed fraction of the sequence at loop time `t`, clamped to [0, 1]
    #[inline]
    pub fn progress(&self, t: f64) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (((t - self.start_time) / self.duration) as f32).clamp(0.0, 1.0)
    }

    /// Copy of this sequence placed right after it
    pub fn duplicate_after(&self) -> Self {
        Self {
            start_time: self.end_time(),
            ..self.clone()
        }
    }

    /// Shorten the duration so the window fits inside a clip of `clip_length`
    pub fn clamp_to_clip(&mut self, clip_length: f64) {
        let available = (clip_length - self.offset).max(0.0);
        if self.duration > available {
            log::debug!("sequence shortened from {:.3}s to {:.3}s to fit clip", self.duration, available);
            self.duration = available;
        }
    }

    /// Check timing and clip bounds
    pub fn check_bounds(&self, clip_length: f64) -> bool {
        self.start_time.is_finite()
            && self.start_time >= 0.0
            && self.duration.is_finite()
            && self.duration > 0.0
            && self.offset.is_finite()
            && self.offset >= 0.0
            && self.offset + self.duration <= clip_length + BOUNDS_EPSILON
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL
// ═══════════════════════════════════════════════════════════════════════════════

/// One clip's worth of scheduled material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Bound clip (None = channel is skipped on playback)
    #[serde(default)]
    pub clip: Option<ClipRef>,
    /// Base volume multiplier (0.0-2.0)
    #[serde(default = "default_channel_volume")]
    pub volume: f32,
    /// Scheduled sequences (any order, may overlap)
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

fn default_channel_volume() -> f32 {
    1.0
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            clip: None,
            volume: 1.0,
            sequences: Vec::new(),
        }
    }
}

impl Channel {
    /// Create a channel for `clip` with no sequences
    pub fn new(clip: ClipRef) -> Self {
        Self {
            clip: Some(clip),
            ..Default::default()
        }
    }

    /// Builder: base volume
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Builder: append a sequence
    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Base volume clamped to the supported range
    #[inline]
    pub fn effective_volume(&self) -> f32 {
        if self.volume.is_nan() {
            return 0.0;
        }
        self.volume.clamp(0.0, MAX_CHANNEL_VOLUME)
    }

    /// Assign a clip
    ///
    /// A channel that had neither a clip nor sequences gets one sequence
    /// covering the whole new clip.
    pub fn set_clip(&mut self, clip: ClipRef) {
        if self.clip.is_none() && self.sequences.is_empty() {
            self.sequences.push(Sequence::covering(clip.length));
        }
        self.clip = Some(clip);
    }

    /// Deep copy of this channel
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Sequence sounding at loop time `t`
    ///
    /// When several windows contain `t`, the one that started last wins.
    pub fn sequence_at(&self, t: f64) -> Option<(usize, &Sequence)> {
        self.sequences
            .iter()
            .enumerate()
            .filter(|(_, s)| s.contains(t))
            .max_by(|(_, a), (_, b)| a.start_time.total_cmp(&b.start_time))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRACK
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level playable music definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: TrackId,
    #[serde(default)]
    pub name: String,
    /// Loop length (seconds)
    pub duration: f64,
    /// Repeat after reaching `duration`
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Tempo hint for authoring grids; never read by the player
    #[serde(default = "default_bpm")]
    pub bpm: u32,
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Output bus the audio device should route this track to
    #[serde(default)]
    pub output_bus: Option<String>,
}

fn default_bpm() -> u32 {
    90
}

impl Default for Track {
    fn default() -> Self {
        Self {
            id: TrackId::default(),
            name: String::new(),
            duration: 0.0,
            looping: false,
            bpm: default_bpm(),
            channels: Vec::new(),
            output_bus: None,
        }
    }
}

/// Result of checking a track before playback
#[derive(Debug, Default)]
pub struct TrackReport {
    /// Sequences that can be scheduled, in channel-major order
    pub playable: Vec<SequenceKey>,
    /// Problems found; each one excludes a channel or a sequence
    pub issues: Vec<TrackError>,
}

impl TrackReport {
    /// True if nothing had to be excluded
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Track {
    /// Create an empty track
    pub fn new(name: impl Into<String>, duration: f64) -> Self {
        Self {
            name: name.into(),
            duration,
            ..Default::default()
        }
    }

    /// Builder: identifier
    pub fn with_id(mut self, id: TrackId) -> Self {
        self.id = id;
        self
    }

    /// Builder: loop flag
    pub fn with_loop(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Builder: append a channel
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Builder: output bus
    pub fn with_output_bus(mut self, bus: impl Into<String>) -> Self {
        self.output_bus = Some(bus.into());
        self
    }

    /// Look up a sequence by key
    pub fn sequence(&self, key: SequenceKey) -> Option<(&Channel, &Sequence)> {
        let channel = self.channels.get(key.channel)?;
        let sequence = channel.sequences.get(key.sequence)?;
        Some((channel, sequence))
    }

    /// Seconds per beat, if a tempo is set
    pub fn beat_duration(&self) -> Option<f64> {
        if self.bpm == 0 {
            None
        } else {
            Some(60.0 / self.bpm as f64)
        }
    }

    /// Duration usable for scheduling (invalid values read as 0)
    #[inline]
    pub fn effective_duration(&self) -> f64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            self.duration
        } else {
            0.0
        }
    }

    /// Snap a proposed duration to a nearby sequence boundary
    ///
    /// Returns the first sequence start or end within `threshold` seconds of
    /// `candidate`, or `candidate` unchanged.
    pub fn snap_duration(&self, candidate: f64, threshold: f64) -> f64 {
        for sequence in self.channels.iter().flat_map(|c| c.sequences.iter()) {
            if (sequence.start_time - candidate).abs() < threshold {
                return sequence.start_time;
            }
            if (sequence.end_time() - candidate).abs() < threshold {
                return sequence.end_time();
            }
        }
        candidate
    }

    /// Check every channel and sequence
    ///
    /// Channels without a clip and sequences outside their clip are listed as
    /// issues and left out of `playable`.
    pub fn inspect(&self) -> TrackReport {
        let mut report = TrackReport::default();

        if !self.duration.is_finite() || self.duration < 0.0 {
            report.issues.push(TrackError::InvalidDuration(self.duration));
        }

        for (ci, channel) in self.channels.iter().enumerate() {
            let Some(clip) = &channel.clip else {
                report.issues.push(TrackError::MissingAsset { channel: ci });
                continue;
            };

            for (si, sequence) in channel.sequences.iter().enumerate() {
                if sequence.check_bounds(clip.length) {
                    report.playable.push(SequenceKey::new(ci, si));
                } else {
                    report.issues.push(TrackError::InvalidSequenceBounds {
                        channel: ci,
                        sequence: si,
                        start_time: sequence.start_time,
                        offset: sequence.offset,
                        duration: sequence.duration,
                        clip_length: clip.length,
                    });
                }
            }
        }

        report
    }

    /// Load track from JSON string
    pub fn from_json(json: &str) -> TrackResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save track to JSON string
    pub fn to_json(&self) -> TrackResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save track to compact JSON
    pub fn to_json_compact(&self) -> TrackResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_track() -> Track {
        Track::new("test", 10.0)
            .with_loop(true)
            .with_channel(
                Channel::new(ClipRef::new("pads", 12.0))
                    .with_sequence(Sequence::new(0.0, 4.0))
                    .with_sequence(Sequence::new(4.0, 6.0).with_offset(4.0)),
            )
            .with_channel(Channel::new(ClipRef::new("drums", 8.0)).with_sequence(Sequence::new(2.0, 8.0)))
    }

    #[test]
    fn test_sequence_window() {
        let seq = Sequence::new(2.0, 4.0);
        assert!(!seq.contains(1.99));
        assert!(seq.contains(2.0));
        assert!(seq.contains(6.0));
        assert!(!seq.contains(6.01));

        assert_eq!(seq.progress(0.0), 0.0);
        assert_abs_diff_eq!(seq.progress(3.0), 0.25, epsilon = 1e-6);
        assert_eq!(seq.progress(100.0), 1.0);
    }

    #[test]
    fn test_check_bounds() {
        assert!(Sequence::new(0.0, 4.0).with_offset(8.0).check_bounds(12.0));
        assert!(!Sequence::new(0.0, 4.0).with_offset(9.0).check_bounds(12.0));
        assert!(!Sequence::new(0.0, 0.0).check_bounds(12.0));
        assert!(!Sequence::new(-1.0, 1.0).check_bounds(12.0));
        assert!(!Sequence::new(0.0, 1.0).with_offset(-0.5).check_bounds(12.0));
    }

    #[test]
    fn test_inspect_clean_track() {
        let report = test_track().inspect();
        assert!(report.is_clean());
        assert_eq!(
            report.playable,
            vec![SequenceKey::new(0, 0), SequenceKey::new(0, 1), SequenceKey::new(1, 0)]
        );
    }

    #[test]
    fn test_inspect_excludes_bad_sequence_only() {
        let mut track = test_track();
        track.channels[0].sequences[1].duration = 20.0;

        let report = track.inspect();
        assert_eq!(report.playable, vec![SequenceKey::new(0, 0), SequenceKey::new(1, 0)]);
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            report.issues[0],
            TrackError::InvalidSequenceBounds { channel: 0, sequence: 1, .. }
        ));
    }

    #[test]
    fn test_inspect_skips_channel_without_clip() {
        let mut track = test_track();
        track.channels[1].clip = None;

        let report = track.inspect();
        assert_eq!(report.playable, vec![SequenceKey::new(0, 0), SequenceKey::new(0, 1)]);
        assert_eq!(report.issues[0].channel(), Some(1));
    }

    #[test]
    fn test_sequence_at_prefers_latest_start() {
        let channel = Channel::new(ClipRef::new("a", 20.0))
            .with_sequence(Sequence::new(0.0, 10.0))
            .with_sequence(Sequence::new(5.0, 2.0))
            .with_sequence(Sequence::new(3.0, 10.0));

        assert_eq!(channel.sequence_at(1.0).map(|(i, _)| i), Some(0));
        assert_eq!(channel.sequence_at(4.0).map(|(i, _)| i), Some(2));
        assert_eq!(channel.sequence_at(6.0).map(|(i, _)| i), Some(1));
        assert_eq!(channel.sequence_at(8.0).map(|(i, _)| i), Some(2));
        assert!(channel.sequence_at(14.0).is_none());
    }

    #[test]
    fn test_set_clip_seeds_covering_sequence() {
        let mut channel = Channel::default();
        channel.set_clip(ClipRef::new("bass", 7.5));
        assert_eq!(channel.sequences.len(), 1);
        assert_eq!(channel.sequences[0].duration, 7.5);
        assert_eq!(channel.sequences[0].probability, 1.0);

        // Replacing the clip leaves existing sequences alone
        channel.set_clip(ClipRef::new("bass2", 3.0));
        assert_eq!(channel.sequences.len(), 1);
        assert_eq!(channel.sequences[0].duration, 7.5);
    }

    #[test]
    fn test_duplicate_after_and_clamp() {
        let seq = Sequence::new(2.0, 3.0).with_probability(0.5);
        let next = seq.duplicate_after();
        assert_eq!(next.start_time, 5.0);
        assert_eq!(next.probability, 0.5);

        let mut long = Sequence::new(0.0, 10.0).with_offset(4.0);
        long.clamp_to_clip(8.0);
        assert_eq!(long.duration, 4.0);
    }

    #[test]
    fn test_channel_volume_clamped() {
        assert_eq!(Channel::default().with_volume(3.0).effective_volume(), 2.0);
        assert_eq!(Channel::default().with_volume(-1.0).effective_volume(), 0.0);
        assert_eq!(Channel::default().with_volume(f32::NAN).effective_volume(), 0.0);
    }

    #[test]
    fn test_snap_duration() {
        let track = test_track();
        assert_eq!(track.snap_duration(3.9, 0.25), 4.0);
        assert_eq!(track.snap_duration(9.8, 0.25), 10.0);
        assert_eq!(track.snap_duration(7.0, 0.25), 7.0);
    }

    #[test]
    fn test_beat_duration() {
        let mut track = test_track();
        track.bpm = 120;
        assert_eq!(track.beat_duration(), Some(0.5));
        track.bpm = 0;
        assert_eq!(track.beat_duration(), None);
    }

    #[test]
    fn test_json_roundtrip_and_defaults() {
        let json = r#"{
            "duration": 8.0,
            "loop": true,
            "channels": [
                { "clip": { "id": "strings", "length": 8.0 },
                  "sequences": [ { "duration": 8.0 } ] }
            ]
        }"#;
        let track = Track::from_json(json).unwrap();
        assert!(track.looping);
        assert_eq!(track.bpm, 90);
        assert_eq!(track.channels[0].volume, 1.0);

        let seq = &track.channels[0].sequences[0];
        assert_eq!(seq.probability, 1.0);
        assert_eq!(seq.volume_curve.evaluate(0.3), 1.0);
        assert_abs_diff_eq!(seq.strength_curve.evaluate(0.5), 0.5, epsilon = 1e-5);

        let back = Track::from_json(&track.to_json().unwrap()).unwrap();
        assert_eq!(back, track);
    }

    #[test]
    fn test_from_json_error() {
        assert!(matches!(Track::from_json("{ not json"), Err(TrackError::Json(_))));
    }
}
