//! Audio Output Capability
//!
//! The player never mixes audio itself. It drives an external device that
//! can bind a clip to a voice, schedule sample-accurate start/stop on its own
//! monotonic clock, and apply a live volume multiplier.
//!
//! `VirtualOutput` is a headless implementation with a manually advanced
//! clock. It records every command so schedules can be inspected.

use std::collections::{BTreeMap, HashSet};

use bgm_core::ClipRef;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Device voice handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputHandle(pub u32);

/// Output device errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to bind clip '{clip}': {reason}")]
    BindFailed { clip: String, reason: String },

    #[error("Unknown output handle: {0:?}")]
    UnknownHandle(OutputHandle),

    #[error("Device error: {0}")]
    Device(String),
}

pub type OutputResult<T> = Result<T, OutputError>;

/// Audio output device driven by the player
pub trait AudioOutput {
    /// Load/bind `clip` to a new voice routed to `bus`
    fn bind(&mut self, clip: &ClipRef, bus: Option<&str>) -> OutputResult<OutputHandle>;

    /// Start playback at device time `at`, seeking `offset` seconds into the clip
    fn schedule_start(&mut self, handle: OutputHandle, at: f64, offset: f64) -> OutputResult<()>;

    /// Stop playback at device time `at`
    fn schedule_stop(&mut self, handle: OutputHandle, at: f64) -> OutputResult<()>;

    /// Set the live volume multiplier
    fn set_volume(&mut self, handle: OutputHandle, volume: f32);

    /// Current device time (seconds, monotonic)
    fn now(&self) -> f64;

    /// Stop and free the voice
    fn release(&mut self, handle: OutputHandle);
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn bind(&mut self, clip: &ClipRef, bus: Option<&str>) -> OutputResult<OutputHandle> {
        (**self).bind(clip, bus)
    }

    fn schedule_start(&mut self, handle: OutputHandle, at: f64, offset: f64) -> OutputResult<()> {
        (**self).schedule_start(handle, at, offset)
    }

    fn schedule_stop(&mut self, handle: OutputHandle, at: f64) -> OutputResult<()> {
        (**self).schedule_stop(handle, at)
    }

    fn set_volume(&mut self, handle: OutputHandle, volume: f32) {
        (**self).set_volume(handle, volume)
    }

    fn now(&self) -> f64 {
        (**self).now()
    }

    fn release(&mut self, handle: OutputHandle) {
        (**self).release(handle)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIRTUAL OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Command received by the virtual device (volume changes are not logged)
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCommand {
    Bind { handle: OutputHandle, clip: String },
    ScheduleStart { handle: OutputHandle, at: f64, offset: f64 },
    ScheduleStop { handle: OutputHandle, at: f64 },
    Release { handle: OutputHandle },
}

/// State of one virtual voice
#[derive(Debug, Clone, Default)]
pub struct VirtualVoice {
    /// Bound clip id
    pub clip: String,
    /// Routing bus
    pub bus: Option<String>,
    /// Last volume set
    pub volume: f32,
    /// Scheduled starts (device time, clip offset)
    pub starts: Vec<(f64, f64)>,
    /// Scheduled stops (device time)
    pub stops: Vec<f64>,
}

/// Headless audio device with a manually advanced clock
#[derive(Debug, Default)]
pub struct VirtualOutput {
    now: f64,
    next_handle: u32,
    voices: BTreeMap<OutputHandle, VirtualVoice>,
    commands: Vec<OutputCommand>,
    failing_clips: HashSet<String>,
    failing_starts: HashSet<String>,
    failing_stops: HashSet<String>,
    released: usize,
}

impl VirtualOutput {
    /// Create a device with its clock at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the device clock
    pub fn advance(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.now += dt;
        }
    }

    /// Jump the device clock to `time` (never backwards)
    pub fn set_time(&mut self, time: f64) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Make every future bind of `clip_id` fail
    pub fn fail_binds_for(&mut self, clip_id: impl Into<String>) {
        self.failing_clips.insert(clip_id.into());
    }

    /// Make every future `schedule_start` on voices playing `clip_id` fail
    pub fn fail_starts_for(&mut self, clip_id: impl Into<String>) {
        self.failing_starts.insert(clip_id.into());
    }

    /// Make every future `schedule_stop` on voices playing `clip_id` fail
    pub fn fail_stops_for(&mut self, clip_id: impl Into<String>) {
        self.failing_stops.insert(clip_id.into());
    }

    /// Voice state for a live handle
    pub fn voice(&self, handle: OutputHandle) -> Option<&VirtualVoice> {
        self.voices.get(&handle)
    }

    /// Last volume set on a live handle
    pub fn volume(&self, handle: OutputHandle) -> Option<f32> {
        self.voices.get(&handle).map(|v| v.volume)
    }

    /// True if a scheduled start/stop window covers the current time
    pub fn is_sounding(&self, handle: OutputHandle) -> bool {
        self.voices.get(&handle).is_some_and(|voice| {
            voice
                .starts
                .iter()
                .zip(voice.stops.iter())
                .any(|(&(start, _), &stop)| start <= self.now && self.now < stop)
        })
    }

    /// Handles currently bound and not yet released
    pub fn live_handles(&self) -> usize {
        self.voices.len()
    }

    /// Total binds performed
    pub fn bind_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, OutputCommand::Bind { .. }))
            .count()
    }

    /// Total releases performed
    pub fn release_count(&self) -> usize {
        self.released
    }

    /// Full command log
    pub fn commands(&self) -> &[OutputCommand] {
        &self.commands
    }
}

impl AudioOutput for VirtualOutput {
    fn bind(&mut self, clip: &ClipRef, bus: Option<&str>) -> OutputResult<OutputHandle> {
        if self.failing_clips.contains(&clip.id) {
            return Err(OutputError::BindFailed {
                clip: clip.id.clone(),
                reason: "virtual device configured to reject clip".to_string(),
            });
        }

        self.next_handle += 1;
        let handle = OutputHandle(self.next_handle);
        self.voices.insert(
            handle,
            VirtualVoice {
                clip: clip.id.clone(),
                bus: bus.map(str::to_string),
                ..Default::default()
            },
        );
        self.commands.push(OutputCommand::Bind {
            handle,
            clip: clip.id.clone(),
        });
        Ok(handle)
    }

    fn schedule_start(&mut self, handle: OutputHandle, at: f64, offset: f64) -> OutputResult<()> {
        let failing = &self.failing_starts;
        let voice = self
            .voices
            .get_mut(&handle)
            .ok_or(OutputError::UnknownHandle(handle))?;
        if failing.contains(&voice.clip) {
            return Err(OutputError::Device(format!("start rejected for '{}'", voice.clip)));
        }
        voice.starts.push((at, offset));
        self.commands
            .push(OutputCommand::ScheduleStart { handle, at, offset });
        Ok(())
    }

    fn schedule_stop(&mut self, handle: OutputHandle, at: f64) -> OutputResult<()> {
        let failing = &self.failing_stops;
        let voice = self
            .voices
            .get_mut(&handle)
            .ok_or(OutputError::UnknownHandle(handle))?;
        if failing.contains(&voice.clip) {
            return Err(OutputError::Device(format!("stop rejected for '{}'", voice.clip)));
        }
        voice.stops.push(at);
        self.commands.push(OutputCommand::ScheduleStop { handle, at });
        Ok(())
    }

    fn set_volume(&mut self, handle: OutputHandle, volume: f32) {
        if let Some(voice) = self.voices.get_mut(&handle) {
            voice.volume = volume;
        }
    }

    fn now(&self) -> f64 {
        self.now
    }

    fn release(&mut self, handle: OutputHandle) {
        if self.voices.remove(&handle).is_some() {
            self.released += 1;
            self.commands.push(OutputCommand::Release { handle });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_schedule_release() {
        let mut out = VirtualOutput::new();
        let clip = ClipRef::new("pads", 8.0);

        let h = out.bind(&clip, Some("Music")).unwrap();
        out.schedule_start(h, 1.0, 0.5).unwrap();
        out.schedule_stop(h, 3.0).unwrap();
        assert_eq!(out.voice(h).unwrap().bus.as_deref(), Some("Music"));

        assert!(!out.is_sounding(h));
        out.advance(1.0);
        assert!(out.is_sounding(h));
        out.advance(2.0);
        assert!(!out.is_sounding(h));

        out.release(h);
        out.release(h);
        assert_eq!(out.release_count(), 1);
        assert_eq!(out.live_handles(), 0);
        assert!(matches!(
            out.schedule_start(h, 4.0, 0.0),
            Err(OutputError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_failing_bind() {
        let mut out = VirtualOutput::new();
        out.fail_binds_for("broken");
        assert!(out.bind(&ClipRef::new("broken", 1.0), None).is_err());
        assert!(out.bind(&ClipRef::new("fine", 1.0), None).is_ok());
        assert_eq!(out.bind_count(), 1);
    }

    #[test]
    fn test_failing_schedules() {
        let mut out = VirtualOutput::new();
        out.fail_starts_for("nostart");
        out.fail_stops_for("nostop");

        let a = out.bind(&ClipRef::new("nostart", 1.0), None).unwrap();
        assert!(matches!(out.schedule_start(a, 0.0, 0.0), Err(OutputError::Device(_))));
        assert!(out.schedule_stop(a, 1.0).is_ok());
        assert!(out.voice(a).unwrap().starts.is_empty());

        let b = out.bind(&ClipRef::new("nostop", 1.0), None).unwrap();
        assert!(out.schedule_start(b, 0.0, 0.0).is_ok());
        assert!(matches!(out.schedule_stop(b, 1.0), Err(OutputError::Device(_))));
        assert!(out.voice(b).unwrap().stops.is_empty());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let mut out = VirtualOutput::new();
        out.advance(2.0);
        out.advance(-1.0);
        out.set_time(1.0);
        assert_eq!(out.now(), 2.0);
        out.set_time(5.0);
        assert_eq!(out.now(), 5.0);
    }
}
