//! Output Handle Pool
//!
//! One device handle per sequence, keyed by `SequenceKey`. Two sequences
//! sharing a clip still get separate handles so they can overlap. Handles are
//! bound lazily on first arm, reused on every later loop of the session and
//! released exactly once when the session ends.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bgm_core::{ClipRef, SequenceKey};

use crate::output::{AudioOutput, OutputHandle, OutputResult};

/// One scheduled play of a sequence, in device time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence {
    /// Start of the loop this occurrence belongs to
    pub loop_start: f64,
    /// Scheduled start
    pub start: f64,
    /// Scheduled stop
    pub end: f64,
}

impl Occurrence {
    #[inline]
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Handle plus the occurrences scheduled on it that have not finished
#[derive(Debug)]
pub struct Binding {
    pub handle: OutputHandle,
    occurrences: VecDeque<Occurrence>,
}

impl Binding {
    fn new(handle: OutputHandle) -> Self {
        Self {
            handle,
            occurrences: VecDeque::new(),
        }
    }

    /// Forget occurrences that ended before `now`
    pub fn prune(&mut self, now: f64) {
        self.occurrences.retain(|o| o.end >= now);
    }

    /// Occurrence sounding at `now`; the latest start wins on overlap
    pub fn active(&self, now: f64) -> Option<Occurrence> {
        self.occurrences
            .iter()
            .filter(|o| o.contains(now))
            .max_by(|a, b| a.start.total_cmp(&b.start))
            .copied()
    }

    /// Pending or sounding occurrences
    pub fn occurrences(&self) -> impl Iterator<Item = &Occurrence> {
        self.occurrences.iter()
    }
}

/// Session-scoped handle pool
#[derive(Debug, Default)]
pub struct OutputPool {
    bindings: BTreeMap<SequenceKey, Binding>,
    excluded: BTreeSet<SequenceKey>,
}

impl OutputPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `key`, binding a new one on first use
    ///
    /// New handles start muted so nothing sounds before the first volume
    /// update.
    pub fn acquire<O: AudioOutput + ?Sized>(
        &mut self,
        key: SequenceKey,
        clip: &ClipRef,
        bus: Option<&str>,
        output: &mut O,
    ) -> OutputResult<OutputHandle> {
        if let Some(binding) = self.bindings.get(&key) {
            return Ok(binding.handle);
        }

        let handle = output.bind(clip, bus)?;
        output.set_volume(handle, 0.0);
        self.bindings.insert(key, Binding::new(handle));
        log::trace!("bound {:?} -> {:?} ({})", key, handle, clip.id);
        Ok(handle)
    }

    /// Remember a scheduled occurrence for volume tracking
    pub fn record(&mut self, key: SequenceKey, occurrence: Occurrence) {
        if let Some(binding) = self.bindings.get_mut(&key) {
            binding.occurrences.push_back(occurrence);
        }
    }

    /// Mark `key` unusable for the rest of the session
    pub fn exclude(&mut self, key: SequenceKey) {
        self.excluded.insert(key);
    }

    /// True if `key` was excluded after a device failure
    pub fn is_excluded(&self, key: SequenceKey) -> bool {
        self.excluded.contains(&key)
    }

    /// Sequences excluded so far
    pub fn excluded(&self) -> impl Iterator<Item = SequenceKey> + '_ {
        self.excluded.iter().copied()
    }

    /// Release the handle bound to `key` and forget it; the next arm binds
    /// a fresh one
    pub fn discard<O: AudioOutput + ?Sized>(&mut self, key: SequenceKey, output: &mut O) -> bool {
        match self.bindings.remove(&key) {
            Some(binding) => {
                output.release(binding.handle);
                true
            }
            None => false,
        }
    }

    /// Handle bound to `key`, if any
    pub fn handle(&self, key: SequenceKey) -> Option<OutputHandle> {
        self.bindings.get(&key).map(|b| b.handle)
    }

    /// Binding for `key`, if any
    pub fn binding(&self, key: SequenceKey) -> Option<&Binding> {
        self.bindings.get(&key)
    }

    /// Iterate bindings mutably
    pub fn bindings_mut(&mut self) -> impl Iterator<Item = (&SequenceKey, &mut Binding)> {
        self.bindings.iter_mut()
    }

    /// Number of bound handles
    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Release every handle. Returns how many were released.
    pub fn release_all<O: AudioOutput + ?Sized>(&mut self, output: &mut O) -> usize {
        let bindings = std::mem::take(&mut self.bindings);
        let count = bindings.len();
        for (_, binding) in bindings {
            output.release(binding.handle);
        }
        count
    }
}
