//! bgm-core: Track data model and curves for the adaptive music sequencer
//!
//! A **Track** groups **Channels**; each channel binds one audio clip and holds
//! any number of time-scheduled **Sequences**. Sequences carry two keyframe
//! curves: volume over elapsed time and volume over global intensity
//! ("strength").
//!
//! Nothing in this crate schedules audio. The player crate reads these values
//! as an immutable snapshot for the duration of a play session.

mod curve;
mod error;
mod track;

pub use curve::*;
pub use error::*;
pub use track::*;

/// Tolerance used when comparing sequence bounds against clip length (seconds)
pub const BOUNDS_EPSILON: f64 = 1e-6;

/// Maximum base volume multiplier a channel may apply
pub const MAX_CHANNEL_VOLUME: f32 = 2.0;
