//! Error types for the track data model

use thiserror::Error;

/// Track data model error type
///
/// Bounds and asset errors are recoverable: the player drops the offending
/// sequence or channel for the session and keeps playing the rest.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Channel {channel} has no audio clip bound")]
    MissingAsset { channel: usize },

    #[error(
        "Sequence {sequence} on channel {channel} is out of bounds \
         (start {start_time}s, offset {offset}s, duration {duration}s, clip {clip_length}s)"
    )]
    InvalidSequenceBounds {
        channel: usize,
        sequence: usize,
        start_time: f64,
        offset: f64,
        duration: f64,
        clip_length: f64,
    },

    #[error("Invalid track duration: {0}")]
    InvalidDuration(f64),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackError {
    /// Channel the error refers to, if any
    pub fn channel(&self) -> Option<usize> {
        match self {
            TrackError::MissingAsset { channel } => Some(*channel),
            TrackError::InvalidSequenceBounds { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

/// Result type alias
pub type TrackResult<T> = Result<T, TrackError>;
