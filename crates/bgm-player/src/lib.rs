//! Adaptive Music Playback Scheduler
//!
//! Turns a static [`Track`](bgm_core::Track) into timed commands on an
//! external audio device:
//!
//! - **Trigger rolls**: every sequence rolls against its probability once
//!   per loop
//! - **Sample-accurate scheduling**: starts and stops are placed on the
//!   device clock, the next loop pre-rolled by a small look-ahead
//! - **Strength**: a fade envelope scales every sequence through its
//!   strength curve
//! - **Events**: lifecycle notifications aligned with the audio timeline
//!
//! ## Usage
//!
//! ```ignore
//! let mut player = Player::new(track, VirtualOutput::new(), PlayerConfig::default());
//! player.subscribe(|event| println!("{}", event.kind.name()));
//! player.play();
//!
//! // Host frame loop
//! player.output_mut().advance(dt);
//! player.advance(dt);
//! ```

pub mod config;
pub mod output;
pub mod player;
pub mod pool;
pub mod resolver;
pub mod session;
pub mod strength;

pub use config::*;
pub use output::*;
pub use player::*;
pub use pool::*;
pub use resolver::*;
pub use session::*;
pub use strength::*;

use thiserror::Error;

/// Player errors
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Invalid config: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PlayerResult<T> = Result<T, PlayerError>;
