//! Sequencer Event System
//!
//! Lifecycle notifications for external observers (editors, game logic,
//! debug overlays):
//! - Player transitions (play / pause / stop)
//! - Loop boundaries
//! - Per-sequence start, skip and end
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        EVENT DELIVERY                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │   Player                      EventBus                            │
//! │   ┌───────────────┐          ┌──────────────────────────────┐    │
//! │   │ loop start    │─schedule▶│ DelayedEventQueue (min-heap) │    │
//! │   │ trigger rolls │  (at t)  │  ordered by (time, insert)   │    │
//! │   │ play/pause/.. │          └──────────────┬───────────────┘    │
//! │   └───────────────┘                         │ dispatch_due(now)  │
//! │                                             ▼                    │
//! │                               EventEmitter ─▶ subscribers         │
//! │                                                                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every event, immediate or delayed, goes through the same queue on the
//! audio device clock, so observers always see events in the order of the
//! audio timeline.

pub mod emitter;
pub mod event;
pub mod queue;

// Re-exports
pub use emitter::{EventBus, EventCallback, EventEmitter, SubscriptionId};
pub use event::{PlayerEvent, PlayerEventKind};
pub use queue::DelayedEventQueue;
