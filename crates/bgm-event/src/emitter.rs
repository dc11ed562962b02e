//! Event Emitter
//!
//! Subscriber registry plus the `EventBus` that couples it to the delayed
//! queue. Delivery is synchronous on the thread that drives the player.

use std::fmt;

use crate::event::PlayerEvent;
use crate::queue::DelayedEventQueue;

// ═══════════════════════════════════════════════════════════════════════════════
// SUBSCRIPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Subscriber callback
pub type EventCallback = Box<dyn FnMut(&PlayerEvent) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fan-out of events to registered callbacks
#[derive(Default)]
pub struct EventEmitter {
    subscribers: Vec<(SubscriptionId, EventCallback)>,
    next_id: u64,
    emitted: u64,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscribers", &self.subscribers.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl EventEmitter {
    /// Create an emitter with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&PlayerEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns false if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        before != self.subscribers.len()
    }

    /// Deliver one event to every subscriber, in subscription order
    pub fn emit(&mut self, event: &PlayerEvent) {
        self.emitted += 1;
        for (_, callback) in &mut self.subscribers {
            callback(event);
        }
    }

    /// Number of registered callbacks
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Total events emitted so far
    pub fn emitted_count(&self) -> u64 {
        self.emitted
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT BUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Delayed queue + emitter
#[derive(Debug, Default)]
pub struct EventBus {
    queue: DelayedEventQueue,
    emitter: EventEmitter,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event for device time `at`
    #[inline]
    pub fn schedule(&mut self, at: f64, event: PlayerEvent) {
        self.queue.push(at, event);
    }

    /// Deliver every event due at `now`. Returns the number delivered.
    pub fn dispatch_due(&mut self, now: f64) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.queue.pop_due(now) {
            log::trace!(
                "event {} ch={} seq={} loop={} t={:.3}",
                event.kind.name(),
                event.channel_index(),
                event.sequence_index(),
                event.loop_index,
                event.time
            );
            self.emitter.emit(&event);
            delivered += 1;
        }
        delivered
    }

    /// Drop pending sequence-level events scheduled after `now`
    pub fn cancel_pending_sequence_events(&mut self, now: f64) -> usize {
        self.queue.cancel_after(now, |e| e.kind.is_sequence_level())
    }

    /// Drop pending events scheduled after `now` that match `predicate`
    pub fn cancel_pending_where<F>(&mut self, now: f64, predicate: F) -> usize
    where
        F: FnMut(&PlayerEvent) -> bool,
    {
        self.queue.cancel_after(now, predicate)
    }

    /// Number of events not yet delivered
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Register a callback
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&PlayerEvent) + Send + 'static,
    {
        self.emitter.subscribe(callback)
    }

    /// Remove a callback
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.emitter.unsubscribe(id)
    }

    /// Access the emitter
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}
