//! Delayed Event Queue
//!
//! Min-heap of events keyed by device time. Events scheduled for the same
//! instant come out in the order they were pushed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::PlayerEvent;

/// Queue entry
#[derive(Debug, Clone)]
struct Scheduled {
    at: f64,
    order: u64,
    event: PlayerEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap, the earliest entry must be on top
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Time-ordered queue of pending events
#[derive(Debug, Default)]
pub struct DelayedEventQueue {
    heap: BinaryHeap<Scheduled>,
    next_order: u64,
}

impl DelayedEventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` for device time `at`
    pub fn push(&mut self, at: f64, event: PlayerEvent) {
        let order = self.next_order;
        self.next_order += 1;
        self.heap.push(Scheduled { at, order, event });
    }

    /// Time of the earliest pending event
    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|s| s.at)
    }

    /// Pop the earliest event if it is due at `now`
    pub fn pop_due(&mut self, now: f64) -> Option<PlayerEvent> {
        if self.heap.peek().is_some_and(|s| s.at <= now) {
            self.heap.pop().map(|s| s.event)
        } else {
            None
        }
    }

    /// Pop every event due at `now`, in delivery order
    pub fn drain_due(&mut self, now: f64) -> Vec<PlayerEvent> {
        let mut due = Vec::new();
        while let Some(event) = self.pop_due(now) {
            due.push(event);
        }
        due
    }

    /// Drop pending events scheduled after `now` that match `predicate`
    ///
    /// Returns the number of events removed.
    pub fn cancel_after<F>(&mut self, now: f64, mut predicate: F) -> usize
    where
        F: FnMut(&PlayerEvent) -> bool,
    {
        let before = self.heap.len();
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        entries.retain(|s| s.at <= now || !predicate(&s.event));
        self.heap = BinaryHeap::from(entries);
        before - self.heap.len()
    }

    /// Number of pending events
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if nothing is pending
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PlayerEventKind;
    use bgm_core::{SequenceKey, TrackId};

    fn seq_event(kind: PlayerEventKind, sequence: usize, time: f64) -> PlayerEvent {
        PlayerEvent::sequence(kind, TrackId(1), SequenceKey::new(0, sequence), 0, time)
    }

    #[test]
    fn test_pops_in_time_order() {
        let mut queue = DelayedEventQueue::new();
        queue.push(3.0, seq_event(PlayerEventKind::SequenceEnded, 0, 3.0));
        queue.push(1.0, seq_event(PlayerEventKind::SequenceStarted, 0, 1.0));
        queue.push(2.0, seq_event(PlayerEventKind::SequenceStarted, 1, 2.0));

        let times: Vec<f64> = queue.drain_due(10.0).iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_time_keeps_insertion_order() {
        let mut queue = DelayedEventQueue::new();
        queue.push(5.0, seq_event(PlayerEventKind::SequenceEnded, 0, 5.0));
        queue.push(
            5.0,
            PlayerEvent::player(PlayerEventKind::TrackLoopEnded, TrackId(1), 0, 5.0),
        );
        queue.push(
            5.0,
            PlayerEvent::player(PlayerEventKind::TrackLoopStarted, TrackId(1), 1, 5.0),
        );
        queue.push(5.0, seq_event(PlayerEventKind::SequenceStarted, 0, 5.0));

        let kinds: Vec<PlayerEventKind> = queue.drain_due(5.0).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PlayerEventKind::SequenceEnded,
                PlayerEventKind::TrackLoopEnded,
                PlayerEventKind::TrackLoopStarted,
                PlayerEventKind::SequenceStarted,
            ]
        );
    }

    #[test]
    fn test_drain_due_leaves_future_events() {
        let mut queue = DelayedEventQueue::new();
        queue.push(1.0, seq_event(PlayerEventKind::SequenceStarted, 0, 1.0));
        queue.push(4.0, seq_event(PlayerEventKind::SequenceEnded, 0, 4.0));

        assert_eq!(queue.drain_due(2.0).len(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_time(), Some(4.0));
        assert!(queue.pop_due(3.99).is_none());
        assert!(queue.pop_due(4.0).is_some());
    }

    #[test]
    fn test_cancel_after() {
        let mut queue = DelayedEventQueue::new();
        queue.push(1.0, seq_event(PlayerEventKind::SequenceStarted, 0, 1.0));
        queue.push(3.0, seq_event(PlayerEventKind::SequenceEnded, 0, 3.0));
        queue.push(
            3.0,
            PlayerEvent::player(PlayerEventKind::TrackLoopEnded, TrackId(1), 0, 3.0),
        );

        let removed = queue.cancel_after(2.0, |e| e.kind.is_sequence_level());
        assert_eq!(removed, 1);

        let kinds: Vec<PlayerEventKind> = queue.drain_due(10.0).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![PlayerEventKind::SequenceStarted, PlayerEventKind::TrackLoopEnded]
        );
    }
}
