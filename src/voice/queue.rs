//! FIFO queue of pending auto-read requests.
//!
//! Insertion order is playback order.  Identical keys are not merged:
//! enqueueing the same response twice plays it twice.

use std::collections::VecDeque;

use tracing::debug;

use super::types::PlaybackKey;

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<PlaybackKey>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key at the tail.
    pub fn push(&mut self, key: PlaybackKey) {
        debug!(key = %key, position = self.items.len(), "Queued for auto-read");
        self.items.push_back(key);
    }

    /// Remove and return the head.
    pub fn pop(&mut self) -> Option<PlaybackKey> {
        self.items.pop_front()
    }

    /// Drop every pending item, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pending keys in playback order.
    pub fn snapshot(&self) -> Vec<PlaybackKey> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> PlaybackKey {
        PlaybackKey::new("conv", i)
    }

    #[test]
    fn pops_in_insertion_order() {
        let mut queue = PlaybackQueue::new();
        queue.push(key(0));
        queue.push(key(1));
        queue.push(key(2));

        assert_eq!(queue.pop(), Some(key(0)));
        assert_eq!(queue.pop(), Some(key(1)));
        assert_eq!(queue.pop(), Some(key(2)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut queue = PlaybackQueue::new();
        queue.push(key(0));
        queue.push(key(0));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.snapshot(), vec![key(0), key(0)]);
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut queue = PlaybackQueue::new();
        queue.push(key(0));
        queue.push(key(1));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }
}
