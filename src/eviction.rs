//! Victim-selection queue for the frame pool.
//!
//! A simple FIFO approximation of LRU: frames are pushed when they become
//! unpinned and popped in that order when the pool needs a victim. The
//! design doesn't mandate a particular policy (a clock hand works just as
//! well) as long as it guarantees progress — if any unpinned frame exists,
//! one must come out of the queue in bounded time.

use std::collections::VecDeque;

/// FIFO victim queue, keyed by frame index.
#[derive(Debug)]
pub(crate) struct EvictionQueue {
    queue: VecDeque<usize>,
    capacity: usize,
}

impl EvictionQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Marks `frame_idx` as a candidate, most-recently-unpinned last.
    pub(crate) fn push(&mut self, frame_idx: usize) {
        self.queue.retain(|&idx| idx != frame_idx);
        self.queue.push_back(frame_idx);
        while self.queue.len() > self.capacity {
            self.queue.pop_front();
        }
    }

    /// Pops the oldest candidate, if any.
    pub(crate) fn pop(&mut self) -> Option<usize> {
        self.queue.pop_front()
    }

    /// Removes a specific frame from the queue, e.g. because it was pinned
    /// again before being chosen as a victim.
    pub(crate) fn remove(&mut self, frame_idx: usize) {
        self.queue.retain(|&idx| idx != frame_idx);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = EvictionQueue::new(10);
        q.push(0);
        q.push(1);
        q.push(2);
        assert_eq!(q.pop(), Some(0));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_moves_to_back() {
        let mut q = EvictionQueue::new(10);
        q.push(0);
        q.push(1);
        q.push(0);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(0));
    }

    #[test]
    fn remove_takes_a_frame_out_of_contention() {
        let mut q = EvictionQueue::new(10);
        q.push(0);
        q.push(1);
        q.remove(0);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some(1));
    }
}
