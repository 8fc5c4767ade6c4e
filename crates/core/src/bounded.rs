//! Fixed-capacity FIFO queue with oldest-first eviction.
//!
//! [`BoundedQueue`] never holds more than `capacity` items. Pushing onto
//! a full queue evicts the oldest item and hands it back to the caller;
//! the newest item is always retained.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue.
    ///
    /// A `capacity` of zero is raised to one so the most recent push is
    /// always observable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of items held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append `item` at the back. Returns the evicted front item when the
    /// queue was already full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove every item. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The most recently pushed item.
    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }
}
