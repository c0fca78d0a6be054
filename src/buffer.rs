//! Bounded buffer for undelivered metric reports.
//!
//! When the API is unreachable, finished snapshots are parked here and
//! flushed on the next successful delivery. The buffer is a fixed-size
//! FIFO: once full, the oldest report is dropped so memory use stays
//! bounded during long outages.

use std::collections::VecDeque;

/// Default number of reports retained while offline.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// A fixed-capacity FIFO buffer for metric reports.
#[derive(Debug, Clone)]
pub struct MetricBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> MetricBuffer<T> {
    /// Creates a buffer with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be greater than 0");
        Self { data: VecDeque::with_capacity(capacity), capacity }
    }

    /// Adds a report, discarding the oldest one when at capacity.
    pub fn push(&mut self, value: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// Removes and returns all buffered reports, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.data.drain(..).collect()
    }

    /// Returns the number of buffered reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the buffer is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Returns the maximum capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for MetricBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
