//! Reading Buffer
//!
//! Bounded, append-only window of the most recent readings. Oldest entries are
//! evicted from the front; the order of the remaining entries never changes.

use std::collections::VecDeque;
use tracing::trace;

use crate::config::DEFAULT_HISTORY_CAPACITY;
use crate::models::Reading;

#[derive(Debug, Clone)]
pub struct ReadingBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl ReadingBuffer {
    /// Create a buffer holding at most `capacity` readings (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Push to the end, then drop from the front until within capacity
    pub fn append(&mut self, reading: Reading) {
        self.readings.push_back(reading);

        while self.readings.len() > self.capacity {
            if let Some(evicted) = self.readings.pop_front() {
                trace!(reading_id = %evicted.id, "Evicted oldest reading from window");
            }
        }
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first iteration
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Oldest-first copy for publication
    pub fn to_vec(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }
}

impl Default for ReadingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
