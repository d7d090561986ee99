// Rolling window: bounded, insertion-ordered audience samples (newest last).
// Live pushes append with FIFO eviction; a snapshot fetch replaces the whole content.

use std::collections::VecDeque;

use crate::models::Sample;

pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl RollingWindow {
    /// Capacity is clamped to at least 1; config validation rejects 0 before it gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends one sample, evicting from the front until the capacity holds.
    /// Returns how many samples were evicted.
    pub fn push(&mut self, sample: Sample) -> usize {
        self.samples.push_back(sample);
        let mut evicted = 0;
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
            evicted += 1;
        }
        debug_assert!(self.samples.len() <= self.capacity);
        evicted
    }

    /// Discards everything (including live-appended samples) and takes `samples` as the new content.
    /// Only the newest `capacity` entries of an oversized replacement are kept.
    /// Returns how many input samples were dropped for lack of room.
    pub fn replace<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut incoming: VecDeque<Sample> = samples.into_iter().collect();
        let dropped = incoming.len().saturating_sub(self.capacity);
        incoming.drain(..dropped);
        self.samples = incoming;
        debug_assert!(self.samples.len() <= self.capacity);
        dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Owned copy in insertion order, for publishing.
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }
}
