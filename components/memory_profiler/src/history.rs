//! Bounded, insertion-ordered sample buffer

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::types::{Sample, SampleRecord};

/// FIFO ring buffer of sample records
///
/// Length never exceeds the capacity fixed at construction. Pushing into a
/// full history evicts the oldest record, so iteration order is always
/// chronological.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    records: VecDeque<SampleRecord>,
    capacity: NonZeroUsize,
}

impl SampleHistory {
    /// Storage grows with use; `capacity` only bounds the length
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
        }
    }

    /// Append a record, returning the evicted oldest record if the buffer was full
    pub fn push(&mut self, record: SampleRecord) -> Option<SampleRecord> {
        let evicted = if self.records.len() == self.capacity.get() {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Records, oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SampleRecord> + '_ {
        self.records.iter()
    }

    /// Successful samples, oldest first
    pub fn measured(&self) -> impl DoubleEndedIterator<Item = &Sample> + '_ {
        self.records.iter().filter_map(SampleRecord::sample)
    }

    pub fn latest(&self) -> Option<&SampleRecord> {
        self.records.back()
    }

    pub fn to_vec(&self) -> Vec<SampleRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
