//! Active set management for streaming joins.
//!
//! The ActiveSet holds annotation intervals already pulled from a source that
//! could still overlap a later query, with automatic compaction to bound
//! memory.

use crate::interval::Interval;

/// Compaction threshold - trigger when head_idx exceeds this value.
const COMPACTION_THRESHOLD: usize = 4096;

/// Active set with automatic compaction.
///
/// Uses Vec + head_idx pattern for better cache locality than VecDeque.
/// Elements before head_idx are logically removed but not deallocated
/// until compaction is triggered.
#[derive(Debug)]
pub struct ActiveSet<T> {
    /// Storage for active elements.
    data: Vec<T>,
    /// Index of the first logically active element.
    head_idx: usize,
}

impl<T> Default for ActiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ActiveSet<T> {
    /// Create a new empty active set.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new active set with specified initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            head_idx: 0,
        }
    }

    /// Add an element to the active set.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    /// Get the number of logically active elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head_idx
    }

    /// Check if the active set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head_idx >= self.data.len()
    }

    /// Advance head while condition is true for the front element.
    ///
    /// Returns the number of elements removed.
    #[inline]
    pub fn advance_while<F>(&mut self, mut condition: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let start_idx = self.head_idx;
        while self.head_idx < self.data.len() && condition(&self.data[self.head_idx]) {
            self.head_idx += 1;
        }
        self.head_idx - start_idx
    }

    /// Compact the internal storage if needed.
    pub fn compact_if_needed(&mut self) {
        if self.head_idx > COMPACTION_THRESHOLD && self.head_idx * 2 > self.data.len() {
            self.data.drain(0..self.head_idx);
            self.head_idx = 0;
        }
    }

    /// Clear all elements and reset state.
    pub fn clear(&mut self) {
        self.data.clear();
        self.head_idx = 0;
    }

    /// Iterator over active elements.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data[self.head_idx..].iter()
    }
}

/// Intervals arrive sorted by start, not by end, so a long interval at the
/// front can shield shorter dead ones behind it. Those are swept out once the
/// set grows past the compaction threshold.
impl<T: Interval> ActiveSet<T> {
    /// Remove intervals that end at or before `position`.
    ///
    /// Returns the number of intervals removed.
    pub fn expire_before(&mut self, position: u64) -> usize {
        let mut count = self.advance_while(|iv| iv.effective_end() <= position);
        if self.len() > COMPACTION_THRESHOLD {
            let before = self.len();
            self.data.drain(0..self.head_idx);
            self.head_idx = 0;
            self.data.retain(|iv| iv.effective_end() > position);
            count += before - self.data.len();
        } else {
            self.compact_if_needed();
        }
        count
    }

    /// Iterate over intervals that overlap the given range [start, end).
    pub fn iter_overlapping(&self, start: u64, end: u64) -> impl Iterator<Item = &T> {
        self.iter()
            .filter(move |iv| iv.effective_end() > start && iv.start() < end)
    }
}
