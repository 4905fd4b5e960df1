//! Restores input order for batches that finish out of order.

use std::collections::BTreeMap;

/// Holds batches keyed by serial number until every earlier serial has
/// been released.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Store a finished batch.
    pub fn insert(&mut self, serial: u64, item: T) {
        debug_assert!(serial >= self.next, "serial {} already released", serial);
        self.pending.insert(serial, item);
    }

    /// Take the next batch in serial order, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next)?;
        self.next += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_in_serial_order() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(2, "c");
        buffer.insert(1, "b");
        assert_eq!(buffer.pop_ready(), None);

        buffer.insert(0, "a");
        assert_eq!(buffer.pop_ready(), Some("a"));
        assert_eq!(buffer.pop_ready(), Some("b"));
        assert_eq!(buffer.pop_ready(), Some("c"));
        assert_eq!(buffer.pop_ready(), None);

        buffer.insert(3, "d");
        assert_eq!(buffer.pop_ready(), Some("d"));
    }
}
