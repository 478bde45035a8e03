//! Buffer module for accumulating log entries awaiting a batch.
//!
//! [`EntryBuffer`] is the bounded FIFO owned by the forwarder worker. Its
//! capacity equals the configured batch size, so it doubles as the batch
//! currently being assembled and as the first backpressure gate: a full
//! buffer refuses entries until it is flushed.

use std::collections::VecDeque;

use crate::entry::LogEntry;

/// Bounded FIFO of entries awaiting batching.
#[derive(Debug)]
pub struct EntryBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EntryBuffer {
    /// Create an empty buffer holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an entry, handing it back if the buffer is full.
    pub fn offer(&mut self, entry: LogEntry) -> Result<(), LogEntry> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Remove up to `max` entries from the front, oldest first.
    pub fn drain(&mut self, max: usize) -> Vec<LogEntry> {
        let count = max.min(self.entries.len());
        self.entries.drain(..count).collect()
    }

    /// Remove every entry, oldest first.
    pub fn drain_all(&mut self) -> Vec<LogEntry> {
        self.drain(self.entries.len())
    }

    /// Get the current number of entries in the buffer.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogLevel;

    fn create_test_entry(message: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, message)
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = EntryBuffer::new(10);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 10);
    }

    #[test]
    fn test_buffer_refuses_when_full() {
        let mut buffer = EntryBuffer::new(2);
        buffer.offer(create_test_entry("a")).unwrap();
        buffer.offer(create_test_entry("b")).unwrap();
        assert!(buffer.is_full());

        let refused = buffer.offer(create_test_entry("c")).unwrap_err();
        assert_eq!(refused.message(), "c");
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_buffer_drains_in_order() {
        let mut buffer = EntryBuffer::new(5);
        for message in ["a", "b", "c"] {
            buffer.offer(create_test_entry(message)).unwrap();
        }

        let first = buffer.drain(2);
        let messages: Vec<&str> = first.iter().map(|e| e.message()).collect();
        assert_eq!(messages, vec!["a", "b"]);

        let rest = buffer.drain_all();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].message(), "c");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_on_empty_buffer() {
        let mut buffer = EntryBuffer::new(3);
        assert!(buffer.drain(3).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drained_buffer_accepts_again() {
        let mut buffer = EntryBuffer::new(3);
        let refused = (0..4)
            .filter(|_| buffer.offer(create_test_entry("x")).is_err())
            .count();
        assert_eq!(refused, 1);

        assert_eq!(buffer.drain_all().len(), 3);
        buffer.offer(create_test_entry("y")).unwrap();
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_full());
    }
}
