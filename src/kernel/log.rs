use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use serde::Serialize;
use std::fmt;

use crate::kernel::time::{format_timestamp, now, Timestamp};

/// Operator-visible diagnostic lines kept per process.
pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp_text: String,
    pub message: String,
}

impl LogEntry {
    /// `<timestamp> - <message>`, the form shown in the diagnostics panel.
    pub fn line(&self) -> String {
        format!("{} - {}", self.timestamp_text, self.message)
    }
}

/// Fixed-capacity append log. When full, the oldest line is overwritten.
pub struct BoundedLog {
    entries: HeapRb<LogEntry>,
}

impl BoundedLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HeapRb::new(capacity.max(1)),
        }
    }

    pub fn append(&mut self, message: impl Into<String>) {
        self.append_at(now(), message);
    }

    pub fn append_at(&mut self, at: Timestamp, message: impl Into<String>) {
        // O(1): evicts the oldest entry when the ring is full.
        self.entries.push_overwrite(LogEntry {
            timestamp_text: format_timestamp(&at),
            message: message.into(),
        });
    }

    /// Oldest-first copy of the retained lines.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity().get()
    }
}

impl Default for BoundedLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BoundedLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
