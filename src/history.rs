//! Fixed-capacity notification history.
//!
//! Records are kept newest first. When the history is full, pushing a new
//! record evicts the oldest one from the back. Memory is bounded at
//! `capacity` records regardless of delivery volume.

use std::collections::VecDeque;

use crate::constants::DEFAULT_HISTORY_CAPACITY;
use crate::record::NotificationRecord;

/// Bounded, newest-first list of received notifications.
#[derive(Debug, Clone)]
pub struct NotificationHistory {
    records: VecDeque<NotificationRecord>,
    capacity: usize,
}

impl Default for NotificationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl NotificationHistory {
    /// Create an empty history holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "NotificationHistory capacity must be > 0");
        Self {
            records: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    /// Insert `record` at the head, returning the evicted oldest record if
    /// the history was full.
    pub fn push(&mut self, record: NotificationRecord) -> Option<NotificationRecord> {
        self.records.push_front(record);
        if self.records.len() > self.capacity {
            self.records.pop_back()
        } else {
            None
        }
    }

    /// Copy of all records, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.records.iter().cloned().collect()
    }

    /// Look up a record by identifier.
    pub fn find(&self, identifier: &str) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| r.identifier() == identifier)
    }

    /// The most recently received record.
    pub fn latest(&self) -> Option<&NotificationRecord> {
        self.records.front()
    }

    /// Current number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Discard all records without changing capacity.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Configured maximum number of records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
