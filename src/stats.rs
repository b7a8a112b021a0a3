//! Usage counters shared by registration, intake and the reporter.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic usage counters.
///
/// Written by the state machine (attempts) and intake (received, duplicates);
/// read by the [`StatisticsReporter`](crate::reporter::StatisticsReporter).
/// Counters are cumulative for the process lifetime and never reset by a
/// report, so a dropped report loses nothing.
#[derive(Debug, Default)]
pub struct Counters {
    registration_attempts: AtomicU64,
    notifications_received: AtomicU64,
    duplicates_suppressed: AtomicU64,
}

impl Counters {
    /// Count one entry into `Registering`.
    pub fn record_registration_attempt(&self) {
        self.registration_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one accepted inbound notification, duplicate or not.
    pub fn record_notification(&self) {
        self.notifications_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one notification suppressed as a duplicate.
    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            registration_attempts: self.registration_attempts.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            taken_at: Utc::now(),
        }
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Times a registration flow was started.
    pub registration_attempts: u64,
    /// Inbound notifications accepted, including duplicates.
    pub notifications_received: u64,
    /// Inbound notifications suppressed as duplicates.
    pub duplicates_suppressed: u64,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}
