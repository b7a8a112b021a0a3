//! Inbound notification processing.
//!
//! [`NotificationIntake`] turns raw payloads into [`NotificationRecord`]s,
//! suppresses redeliveries by dedup key and keeps the bounded history.
//!
//! # Locking
//!
//! The dedup check and the history append run under the history lock, so
//! concurrent deliveries of the same key cannot both be stored. `clear`
//! empties history and dedup store under the same lock. Events are
//! published after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::dedup::DeduplicationStore;
use crate::error::PushError;
use crate::events::StatusEvent;
use crate::history::NotificationHistory;
use crate::observer::StatusObservationHub;
use crate::record::NotificationRecord;
use crate::stats::Counters;

/// Outcome of [`NotificationIntake::receive`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Record built from the payload.
    pub record: NotificationRecord,
    /// `true` if the record was suppressed and not added to history.
    pub duplicate: bool,
}

/// Owns notification history and the dedup store.
#[derive(Debug)]
pub struct NotificationIntake {
    history: Mutex<NotificationHistory>,
    dedup: DeduplicationStore,
    hub: Arc<StatusObservationHub>,
    counters: Arc<Counters>,
}

impl NotificationIntake {
    /// Create an intake with the given history capacity and dedup retention.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(
        capacity: usize,
        retention: Duration,
        hub: Arc<StatusObservationHub>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            history: Mutex::new(NotificationHistory::new(capacity)),
            dedup: DeduplicationStore::new(retention),
            hub,
            counters,
        }
    }

    /// Process one inbound payload.
    ///
    /// # Errors
    ///
    /// [`PushError::InvalidPayload`] if `payload` is not a JSON object.
    /// Nothing is counted or stored in that case.
    pub fn receive(&self, payload: Value) -> Result<Delivery, PushError> {
        let record = NotificationRecord::from_payload(payload)?;

        let duplicate = {
            let mut history = self.lock();
            let duplicate = record
                .dedup_key()
                .is_some_and(|key| self.dedup.check_and_remember(key));
            if !duplicate {
                if let Some(evicted) = history.push(record.clone()) {
                    log::debug!("[Intake] Evicted {} from history", evicted.identifier());
                }
            }
            duplicate
        };

        self.counters.record_notification();
        if duplicate {
            self.counters.record_duplicate();
            log::info!(
                "[Intake] Suppressed duplicate {} (key {})",
                record.identifier(),
                record.dedup_key().unwrap_or_default()
            );
            self.hub
                .publish(&StatusEvent::DuplicateSuppressed(record.clone()));
        } else {
            log::info!("[Intake] Received {}", record.identifier());
            self.hub
                .publish(&StatusEvent::NotificationReceived(record.clone()));
        }

        Ok(Delivery { record, duplicate })
    }

    /// History snapshot, newest first.
    pub fn history(&self) -> Vec<NotificationRecord> {
        self.lock().snapshot()
    }

    /// Number of records in history.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether history is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Look up a stored record by identifier.
    pub fn find(&self, identifier: &str) -> Option<NotificationRecord> {
        self.lock().find(identifier).cloned()
    }

    /// Empty history and dedup store in one step.
    pub fn clear(&self) {
        {
            let mut history = self.lock();
            history.clear();
            self.dedup.clear();
        }
        log::info!("[Intake] History cleared");
        self.hub.publish(&StatusEvent::HistoryCleared);
    }

    fn lock(&self) -> MutexGuard<'_, NotificationHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
