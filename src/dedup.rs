//! Time-bounded set of recently seen dedup keys.
//!
//! Push providers may deliver the same logical notification more than once
//! (foreground and background paths, provider retransmits). Each delivery
//! carrying a dedup key is checked against this store; keys are forgotten
//! once the retention window has passed.
//!
//! Expiry is lazy: a stale entry is discarded when it is looked up, and the
//! whole map is pruned whenever a new key is inserted. No background task
//! is involved.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_DEDUP_RETENTION;

/// A remembered dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    /// The dedup key.
    pub key: String,
    /// When the key was first seen within the current window.
    pub seen_at: Instant,
}

/// Concurrent dedup key store with a fixed retention window.
///
/// All operations take an internal lock, so `check_and_remember` is atomic:
/// two concurrent calls with the same new key never both report "not seen".
#[derive(Debug)]
pub struct DeduplicationStore {
    entries: Mutex<HashMap<String, Instant>>,
    retention: Duration,
}

impl Default for DeduplicationStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_RETENTION)
    }
}

impl DeduplicationStore {
    /// Create a store that remembers keys for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Configured retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Whether `key` was seen within the retention window.
    pub fn seen(&self, key: &str) -> bool {
        self.seen_at(key, Instant::now())
    }

    /// Record `key` as seen now. An existing live entry keeps its original
    /// timestamp so the window is measured from the first delivery.
    pub fn remember(&self, key: &str) {
        self.remember_at(key, Instant::now());
    }

    /// Atomically check and record `key`. Returns `true` if it was already
    /// present (a duplicate), `false` if it was newly remembered.
    pub fn check_and_remember(&self, key: &str) -> bool {
        self.check_and_remember_at(key, Instant::now())
    }

    /// [`seen`](Self::seen) against an explicit clock reading.
    pub fn seen_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        self.live_entry(&mut entries, key, now).is_some()
    }

    /// [`remember`](Self::remember) against an explicit clock reading.
    pub fn remember_at(&self, key: &str, now: Instant) {
        self.check_and_remember_at(key, now);
    }

    /// [`check_and_remember`](Self::check_and_remember) against an explicit
    /// clock reading.
    pub fn check_and_remember_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        if self.live_entry(&mut entries, key, now).is_some() {
            return true;
        }
        self.prune(&mut entries, now);
        entries.insert(key.to_string(), now);
        false
    }

    /// Live entries, oldest first.
    pub fn entries(&self) -> Vec<DedupEntry> {
        let now = Instant::now();
        let mut entries = self.lock();
        self.prune(&mut entries, now);
        let mut out: Vec<DedupEntry> = entries
            .iter()
            .map(|(key, seen_at)| DedupEntry {
                key: key.clone(),
                seen_at: *seen_at,
            })
            .collect();
        out.sort_by_key(|e| e.seen_at);
        out
    }

    /// Number of stored keys, including any not yet lazily expired.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, seen_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(seen_at) >= self.retention
    }

    fn live_entry(
        &self,
        entries: &mut HashMap<String, Instant>,
        key: &str,
        now: Instant,
    ) -> Option<Instant> {
        let seen_at = *entries.get(key)?;
        if self.is_expired(seen_at, now) {
            entries.remove(key);
            None
        } else {
            Some(seen_at)
        }
    }

    fn prune(&self, entries: &mut HashMap<String, Instant>, now: Instant) {
        entries.retain(|_, seen_at| !self.is_expired(*seen_at, now));
    }
}
