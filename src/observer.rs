//! Synchronous publish/subscribe hub for status events.
//!
//! The hub owns no state besides its subscriber list. `publish` runs every
//! current subscriber on the caller's thread, in subscription order. A
//! subscriber that returns an error or panics is logged and skipped; the
//! remaining subscribers still run.
//!
//! Publishing iterates a snapshot of the subscriber list, so a handler may
//! subscribe or unsubscribe (itself included) without deadlocking. Such
//! changes take effect from the next `publish`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::StatusEvent;

/// Subscriber callback.
pub type EventHandler = Arc<dyn Fn(&StatusEvent) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by [`StatusObservationHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Relays [`StatusEvent`]s to subscribers.
#[derive(Default)]
pub struct StatusObservationHub {
    subscribers: Mutex<Vec<(SubscriptionId, EventHandler)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for StatusObservationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusObservationHub")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl StatusObservationHub {
    /// Create a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for all future events.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StatusEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscriber. Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Deliver `event` to every current subscriber, in subscription order.
    pub fn publish(&self, event: &StatusEvent) {
        let snapshot: Vec<(SubscriptionId, EventHandler)> = self
            .lock()
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();

        log::debug!(
            "[Observer] Publishing {} to {} subscriber(s)",
            event.name(),
            snapshot.len()
        );

        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("[Observer] Subscriber {:?} failed on {}: {e:#}", id, event.name());
                }
                Err(_) => {
                    log::warn!("[Observer] Subscriber {:?} panicked on {}", id, event.name());
                }
            }
        }
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, EventHandler)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
