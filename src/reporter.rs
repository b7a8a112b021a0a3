//! Best-effort usage statistics reporting.
//!
//! [`StatisticsReporter::report_now`] snapshots the shared [`Counters`] and
//! submits them with the current device identity. Failed reports are dropped,
//! never queued or retried; the counters are cumulative, so the next report
//! carries everything the dropped one would have.
//!
//! # Single flight
//!
//! Concurrent `report_now` calls collapse into one request. The first caller
//! spawns the submission as its own task and parks a [`Shared`] handle to it
//! in the in-flight slot; callers arriving before it resolves await a clone
//! and receive the same result. The task clears the slot itself when it
//! finishes, so a caller that times out or is dropped never leaves a stale
//! request behind. The slot is tagged with a generation number so a task
//! only clears its own request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::events::StatusEvent;
use crate::observer::StatusObservationHub;
use crate::registration::RegistrationStateMachine;
use crate::server::{Backend, StatisticsReport};
use crate::stats::{Counters, StatisticsSnapshot};

type ReportResult = Result<StatisticsSnapshot, PushError>;
type InFlight = Shared<BoxFuture<'static, ReportResult>>;
type Slot = Mutex<Option<(u64, InFlight)>>;

/// Submits counter snapshots to the backend.
pub struct StatisticsReporter {
    backend: Arc<dyn Backend>,
    registration: Arc<RegistrationStateMachine>,
    counters: Arc<Counters>,
    hub: Arc<StatusObservationHub>,
    in_flight: Arc<Slot>,
    generation: AtomicU64,
}

impl std::fmt::Debug for StatisticsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsReporter")
            .field("in_flight", &self.is_in_flight())
            .finish_non_exhaustive()
    }
}

impl StatisticsReporter {
    /// Create a reporter reading identity and credentials from
    /// `registration`.
    pub fn new(
        backend: Arc<dyn Backend>,
        registration: Arc<RegistrationStateMachine>,
        counters: Arc<Counters>,
        hub: Arc<StatusObservationHub>,
    ) -> Self {
        Self {
            backend,
            registration,
            counters,
            hub,
            in_flight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Submit the current counters, joining a request already in flight.
    ///
    /// # Errors
    ///
    /// [`PushError::Statistics`] when the report could not be delivered.
    /// A [`StatusEvent::StatisticsDropped`] is published once per failed
    /// request, not once per caller.
    pub async fn report_now(&self) -> ReportResult {
        let request = {
            let mut slot = lock(&self.in_flight);
            if let Some((_, request)) = slot.as_ref() {
                log::debug!("[Statistics] Joining in-flight report");
                request.clone()
            } else {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let task = tokio::spawn(run(
                    generation,
                    Arc::clone(&self.in_flight),
                    Arc::clone(&self.backend),
                    Arc::clone(&self.registration),
                    Arc::clone(&self.counters),
                    Arc::clone(&self.hub),
                ));
                let request = task
                    .map(|joined| {
                        joined.unwrap_or_else(|e| {
                            Err(PushError::Statistics(format!("report task failed: {e}")))
                        })
                    })
                    .boxed()
                    .shared();
                *slot = Some((generation, request.clone()));
                request
            }
        };

        request.await
    }

    /// Whether a report is currently in flight.
    pub fn is_in_flight(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Report every `interval` until `cancel` fires.
    ///
    /// The first report goes out one interval after the call. Failures are
    /// already logged and published by `report_now`, so the loop just
    /// continues.
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            log::info!("[Statistics] Periodic reporting every {}s", interval.as_secs());
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        log::info!("[Statistics] Periodic reporting stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let _ = self.report_now().await;
                    }
                }
            }
        })
    }
}

fn lock(slot: &Slot) -> MutexGuard<'_, Option<(u64, InFlight)>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Submit one report, then release the in-flight slot if it still holds
/// this generation.
async fn run(
    generation: u64,
    slot: Arc<Slot>,
    backend: Arc<dyn Backend>,
    registration: Arc<RegistrationStateMachine>,
    counters: Arc<Counters>,
    hub: Arc<StatusObservationHub>,
) -> ReportResult {
    let result = submit(backend, registration, counters, hub).await;

    let mut slot = lock(&slot);
    if slot.as_ref().is_some_and(|(current, _)| *current == generation) {
        *slot = None;
    }
    result
}

async fn submit(
    backend: Arc<dyn Backend>,
    registration: Arc<RegistrationStateMachine>,
    counters: Arc<Counters>,
    hub: Arc<StatusObservationHub>,
) -> ReportResult {
    let snapshot = counters.snapshot();

    let outcome = match registration.credentials() {
        Some(credentials) => {
            let identity = registration.identity();
            let report = StatisticsReport::new(&snapshot, identity.as_ref());
            backend
                .report_statistics(&credentials, &report)
                .await
                .map_err(|e| PushError::Statistics(e.to_string()))
        }
        None => Err(PushError::Statistics("push is not configured".into())),
    };

    match outcome {
        Ok(()) => {
            log::debug!(
                "[Statistics] Reported {} received, {} duplicates, {} attempts",
                snapshot.notifications_received,
                snapshot.duplicates_suppressed,
                snapshot.registration_attempts
            );
            hub.publish(&StatusEvent::StatisticsReported(snapshot.clone()));
            Ok(snapshot)
        }
        Err(error) => {
            log::warn!("[Statistics] Report dropped: {error}");
            hub.publish(&StatusEvent::StatisticsDropped {
                error: error.clone(),
            });
            Err(error)
        }
    }
}
