//! Host-facing facade.
//!
//! [`PushManager`] wires the state machine, intake, reporter and observation
//! hub around shared counters. Construct one per process with
//! [`PushManager::builder`] and pass it where it is needed.
//!
//! # Example
//!
//! ```no_run
//! use pushline::{PushManager, StaticPlatform};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PushManager::builder()
//!     .platform(StaticPlatform::granted("token"))
//!     .build()?;
//! manager.configure("app1", "key1", "https://push.example/api/v1")?;
//! if !manager.check_auto_register().await? {
//!     manager.register().await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Credentials};
use crate::constants::{DEFAULT_DEDUP_RETENTION, DEFAULT_HISTORY_CAPACITY, DEFAULT_REPORT_INTERVAL};
use crate::device::{DeviceIdentity, DeviceMetadata};
use crate::error::PushError;
use crate::events::StatusEvent;
use crate::intake::{Delivery, NotificationIntake};
use crate::observer::{StatusObservationHub, SubscriptionId};
use crate::persistence::{IdentityStore, MemoryIdentityStore};
use crate::platform::{PermissionStatus, PlatformPermission, PlatformRegistration};
use crate::record::NotificationRecord;
use crate::registration::{RegistrationState, RegistrationStateMachine};
use crate::reporter::StatisticsReporter;
use crate::server::{ApiClient, Backend};
use crate::stats::{Counters, StatisticsSnapshot};

/// Push client for one host application.
#[derive(Debug)]
pub struct PushManager {
    hub: Arc<StatusObservationHub>,
    counters: Arc<Counters>,
    registration: Arc<RegistrationStateMachine>,
    intake: NotificationIntake,
    reporter: Arc<StatisticsReporter>,
    report_interval: Duration,
}

impl PushManager {
    /// Start building a manager.
    pub fn builder() -> PushManagerBuilder {
        PushManagerBuilder::default()
    }

    // ─── Registration ───

    /// Store backend credentials. See
    /// [`RegistrationStateMachine::configure`].
    pub fn configure(&self, app_id: &str, api_key: &str, base_url: &str) -> Result<(), PushError> {
        self.registration.configure(app_id, api_key, base_url)
    }

    /// Re-register a persisted identity if one matches the configuration.
    pub async fn check_auto_register(&self) -> Result<bool, PushError> {
        self.registration.check_auto_register().await
    }

    /// Request permission and register this device.
    pub async fn register(&self) -> Result<DeviceIdentity, PushError> {
        self.registration.request_permission_and_register().await
    }

    /// Re-submit device metadata for the registered device.
    pub async fn update_device_info(&self) -> Result<(), PushError> {
        self.registration.update_device_info().await
    }

    /// Last known push permission.
    pub fn permission_status(&self) -> PermissionStatus {
        self.registration.permission_status()
    }

    /// Re-read push permission from the platform without prompting.
    pub async fn check_permission_status(&self) -> PermissionStatus {
        self.registration.check_permission_status().await
    }

    /// Current registration state.
    pub fn state(&self) -> RegistrationState {
        self.registration.current_state()
    }

    /// Registered device identity.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.registration.identity()
    }

    /// Most recent registration or device update failure.
    pub fn last_error(&self) -> Option<PushError> {
        self.registration.last_error()
    }

    /// Configured credentials.
    pub fn credentials(&self) -> Option<Credentials> {
        self.registration.credentials()
    }

    /// Replace the device metadata sent with future requests.
    pub fn set_metadata(&self, metadata: DeviceMetadata) {
        self.registration.set_metadata(metadata);
    }

    // ─── Intake ───

    /// Process one inbound notification payload.
    pub fn receive(&self, payload: Value) -> Result<Delivery, PushError> {
        self.intake.receive(payload)
    }

    /// Notification history, newest first.
    pub fn history(&self) -> Vec<NotificationRecord> {
        self.intake.history()
    }

    /// Look up a stored notification.
    pub fn find_notification(&self, identifier: &str) -> Option<NotificationRecord> {
        self.intake.find(identifier)
    }

    /// Empty history and dedup store.
    pub fn clear_history(&self) {
        self.intake.clear();
    }

    // ─── Statistics ───

    /// Current counter values.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.counters.snapshot()
    }

    /// Submit statistics now, joining an in-flight report.
    pub async fn report_statistics(&self) -> Result<StatisticsSnapshot, PushError> {
        self.reporter.report_now().await
    }

    /// Report statistics at the configured interval until `cancel` fires.
    pub fn start_periodic_reporting(&self, cancel: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.reporter).spawn_periodic(self.report_interval, cancel)
    }

    // ─── Observation ───

    /// Subscribe to status events.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StatusEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hub.subscribe(handler)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }
}

/// Builder for [`PushManager`].
#[derive(Default)]
pub struct PushManagerBuilder {
    permission: Option<Arc<dyn PlatformPermission>>,
    registration: Option<Arc<dyn PlatformRegistration>>,
    backend: Option<Arc<dyn Backend>>,
    store: Option<Arc<dyn IdentityStore>>,
    metadata: Option<DeviceMetadata>,
    bundle_id: Option<String>,
    history_capacity: Option<usize>,
    dedup_retention: Option<Duration>,
    report_interval: Option<Duration>,
}

impl std::fmt::Debug for PushManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushManagerBuilder")
            .field("history_capacity", &self.history_capacity)
            .field("dedup_retention", &self.dedup_retention)
            .field("report_interval", &self.report_interval)
            .finish_non_exhaustive()
    }
}

impl PushManagerBuilder {
    /// Use one value for both the permission and the token seam.
    pub fn platform<P>(mut self, platform: P) -> Self
    where
        P: PlatformPermission + PlatformRegistration + 'static,
    {
        let platform = Arc::new(platform);
        self.permission = Some(Arc::clone(&platform) as Arc<dyn PlatformPermission>);
        self.registration = Some(platform);
        self
    }

    /// Permission seam.
    pub fn permission(mut self, permission: Arc<dyn PlatformPermission>) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Token seam.
    pub fn token_source(mut self, registration: Arc<dyn PlatformRegistration>) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Backend implementation. Defaults to [`ApiClient`].
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Identity store. Defaults to an in-memory store.
    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Device metadata. Defaults to [`DeviceMetadata::detect`].
    pub fn metadata(mut self, metadata: DeviceMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Maximum history length.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity);
        self
    }

    /// Dedup retention window.
    pub fn dedup_retention(mut self, retention: Duration) -> Self {
        self.dedup_retention = Some(retention);
        self
    }

    /// Periodic reporting interval.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Take capacity, retention, interval and bundle id from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.history_capacity = Some(config.history_capacity());
        self.dedup_retention = Some(config.dedup_retention());
        self.report_interval = Some(config.report_interval());
        self.bundle_id = Some(config.bundle_id.clone());
        self
    }

    /// Assemble the manager.
    ///
    /// # Errors
    ///
    /// [`PushError::Config`] if no platform was supplied, the history
    /// capacity or dedup retention is zero, or the default HTTP client
    /// cannot be created.
    pub fn build(self) -> Result<PushManager, PushError> {
        let (Some(permission), Some(registration)) = (self.permission, self.registration) else {
            return Err(PushError::Config("no platform permission/token source supplied".into()));
        };

        let capacity = self.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY);
        if capacity == 0 {
            return Err(PushError::Config("history capacity must be at least 1".into()));
        }
        let retention = self.dedup_retention.unwrap_or(DEFAULT_DEDUP_RETENTION);
        if retention.is_zero() {
            return Err(PushError::Config("dedup retention must be non-zero".into()));
        }

        let backend: Arc<dyn Backend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(
                ApiClient::new().map_err(|e| PushError::Config(format!("HTTP client: {e}")))?,
            ),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryIdentityStore::new()));
        let metadata = self.metadata.unwrap_or_else(|| {
            DeviceMetadata::detect(self.bundle_id.as_deref().unwrap_or("com.pushline.host"))
        });

        let hub = Arc::new(StatusObservationHub::new());
        let counters = Arc::new(Counters::default());

        let state_machine = Arc::new(RegistrationStateMachine::new(
            permission,
            registration,
            Arc::clone(&backend),
            store,
            Arc::clone(&hub),
            Arc::clone(&counters),
            metadata,
        ));
        let intake = NotificationIntake::new(
            capacity,
            retention,
            Arc::clone(&hub),
            Arc::clone(&counters),
        );
        let reporter = Arc::new(StatisticsReporter::new(
            backend,
            Arc::clone(&state_machine),
            Arc::clone(&counters),
            Arc::clone(&hub),
        ));

        Ok(PushManager {
            hub,
            counters,
            registration: state_machine,
            intake,
            reporter,
            report_interval: self.report_interval.unwrap_or(DEFAULT_REPORT_INTERVAL),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StaticPlatform;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_build_requires_platform() {
        assert!(matches!(
            PushManager::builder().build(),
            Err(PushError::Config(_))
        ));
    }

    #[test]
    fn test_build_rejects_zero_capacity() {
        let result = PushManager::builder()
            .platform(StaticPlatform::granted("tok"))
            .history_capacity(0)
            .build();
        assert!(matches!(result, Err(PushError::Config(_))));
    }

    #[test]
    fn test_build_rejects_zero_dedup_retention() {
        let result = PushManager::builder()
            .platform(StaticPlatform::granted("tok"))
            .dedup_retention(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(PushError::Config(_))));
    }

    #[test]
    fn test_zero_retention_in_config_still_deduplicates() {
        let config = Config {
            dedup_retention_secs: 0,
            ..Config::default()
        };
        let manager = PushManager::builder()
            .platform(StaticPlatform::granted("tok"))
            .with_config(&config)
            .build()
            .unwrap();

        assert!(!manager.receive(json!({"dedup_key": "k1"})).unwrap().duplicate);
        assert!(manager.receive(json!({"dedup_key": "k1"})).unwrap().duplicate);
    }

    #[test]
    fn test_with_config_applies_limits() {
        let config = Config {
            history_capacity: 2,
            bundle_id: "com.example.cfg".into(),
            ..Config::default()
        };
        let manager = PushManager::builder()
            .platform(StaticPlatform::granted("tok"))
            .with_config(&config)
            .build()
            .unwrap();

        for i in 0..4 {
            manager.receive(json!({"title": i.to_string()})).unwrap();
        }
        assert_eq!(manager.history().len(), 2);
        assert_eq!(manager.report_interval, Duration::from_secs(300));
        assert_eq!(manager.registration.metadata().bundle_id, "com.example.cfg");
    }

    #[test]
    fn test_subscribe_sees_intake_events() {
        let manager = PushManager::builder()
            .platform(StaticPlatform::granted("tok"))
            .build()
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = {
            let seen = Arc::clone(&seen);
            manager.subscribe(move |event| {
                seen.lock().unwrap().push(event.name());
                Ok(())
            })
        };

        manager.receive(json!({"dedup_key": "k1"})).unwrap();
        manager.receive(json!({"dedup_key": "k1"})).unwrap();
        manager.clear_history();
        assert!(manager.unsubscribe(id));
        manager.receive(json!({})).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["notification_received", "duplicate_suppressed", "history_cleared"]
        );
        assert_eq!(manager.statistics().notifications_received, 3);
    }

    #[tokio::test]
    async fn test_denied_register_reports_permission_change() {
        let manager = PushManager::builder()
            .platform(StaticPlatform::denied())
            .build()
            .unwrap();
        manager.configure("app1", "key1", "https://x/api/v1").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            manager.subscribe(move |event| {
                seen.lock().unwrap().push(event.to_string());
                Ok(())
            });
        }

        assert_eq!(manager.permission_status(), PermissionStatus::NotDetermined);
        assert_eq!(manager.register().await.unwrap_err(), PushError::PermissionDenied);

        assert_eq!(manager.permission_status(), PermissionStatus::Denied);
        assert_eq!(
            manager.check_permission_status().await,
            PermissionStatus::Denied
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "configured -> registering".to_string(),
                "permission not determined -> denied".to_string(),
                "registering -> failed".to_string(),
            ]
        );
    }

    #[test]
    fn test_initial_state() {
        let manager = PushManager::builder()
            .platform(StaticPlatform::denied())
            .build()
            .unwrap();
        assert_eq!(manager.state(), RegistrationState::NotConfigured);
        assert!(manager.identity().is_none());
        assert!(manager.last_error().is_none());

        manager.configure("app1", "key1", "https://x/api/v1").unwrap();
        assert_eq!(manager.state(), RegistrationState::Configured);
        assert_eq!(manager.credentials().unwrap().app_id(), "app1");
    }
}
