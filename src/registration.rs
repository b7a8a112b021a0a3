//! Registration state machine.
//!
//! Drives a device from unconfigured to registered with the push backend:
//!
//! ```text
//! NotConfigured ──configure──▶ Configured ──register──▶ Registering ──ok──▶ Registered
//!                                                          │   ▲
//!                                                        error │ retry
//!                                                          ▼   │
//!                                                          Failed
//! ```
//!
//! Every transition is checked against [`can_transition`] and published as
//! [`StatusEvent::StateChanged`]. The `Configured|Failed → Registering`
//! check-and-set happens inside one critical section, so at most one
//! registration flow is in flight. Locks are never held across `.await` or
//! while publishing.
//!
//! # Auto-registration
//!
//! [`RegistrationStateMachine::check_auto_register`] reuses a persisted
//! identity registered under the same app id and base URL. It skips the
//! permission prompt and re-registers the stored token with the backend. A
//! stored identity the backend permanently rejects is cleared from the store.
//!
//! # Permission
//!
//! The last known push permission is cached alongside the state. Each
//! permission request and each [`RegistrationStateMachine::check_permission_status`]
//! refresh publishes [`StatusEvent::PermissionChanged`] when the value moves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Credentials;
use crate::device::{DeviceIdentity, DeviceMetadata};
use crate::error::PushError;
use crate::events::StatusEvent;
use crate::observer::StatusObservationHub;
use crate::persistence::{IdentityStore, PersistedIdentity};
use crate::platform::{PermissionStatus, PlatformPermission, PlatformRegistration};
use crate::server::Backend;
use crate::stats::Counters;

/// Registration lifecycle of this device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegistrationState {
    /// No credentials yet.
    #[default]
    NotConfigured,
    /// Credentials stored, registration not started.
    Configured,
    /// A registration flow is in flight.
    Registering,
    /// The backend issued a device id.
    Registered,
    /// The last registration attempt failed.
    Failed(PushError),
}

impl RegistrationState {
    /// Short lowercase label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not configured",
            Self::Configured => "configured",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether this is a failed state.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Error carried by a failed state.
    pub fn error(&self) -> Option<&PushError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "failed: {err}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Allowed state transitions.
pub fn can_transition(from: &RegistrationState, to: &RegistrationState) -> bool {
    use RegistrationState::{Configured, Failed, NotConfigured, Registered, Registering};

    matches!(
        (from, to),
        (NotConfigured, Configured)
            | (Configured | Failed(_), Registering)
            | (Registering, Registered | Failed(_))
    )
}

#[derive(Debug, Default)]
struct Inner {
    state: RegistrationState,
    credentials: Option<Credentials>,
    identity: Option<DeviceIdentity>,
    last_error: Option<PushError>,
    permission: PermissionStatus,
}

impl Inner {
    /// Check `to` against the transition table and apply it, returning the
    /// previous state.
    fn transition(&mut self, to: RegistrationState) -> Result<RegistrationState, PushError> {
        if !can_transition(&self.state, &to) {
            return Err(PushError::InvalidState {
                operation: to.label(),
                state: self.state.label(),
            });
        }
        Ok(std::mem::replace(&mut self.state, to))
    }
}

/// Owns the registration state and device identity.
pub struct RegistrationStateMachine {
    permission: Arc<dyn PlatformPermission>,
    platform: Arc<dyn PlatformRegistration>,
    backend: Arc<dyn Backend>,
    store: Arc<dyn IdentityStore>,
    hub: Arc<StatusObservationHub>,
    counters: Arc<Counters>,
    metadata: Mutex<DeviceMetadata>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for RegistrationStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationStateMachine")
            .field("inner", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl RegistrationStateMachine {
    /// Create a state machine in `NotConfigured`.
    pub fn new(
        permission: Arc<dyn PlatformPermission>,
        platform: Arc<dyn PlatformRegistration>,
        backend: Arc<dyn Backend>,
        store: Arc<dyn IdentityStore>,
        hub: Arc<StatusObservationHub>,
        counters: Arc<Counters>,
        metadata: DeviceMetadata,
    ) -> Self {
        Self {
            permission,
            platform,
            backend,
            store,
            hub,
            counters,
            metadata: Mutex::new(metadata),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store backend credentials.
    ///
    /// Re-configuring with the same values is a no-op. Different values
    /// after the first successful call are rejected.
    ///
    /// # Errors
    ///
    /// [`PushError::Config`] for blank values, a non-http(s) URL or
    /// conflicting re-configuration.
    pub fn configure(&self, app_id: &str, api_key: &str, base_url: &str) -> Result<(), PushError> {
        let credentials = Credentials::new(app_id, api_key, base_url)?;

        let from = {
            let mut inner = self.lock();
            if let Some(existing) = &inner.credentials {
                if *existing == credentials {
                    log::debug!("[Registration] Already configured for app {}", existing.app_id());
                    return Ok(());
                }
                return Err(PushError::Config(format!(
                    "already configured for app {} at {}",
                    existing.app_id(),
                    existing.base_url()
                )));
            }
            let from = inner.transition(RegistrationState::Configured)?;
            inner.credentials = Some(credentials);
            from
        };

        log::info!("[Registration] Configured for app {}", app_id.trim());
        self.publish_transition(from, RegistrationState::Configured);
        Ok(())
    }

    /// Ask for push permission, obtain a platform token and register it
    /// with the backend.
    ///
    /// Valid from `Configured` or `Failed`. Permission denial stops the
    /// flow before any backend call.
    ///
    /// # Errors
    ///
    /// - [`PushError::Config`] when not configured
    /// - [`PushError::AlreadyInProgress`] while another flow runs
    /// - [`PushError::InvalidState`] when already registered
    /// - the flow's failure, which is also the new `Failed` state
    pub async fn request_permission_and_register(&self) -> Result<DeviceIdentity, PushError> {
        let credentials = self.begin_registering("register", true)?;

        log::info!("[Registration] Requesting push permission");
        let permission = self.permission.request().await;
        self.record_permission(permission);
        if permission != PermissionStatus::Granted {
            log::info!("[Registration] Push permission {permission}");
            return self.fail(PushError::PermissionDenied);
        }

        let token = match self.platform.obtain_token().await {
            Ok(token) => token,
            Err(e) => {
                log::warn!("[Registration] Platform token unavailable: {e}");
                return self.fail(e.into());
            }
        };

        self.register_token(&credentials, token).await
    }

    /// Re-register a persisted identity without prompting for permission.
    ///
    /// Only runs from `Configured`, and only when the store holds an
    /// identity for the same app id and base URL with a device id.
    ///
    /// Returns `Ok(false)` when no attempt was made, `Ok(true)` when the
    /// stored identity was re-registered, and the registration error when
    /// the attempt failed. A non-retryable failure also clears the store so
    /// the next launch does not resubmit a rejected token.
    ///
    /// # Errors
    ///
    /// [`PushError::Config`] when not configured, otherwise the failure of
    /// the re-registration.
    pub async fn check_auto_register(&self) -> Result<bool, PushError> {
        let Some(credentials) = self.credentials() else {
            return Err(PushError::Config("push is not configured".into()));
        };

        let stored = match self.store.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                log::debug!("[Registration] No persisted identity");
                return Ok(false);
            }
            Err(e) => {
                log::warn!("[Registration] Ignoring unreadable identity: {e:#}");
                return Ok(false);
            }
        };

        if !stored.matches(&credentials) {
            log::info!(
                "[Registration] Persisted identity belongs to app {} at {}, ignoring",
                stored.app_id,
                stored.base_url
            );
            return Ok(false);
        }

        if self.current_state() != RegistrationState::Configured {
            return Ok(false);
        }

        let credentials = match self.begin_registering("check_auto_register", false) {
            Ok(credentials) => credentials,
            Err(PushError::InvalidState { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        log::info!(
            "[Registration] Re-registering persisted token {}...",
            stored.identity.token_preview()
        );
        match self
            .register_token(&credentials, stored.identity.device_token().to_string())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if !e.is_retryable() {
                    log::info!("[Registration] Persisted identity rejected, clearing it");
                    if let Err(clear_err) = self.store.clear() {
                        log::warn!("[Registration] Failed to clear identity: {clear_err:#}");
                    }
                }
                Err(e)
            }
        }
    }

    /// Re-submit device metadata for the registered device.
    ///
    /// The state stays `Registered` either way. Success clears the last
    /// error; failure records it.
    ///
    /// # Errors
    ///
    /// [`PushError::InvalidState`] unless registered, otherwise the backend
    /// failure.
    pub async fn update_device_info(&self) -> Result<(), PushError> {
        let (credentials, identity) = {
            let inner = self.lock();
            match (&inner.state, &inner.credentials, &inner.identity) {
                (RegistrationState::Registered, Some(credentials), Some(identity)) => {
                    (credentials.clone(), identity.clone())
                }
                (state, _, _) => {
                    return Err(PushError::InvalidState {
                        operation: "update_device_info",
                        state: state.label(),
                    })
                }
            }
        };

        let metadata = self.metadata();
        match self
            .backend
            .update_device(&credentials, &identity, &metadata)
            .await
        {
            Ok(()) => {
                log::info!("[Registration] Device info updated");
                self.lock().last_error = None;
                self.hub.publish(&StatusEvent::DeviceInfoUpdated);
                Ok(())
            }
            Err(e) => {
                log::warn!("[Registration] Device info update failed: {e}");
                let error = PushError::from(e);
                self.lock().last_error = Some(error.clone());
                self.hub.publish(&StatusEvent::DeviceInfoUpdateFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Read the platform permission without prompting and record it.
    pub async fn check_permission_status(&self) -> PermissionStatus {
        let status = self.permission.status().await;
        self.record_permission(status);
        status
    }

    /// Last known push permission.
    pub fn permission_status(&self) -> PermissionStatus {
        self.lock().permission
    }

    /// Current state.
    pub fn current_state(&self) -> RegistrationState {
        self.lock().state.clone()
    }

    /// Device identity once registered.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.lock().identity.clone()
    }

    /// Most recent registration or device update failure.
    pub fn last_error(&self) -> Option<PushError> {
        self.lock().last_error.clone()
    }

    /// Configured credentials.
    pub fn credentials(&self) -> Option<Credentials> {
        self.lock().credentials.clone()
    }

    /// Metadata sent on registration and device updates.
    pub fn metadata(&self) -> DeviceMetadata {
        self.metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the metadata sent with future requests.
    pub fn set_metadata(&self, metadata: DeviceMetadata) {
        *self.metadata.lock().unwrap_or_else(PoisonError::into_inner) = metadata;
    }

    /// Enter `Registering` if the current state allows `operation`.
    fn begin_registering(
        &self,
        operation: &'static str,
        allow_retry: bool,
    ) -> Result<Credentials, PushError> {
        let (from, credentials) = {
            let mut inner = self.lock();
            let invalid = PushError::InvalidState {
                operation,
                state: inner.state.label(),
            };
            match inner.state {
                RegistrationState::NotConfigured => {
                    return Err(PushError::Config("push is not configured".into()));
                }
                RegistrationState::Registering => return Err(PushError::AlreadyInProgress),
                RegistrationState::Registered => return Err(invalid),
                RegistrationState::Failed(_) if !allow_retry => return Err(invalid),
                RegistrationState::Configured | RegistrationState::Failed(_) => {}
            }
            let credentials = inner
                .credentials
                .clone()
                .ok_or_else(|| PushError::Config("push is not configured".into()))?;
            (inner.transition(RegistrationState::Registering)?, credentials)
        };

        self.counters.record_registration_attempt();
        self.publish_transition(from, RegistrationState::Registering);
        Ok(credentials)
    }

    async fn register_token(
        &self,
        credentials: &Credentials,
        token: String,
    ) -> Result<DeviceIdentity, PushError> {
        let metadata = self.metadata();
        match self
            .backend
            .register_device(credentials, &token, &metadata)
            .await
        {
            Ok(device_id) => {
                let identity = DeviceIdentity::from_token(token).with_device_id(device_id);
                self.complete(credentials, identity)
            }
            Err(e) => {
                log::warn!("[Registration] Backend registration failed: {e}");
                self.fail(e.into())
            }
        }
    }

    fn complete(
        &self,
        credentials: &Credentials,
        identity: DeviceIdentity,
    ) -> Result<DeviceIdentity, PushError> {
        let from = {
            let mut inner = self.lock();
            let from = inner.transition(RegistrationState::Registered)?;
            inner.identity = Some(identity.clone());
            inner.last_error = None;
            from
        };

        log::info!(
            "[Registration] Registered token {}... as device {}",
            identity.token_preview(),
            identity.device_id().unwrap_or_default()
        );

        if let Err(e) = self
            .store
            .save(&PersistedIdentity::new(credentials, identity.clone()))
        {
            log::warn!("[Registration] Failed to persist identity: {e:#}");
        }

        self.publish_transition(from, RegistrationState::Registered);
        Ok(identity)
    }

    fn fail<T>(&self, error: PushError) -> Result<T, PushError> {
        let to = RegistrationState::Failed(error.clone());
        let from = {
            let mut inner = self.lock();
            let from = inner.transition(to.clone())?;
            inner.last_error = Some(error.clone());
            from
        };
        self.publish_transition(from, to);
        Err(error)
    }

    fn record_permission(&self, to: PermissionStatus) {
        let from = std::mem::replace(&mut self.lock().permission, to);
        if from != to {
            log::debug!("[Registration] Permission {from} -> {to}");
            self.hub.publish(&StatusEvent::PermissionChanged { from, to });
        }
    }

    fn publish_transition(&self, from: RegistrationState, to: RegistrationState) {
        log::debug!("[Registration] {} -> {}", from.label(), to.label());
        self.hub.publish(&StatusEvent::StateChanged { from, to });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
