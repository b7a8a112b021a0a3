//! Pushline - client-side push notification plumbing.
//!
//! This crate registers a device with a push backend, turns inbound push
//! payloads into a deduplicated, bounded history, and reports usage
//! statistics. Platform permission and token APIs, the backend and identity
//! storage sit behind traits so hosts and tests can swap them.
//!
//! # Architecture
//!
//! - **RegistrationStateMachine** - owns registration state and device identity
//! - **NotificationIntake** - owns history and the dedup store
//! - **StatisticsReporter** - single-flight best-effort reporting
//! - **StatusObservationHub** - relays status events to subscribers
//! - **PushManager** - host-facing facade wiring the above together
//!
//! # Modules
//!
//! - [`registration`] - Registration state machine
//! - [`intake`] - Inbound notification processing
//! - [`server`] - Backend trait and HTTP client
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod dedup;
pub mod events;
pub mod history;
pub mod intake;
pub mod manager;
pub mod observer;
pub mod persistence;
pub mod platform;
pub mod record;
pub mod registration;
pub mod reporter;
pub mod server;
pub mod stats;

pub mod config;
pub mod constants;
pub mod device;
pub mod env;
pub mod error;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use device::{DeviceIdentity, DeviceMetadata};
pub use error::{BackendError, PlatformError, PushError};
pub use events::StatusEvent;
pub use intake::Delivery;
pub use observer::SubscriptionId;
pub use persistence::{FileIdentityStore, IdentityStore, MemoryIdentityStore, PersistedIdentity};
pub use platform::{PermissionStatus, PlatformPermission, PlatformRegistration, StaticPlatform};
pub use record::NotificationRecord;
pub use registration::RegistrationState;
pub use server::{ApiClient, Backend};
pub use stats::StatisticsSnapshot;

// Re-export the facade
pub use manager::{PushManager, PushManagerBuilder};
