//! Push backend communication.
//!
//! The [`Backend`] trait is the seam between the registration state machine
//! and the network. [`ApiClient`] is the HTTP implementation; tests swap in
//! fakes.
//!
//! # Endpoints
//!
//! - `POST {base}/apps/{app_id}/devices`: register a device token
//! - `PUT {base}/apps/{app_id}/devices/{token}`: update device metadata
//! - `POST {base}/apps/{app_id}/usage/report`: pushline usage counters
//!
//! The first two follow the DooPush device API. The usage endpoint is
//! pushline's own: its body carries cumulative client counters rather than
//! per-push click/open events, so it is not the backend's push statistics
//! route.

pub mod client;
pub mod types;

use async_trait::async_trait;

pub use client::ApiClient;
pub use types::StatisticsReport;

use crate::config::Credentials;
use crate::device::{DeviceIdentity, DeviceMetadata};
use crate::error::BackendError;

/// Remote push backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Register a platform token with its metadata; returns the backend
    /// device id.
    async fn register_device(
        &self,
        credentials: &Credentials,
        token: &str,
        metadata: &DeviceMetadata,
    ) -> Result<String, BackendError>;

    /// Re-submit metadata for an already registered device.
    async fn update_device(
        &self,
        credentials: &Credentials,
        identity: &DeviceIdentity,
        metadata: &DeviceMetadata,
    ) -> Result<(), BackendError>;

    /// Submit one statistics report.
    async fn report_statistics(
        &self,
        credentials: &Credentials,
        report: &StatisticsReport,
    ) -> Result<(), BackendError>;
}
