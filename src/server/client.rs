//! HTTP client for the push backend.
//!
//! This module provides the [`ApiClient`] struct which implements
//! [`Backend`] over the backend's REST API. Every request authenticates with
//! the application API key in the `X-API-Key` header.

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde_json::Value;

use super::types::{self, DeviceRegistrationRequest, StatisticsReport};
use super::Backend;
use crate::config::Credentials;
use crate::constants;
use crate::device::{DeviceIdentity, DeviceMetadata};
use crate::error::BackendError;

/// Endpoint, relative to the app URL, receiving [`StatisticsReport`]s.
pub const USAGE_REPORT_ENDPOINT: &str = "usage/report";

/// API client for the push backend.
///
/// Encapsulates HTTP client configuration. Credentials are passed per call
/// since they belong to the state machine's configuration, not the client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    /// Creates a new API client with the default timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .user_agent(constants::USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    /// Creates an API client with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Reads the response body, turning non-2xx statuses into
    /// [`BackendError::HttpStatus`].
    async fn read_body(response: Response) -> Result<String, BackendError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(BackendError::HttpStatus {
                code: status.as_u16(),
                message: types::error_message(&body),
            })
        }
    }

    /// Parses a success body as JSON; an empty body counts as `null`.
    fn parse_json(body: &str) -> Result<Value, BackendError> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn network_error(err: &reqwest::Error) -> BackendError {
    BackendError::Network(err.to_string())
}

/// `{app_url}/devices/{token}` with the token as one escaped path segment.
fn device_url(credentials: &Credentials, token: &str) -> Result<Url, BackendError> {
    let mut url = Url::parse(&credentials.app_url("devices"))
        .map_err(|e| BackendError::Network(format!("invalid device URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| BackendError::Network("base URL cannot carry a path".into()))?
        .push(token);
    Ok(url)
}

#[async_trait]
impl Backend for ApiClient {
    async fn register_device(
        &self,
        credentials: &Credentials,
        token: &str,
        metadata: &DeviceMetadata,
    ) -> Result<String, BackendError> {
        let url = credentials.app_url("devices");
        let payload = DeviceRegistrationRequest { token, metadata };

        log::debug!("[Backend] POST {url}");
        let response = self
            .client
            .post(&url)
            .header(constants::API_KEY_HEADER, credentials.api_key())
            .json(&payload)
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        let body = Self::read_body(response).await?;
        let device_id = types::device_id_from_response(Self::parse_json(&body)?)?;
        log::info!("[Backend] Device registered with id {device_id}");
        Ok(device_id)
    }

    async fn update_device(
        &self,
        credentials: &Credentials,
        identity: &DeviceIdentity,
        metadata: &DeviceMetadata,
    ) -> Result<(), BackendError> {
        let url = device_url(credentials, identity.device_token())?;

        log::debug!("[Backend] PUT {url}");
        let response = self
            .client
            .put(url)
            .header(constants::API_KEY_HEADER, credentials.api_key())
            .json(metadata)
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        let body = Self::read_body(response).await?;
        types::unwrap_envelope(Self::parse_json(&body)?)?;
        Ok(())
    }

    async fn report_statistics(
        &self,
        credentials: &Credentials,
        report: &StatisticsReport,
    ) -> Result<(), BackendError> {
        let url = credentials.app_url(USAGE_REPORT_ENDPOINT);

        log::debug!("[Backend] POST {url}");
        let response = self
            .client
            .post(&url)
            .header(constants::API_KEY_HEADER, credentials.api_key())
            .json(report)
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        let body = Self::read_body(response).await?;
        types::unwrap_envelope(Self::parse_json(&body)?)?;
        Ok(())
    }
}
