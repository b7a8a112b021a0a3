//! Wire types for the push backend API.
//!
//! This module defines the request bodies sent to the backend and the
//! decoding of its responses. Responses come either wrapped in the
//! `{code, message, data}` envelope or as the bare data object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{DeviceIdentity, DeviceMetadata};
use crate::error::BackendError;
use crate::stats::StatisticsSnapshot;

/// Body of `POST /apps/{app_id}/devices`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRegistrationRequest<'a> {
    /// Platform push token.
    pub token: &'a str,
    /// Device description.
    #[serde(flatten)]
    pub metadata: &'a DeviceMetadata,
}

/// Counter block inside a statistics report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsCounters {
    /// Registration flows started.
    pub registration_attempts: u64,
    /// Notifications accepted.
    pub notifications_received: u64,
    /// Notifications suppressed as duplicates.
    pub duplicates_suppressed: u64,
}

/// Body of `POST /apps/{app_id}/usage/report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsReport {
    /// Platform token of the reporting device, if registered.
    pub device_token: Option<String>,
    /// Backend device id, if registered.
    pub device_id: Option<String>,
    /// Counter values.
    pub statistics: StatisticsCounters,
    /// Snapshot time.
    pub reported_at: DateTime<Utc>,
}

impl StatisticsReport {
    /// Build a report from a counter snapshot and the current identity.
    pub fn new(snapshot: &StatisticsSnapshot, identity: Option<&DeviceIdentity>) -> Self {
        Self {
            device_token: identity.map(|i| i.device_token().to_string()),
            device_id: identity.and_then(|i| i.device_id().map(str::to_string)),
            statistics: StatisticsCounters {
                registration_attempts: snapshot.registration_attempts,
                notifications_received: snapshot.notifications_received,
                duplicates_suppressed: snapshot.duplicates_suppressed,
            },
            reported_at: snapshot.taken_at,
        }
    }
}

/// Response envelope used by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    /// Business status code: `0` or `2xx` mean success.
    pub code: i64,
    /// Optional message.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Option<Value>,
}

impl ApiEnvelope {
    /// Whether the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.code == 0 || (200..300).contains(&self.code)
    }
}

/// Unwrap the envelope if present, returning the data object.
///
/// A failed envelope inside a 2xx HTTP response is a validation failure
/// and is reported as HTTP 422.
pub fn unwrap_envelope(body: Value) -> Result<Value, BackendError> {
    let is_envelope = body.get("code").is_some_and(Value::is_i64);
    if !is_envelope {
        return Ok(body);
    }

    let envelope: ApiEnvelope =
        serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    if envelope.is_success() {
        Ok(envelope.data.unwrap_or(Value::Null))
    } else {
        Err(BackendError::HttpStatus {
            code: 422,
            message: envelope.message.unwrap_or_default(),
        })
    }
}

/// Extract the backend device id from a registration response body.
///
/// Accepts `device.id`, `id` or `device_id`, as a number or a string.
pub fn device_id_from_response(body: Value) -> Result<String, BackendError> {
    let data = unwrap_envelope(body)?;
    let candidate = data
        .get("device")
        .and_then(|d| d.get("id"))
        .or_else(|| data.get("id"))
        .or_else(|| data.get("device_id"));

    match candidate {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(BackendError::Decode(
            "registration response has no device id".into(),
        )),
    }
}

/// Extract the message from an error response body, falling back to the
/// raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_id_from_envelope() {
        let body = json!({
            "code": 201,
            "message": "created",
            "data": {"device": {"id": 42, "token": "t"}, "gateway": {"host": "g", "port": 5003, "ssl": false}}
        });
        assert_eq!(device_id_from_response(body).unwrap(), "42");
    }

    #[test]
    fn test_device_id_from_bare_body() {
        assert_eq!(
            device_id_from_response(json!({"device": {"id": "d-42"}})).unwrap(),
            "d-42"
        );
        assert_eq!(device_id_from_response(json!({"device_id": "d-7"})).unwrap(), "d-7");
    }

    #[test]
    fn test_failed_envelope_is_validation_error() {
        let err = device_id_from_response(json!({"code": 1, "message": "bundle id mismatch"}))
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::HttpStatus {
                code: 422,
                message: "bundle id mismatch".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_device_id_is_decode_error() {
        let err = device_id_from_response(json!({"code": 0, "data": {}})).unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[test]
    fn test_registration_request_flattens_metadata() {
        let metadata = DeviceMetadata::detect("com.example");
        let body = serde_json::to_value(DeviceRegistrationRequest {
            token: "tok",
            metadata: &metadata,
        })
        .unwrap();
        assert_eq!(body["token"], "tok");
        assert_eq!(body["bundle_id"], "com.example");
        assert!(body.get("metadata").is_none());
    }

    #[test]
    fn test_statistics_report_from_snapshot() {
        let snapshot = StatisticsSnapshot {
            registration_attempts: 2,
            notifications_received: 5,
            duplicates_suppressed: 1,
            taken_at: Utc::now(),
        };
        let identity = DeviceIdentity::from_token("tok").with_device_id("d-1");
        let report = StatisticsReport::new(&snapshot, Some(&identity));
        assert_eq!(report.device_token.as_deref(), Some("tok"));
        assert_eq!(report.device_id.as_deref(), Some("d-1"));
        assert_eq!(report.statistics.notifications_received, 5);

        let anonymous = StatisticsReport::new(&snapshot, None);
        assert!(anonymous.device_token.is_none());
    }

    #[test]
    fn test_statistics_report_wire_shape() {
        let snapshot = StatisticsSnapshot {
            registration_attempts: 1,
            notifications_received: 3,
            duplicates_suppressed: 2,
            taken_at: Utc::now(),
        };
        let body = serde_json::to_value(StatisticsReport::new(&snapshot, None)).unwrap();

        assert_eq!(
            body["statistics"],
            json!({
                "registration_attempts": 1,
                "notifications_received": 3,
                "duplicates_suppressed": 2
            })
        );
        assert!(body["device_token"].is_null());
        assert!(body["reported_at"].is_string());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"code":401,"message":"invalid key"}"#), "invalid key");
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }
}
