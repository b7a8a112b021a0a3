//! Received notification records.
//!
//! A [`NotificationRecord`] is built once per inbound push and never mutated.
//! Display fields and the dedup key are pulled out of the raw payload by
//! convention keys; the payload itself is kept verbatim.
//!
//! # Convention keys
//!
//! | Field | Keys, in priority order |
//! |---|---|
//! | title | `title`, `aps.alert.title` |
//! | content | `content`, `body`, `aps.alert.body`, `aps.alert` (string) |
//! | dedup key | `dedup_key`, `dedupKey` |

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PushError;

/// One received push notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    identifier: String,
    title: Option<String>,
    content: Option<String>,
    payload: Map<String, Value>,
    dedup_key: Option<String>,
    received_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Build a record from a raw payload, stamping it with a fresh identifier
    /// and the current time.
    pub fn from_payload(payload: Value) -> Result<Self, PushError> {
        match payload {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(PushError::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Build a record from an already-validated key-value payload.
    pub fn from_map(payload: Map<String, Value>) -> Self {
        let alert = payload
            .get("aps")
            .and_then(|aps| aps.get("alert"));

        let title = string_field(&payload, "title")
            .or_else(|| alert.and_then(|a| a.get("title")).and_then(non_empty));
        let content = string_field(&payload, "content")
            .or_else(|| string_field(&payload, "body"))
            .or_else(|| alert.and_then(|a| a.get("body")).and_then(non_empty))
            .or_else(|| alert.and_then(non_empty));
        let dedup_key =
            string_field(&payload, "dedup_key").or_else(|| string_field(&payload, "dedupKey"));

        Self {
            identifier: uuid::Uuid::new_v4().to_string(),
            title,
            content,
            payload,
            dedup_key,
            received_at: Utc::now(),
        }
    }

    /// Unique identifier assigned at receipt.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Display title, if the payload carried one.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Display body, if the payload carried one.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// The payload exactly as delivered.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Key identifying retransmissions of the same logical notification.
    pub fn dedup_key(&self) -> Option<&str> {
        self.dedup_key.as_deref()
    }

    /// When the notification was received.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(non_empty)
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
