//! Device identity and metadata.
//!
//! This module handles:
//! - The platform token / backend device id pair that identifies a
//!   registered endpoint
//! - Device metadata submitted on registration and on info updates
//!
//! The identity type enforces that a backend device id can only be attached
//! after a platform token exists.

use serde::{Deserialize, Serialize};

/// Platform token plus backend-issued device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    device_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
}

impl DeviceIdentity {
    /// Identity for a freshly issued platform token, not yet known to the
    /// backend.
    pub fn from_token(device_token: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            device_id: None,
        }
    }

    /// Attach the backend-issued device id.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Platform-issued push token.
    pub fn device_token(&self) -> &str {
        &self.device_token
    }

    /// Backend-issued device id, once backend registration succeeded.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Whether the backend has acknowledged this device.
    pub fn is_registered(&self) -> bool {
        self.device_id.is_some()
    }

    /// Token shortened for log lines.
    pub fn token_preview(&self) -> &str {
        let end = self
            .device_token
            .char_indices()
            .nth(12)
            .map_or(self.device_token.len(), |(i, _)| i);
        &self.device_token[..end]
    }
}

/// Device description sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// Host application bundle identifier.
    pub bundle_id: String,
    /// Platform name (`ios`, `android`, `linux`, ...).
    pub platform: String,
    /// Push delivery channel (`apns`, `fcm`, ...).
    pub channel: String,
    /// Hardware vendor.
    pub brand: String,
    /// Hardware model or host name.
    pub model: String,
    /// Operating system version.
    pub system_version: String,
    /// Host application version.
    pub app_version: String,
    /// User agent of the embedding application.
    pub user_agent: String,
    /// Preferred language, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Time zone identifier, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl DeviceMetadata {
    /// Metadata describing the current host, using `bundle_id` for the
    /// embedding application.
    pub fn detect(bundle_id: &str) -> Self {
        let model = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            bundle_id: bundle_id.to_string(),
            platform: std::env::consts::OS.to_string(),
            channel: default_channel(std::env::consts::OS).to_string(),
            brand: std::env::consts::ARCH.to_string(),
            model,
            system_version: std::env::consts::FAMILY.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            user_agent: crate::constants::USER_AGENT.to_string(),
            language: std::env::var("LANG")
                .ok()
                .and_then(|lang| lang.split('.').next().map(str::to_string))
                .filter(|lang| !lang.is_empty()),
            timezone: std::env::var("TZ").ok().filter(|tz| !tz.is_empty()),
        }
    }
}

fn default_channel(os: &str) -> &'static str {
    match os {
        "ios" | "macos" => "apns",
        "android" => "fcm",
        _ => "webpush",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_token_has_no_device_id() {
        let identity = DeviceIdentity::from_token("tok-123");
        assert_eq!(identity.device_token(), "tok-123");
        assert_eq!(identity.device_id(), None);
        assert!(!identity.is_registered());
    }

    #[test]
    fn test_attach_device_id() {
        let identity = DeviceIdentity::from_token("tok").with_device_id("d-42");
        assert_eq!(identity.device_id(), Some("d-42"));
        assert!(identity.is_registered());
    }

    #[test]
    fn test_token_preview_truncates() {
        let identity = DeviceIdentity::from_token("0123456789abcdef0123");
        assert_eq!(identity.token_preview(), "0123456789ab");
        assert_eq!(DeviceIdentity::from_token("short").token_preview(), "short");
    }

    #[test]
    fn test_identity_serialization_omits_missing_id() {
        let json = serde_json::to_string(&DeviceIdentity::from_token("t")).unwrap();
        assert_eq!(json, r#"{"device_token":"t"}"#);
    }

    #[test]
    fn test_detect_fills_required_fields() {
        let meta = DeviceMetadata::detect("com.example.app");
        assert_eq!(meta.bundle_id, "com.example.app");
        assert_eq!(meta.platform, std::env::consts::OS);
        assert!(!meta.model.is_empty());
        assert!(meta.user_agent.starts_with("pushline/"));
    }

    #[test]
    fn test_default_channel_by_platform() {
        assert_eq!(default_channel("ios"), "apns");
        assert_eq!(default_channel("android"), "fcm");
        assert_eq!(default_channel("linux"), "webpush");
    }
}
