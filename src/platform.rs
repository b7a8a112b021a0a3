//! Platform push-permission and token seams.
//!
//! The operating system's permission prompt and push token issuance are
//! external collaborators. The state machine only sees these traits.
//! [`StaticPlatform`] answers from fixed values and backs the headless CLI.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::PlatformError;

/// Push permission as the platform currently reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionStatus {
    /// The user has not been asked yet.
    #[default]
    NotDetermined,
    /// The user refused notifications.
    Denied,
    /// The user allowed notifications.
    Granted,
}

impl PermissionStatus {
    /// Short lowercase label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::NotDetermined => "not determined",
            Self::Denied => "denied",
            Self::Granted => "granted",
        }
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Requests and reads push permission from the platform.
#[async_trait]
pub trait PlatformPermission: Send + Sync {
    /// Ask for permission, prompting the user if the platform requires it.
    async fn request(&self) -> PermissionStatus;

    /// Read the current permission without prompting.
    async fn status(&self) -> PermissionStatus;
}

/// Obtains a push token from the platform.
#[async_trait]
pub trait PlatformRegistration: Send + Sync {
    /// Register with the platform push service and return its token.
    async fn obtain_token(&self) -> Result<String, PlatformError>;
}

/// Platform stand-in with a fixed permission answer and token.
///
/// Reports [`PermissionStatus::NotDetermined`] until the first request.
#[derive(Debug)]
pub struct StaticPlatform {
    permission: PermissionStatus,
    token: Option<String>,
    asked: AtomicBool,
}

impl StaticPlatform {
    /// Grants permission and issues `token`.
    pub fn granted(token: impl Into<String>) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            token: Some(token.into()),
            asked: AtomicBool::new(false),
        }
    }

    /// Denies permission.
    pub fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            token: None,
            asked: AtomicBool::new(false),
        }
    }

    /// Grants permission but fails to issue a token.
    pub fn without_token() -> Self {
        Self {
            permission: PermissionStatus::Granted,
            token: None,
            asked: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PlatformPermission for StaticPlatform {
    async fn request(&self) -> PermissionStatus {
        self.asked.store(true, Ordering::SeqCst);
        self.permission
    }

    async fn status(&self) -> PermissionStatus {
        if self.asked.load(Ordering::SeqCst) {
            self.permission
        } else {
            PermissionStatus::NotDetermined
        }
    }
}

#[async_trait]
impl PlatformRegistration for StaticPlatform {
    async fn obtain_token(&self) -> Result<String, PlatformError> {
        self.token
            .clone()
            .ok_or_else(|| PlatformError("no push token available".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_granted_platform_issues_token() {
        let platform = StaticPlatform::granted("tok");
        assert_eq!(platform.request().await, PermissionStatus::Granted);
        assert_eq!(platform.obtain_token().await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_status_not_determined_until_requested() {
        let platform = StaticPlatform::granted("tok");
        assert_eq!(platform.status().await, PermissionStatus::NotDetermined);

        platform.request().await;
        assert_eq!(platform.status().await, PermissionStatus::Granted);
    }

    #[tokio::test]
    async fn test_denied_platform() {
        let platform = StaticPlatform::denied();
        assert_eq!(platform.request().await, PermissionStatus::Denied);
        assert_eq!(platform.status().await, PermissionStatus::Denied);
        assert!(platform.obtain_token().await.is_err());
    }

    #[tokio::test]
    async fn test_token_failure() {
        let platform = StaticPlatform::without_token();
        assert_eq!(platform.request().await, PermissionStatus::Granted);
        assert_eq!(
            platform.obtain_token().await.unwrap_err(),
            PlatformError("no push token available".into())
        );
    }
}
