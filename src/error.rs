//! Error taxonomy for registration, intake and reporting.
//!
//! [`PushError`] is what every host-facing operation returns. It is `Clone`
//! so that a failed registration can carry it inside
//! [`RegistrationState::Failed`](crate::registration::RegistrationState) and
//! so that callers sharing one in-flight statistics report all receive the
//! same outcome.
//!
//! [`BackendError`] is produced by [`Backend`](crate::server::Backend)
//! implementations and classified into retryable/permanent before it becomes
//! a [`PushError::Registration`].

/// Errors surfaced to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Invalid or conflicting configuration.
    Config(String),
    /// The user denied push permission for this attempt.
    PermissionDenied,
    /// Backend registration or device update failed.
    Registration {
        /// Whether re-invoking registration can succeed without reconfiguring.
        retryable: bool,
        /// Human-readable failure reason.
        reason: String,
    },
    /// A registration flow is already running.
    AlreadyInProgress,
    /// Opaque failure from the platform permission/token APIs.
    Platform(String),
    /// Operation is not valid in the current registration state.
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// Label of the state the machine was in.
        state: &'static str,
    },
    /// Inbound notification payload could not be interpreted.
    InvalidPayload(String),
    /// Best-effort statistics report failed and was dropped.
    Statistics(String),
}

impl PushError {
    /// Returns `true` if a host-initiated retry of the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Registration { retryable, .. } => *retryable,
            Self::Statistics(_) | Self::Platform(_) => true,
            _ => false,
        }
    }

    /// Short sentence suitable for rendering next to a `Failed` status.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => "Push is not configured correctly; check app id, key and URL".into(),
            Self::PermissionDenied => "Enable notifications for this app in system settings".into(),
            Self::Registration { retryable: true, .. } => {
                "Push service is unreachable right now; try again later".into()
            }
            Self::Registration { retryable: false, .. } => {
                "The push service rejected this app's credentials".into()
            }
            Self::AlreadyInProgress => "Registration is already in progress".into(),
            Self::Platform(msg) => format!("The device could not provide a push token: {msg}"),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::PermissionDenied => write!(f, "Push permission denied"),
            Self::Registration { retryable, reason } => {
                let kind = if *retryable { "retryable" } else { "permanent" };
                write!(f, "Registration failed ({kind}): {reason}")
            }
            Self::AlreadyInProgress => write!(f, "Registration already in progress"),
            Self::Platform(msg) => write!(f, "Platform error: {msg}"),
            Self::InvalidState { operation, state } => {
                write!(f, "Cannot {operation} while {state}")
            }
            Self::InvalidPayload(msg) => write!(f, "Invalid notification payload: {msg}"),
            Self::Statistics(msg) => write!(f, "Statistics report dropped: {msg}"),
        }
    }
}

impl std::error::Error for PushError {}

/// Failure reported by the platform permission or token APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError(pub String);

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PlatformError {}

impl From<PlatformError> for PushError {
    fn from(err: PlatformError) -> Self {
        Self::Platform(err.0)
    }
}

/// Errors from a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Transport failure (DNS, connect, timeout, reset).
    Network(String),
    /// Server answered with a non-success status.
    HttpStatus {
        /// HTTP status code.
        code: u16,
        /// Message extracted from the response body, if any.
        message: String,
    },
    /// Response body was missing or malformed.
    Decode(String),
}

impl BackendError {
    /// Transient failures: transport, 5xx, 408, 429 and undecodable bodies.
    /// Other 4xx mean the app id or key is wrong and need reconfiguration.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Decode(_) => true,
            Self::HttpStatus { code, .. } => *code >= 500 || *code == 408 || *code == 429,
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::HttpStatus { code, message } if message.is_empty() => write!(f, "HTTP {code}"),
            Self::HttpStatus { code, message } => write!(f, "HTTP {code}: {message}"),
            Self::Decode(msg) => write!(f, "Invalid response: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for PushError {
    fn from(err: BackendError) -> Self {
        Self::Registration {
            retryable: err.is_retryable(),
            reason: err.to_string(),
        }
    }
}
