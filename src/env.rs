//! Runtime environment detection.
//!
//! Provides a single source of truth for determining the runtime environment
//! (test, development, production) based on the `PUSHLINE_ENV` environment
//! variable.
//!
//! # Environment Variable
//!
//! Set `PUSHLINE_ENV` to one of:
//! - `test` - Test mode (config and identity files live under the repo's `tmp/`)
//! - `development` or `dev` - Development mode (debug logging by default)
//! - (anything else or unset) - Production mode

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - file storage under the repo's tmp/ directory.
    Test,
}

impl Environment {
    /// Detect current environment from `PUSHLINE_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::var("PUSHLINE_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Log filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production | Self::Test => "info",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience function to check if running in test mode.
///
/// Equivalent to `Environment::current().is_test()`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}
