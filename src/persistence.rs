//! Persisted device identity.
//!
//! After a successful registration the identity is written to
//! `identity.json` in the config directory together with the app id and base
//! URL it was registered under. On the next launch
//! [`check_auto_register`](crate::registration::RegistrationStateMachine::check_auto_register)
//! reads it back and re-registers without prompting for permission.
//!
//! A stored identity is only reused when app id and base URL match the
//! current configuration; switching apps starts from scratch.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::fs;

use crate::config::{Config, Credentials};
use crate::device::DeviceIdentity;

const IDENTITY_FILE: &str = "identity.json";

/// Identity as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentity {
    /// App id the identity was registered under.
    pub app_id: String,
    /// Base URL the identity was registered against.
    pub base_url: String,
    /// Token and backend device id.
    pub identity: DeviceIdentity,
    /// When the identity was saved.
    pub saved_at: DateTime<Utc>,
}

impl PersistedIdentity {
    /// Snapshot `identity` for the given credentials.
    pub fn new(credentials: &Credentials, identity: DeviceIdentity) -> Self {
        Self {
            app_id: credentials.app_id().to_string(),
            base_url: credentials.base_url().to_string(),
            identity,
            saved_at: Utc::now(),
        }
    }

    /// Whether this record can be reused with `credentials`.
    pub fn matches(&self, credentials: &Credentials) -> bool {
        self.app_id == credentials.app_id()
            && self.base_url == credentials.base_url()
            && self.identity.is_registered()
    }
}

/// Storage for the last registered identity.
pub trait IdentityStore: Send + Sync {
    /// Load the stored identity, if any.
    fn load(&self) -> Result<Option<PersistedIdentity>>;

    /// Replace the stored identity.
    fn save(&self, identity: &PersistedIdentity) -> Result<()>;

    /// Forget the stored identity.
    fn clear(&self) -> Result<()>;
}

/// JSON file store, owner read/write only.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Store `identity.json` inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(IDENTITY_FILE),
        }
    }

    /// Store inside the pushline config directory.
    pub fn in_config_dir() -> Result<Self> {
        Ok(Self::new(Config::config_dir()?))
    }

    /// Path of the identity file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<PersistedIdentity>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).context("Failed to read identity file")?;
        let stored = serde_json::from_str(&content).context("Failed to parse identity file")?;
        Ok(Some(stored))
    }

    fn save(&self, identity: &PersistedIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create identity directory")?;
        }
        let content =
            serde_json::to_string_pretty(identity).context("Failed to serialize identity")?;
        fs::write(&self.path, content).context("Failed to write identity file")?;

        #[cfg(unix)]
        {
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .context("Failed to set identity file permissions")?;
        }

        log::debug!("[Identity] Saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove identity file"),
        }
    }
}

/// In-process store for tests and embedders without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    stored: Mutex<Option<PersistedIdentity>>,
}

impl MemoryIdentityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `identity`.
    pub fn with_identity(identity: PersistedIdentity) -> Self {
        Self {
            stored: Mutex::new(Some(identity)),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<PersistedIdentity>> {
        Ok(self
            .stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, identity: &PersistedIdentity) -> Result<()> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
