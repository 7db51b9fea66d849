//! Client-local credential storage
//!
//! Exactly two opaque strings are persisted, under the well-known keys
//! `crm_access_token` and `crm_refresh_token`. Every write replaces both at once.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "crm_access_token";
/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "crm_refresh_token";

/// Persisted token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(rename = "crm_access_token")]
    pub access_token: String,
    #[serde(rename = "crm_refresh_token")]
    pub refresh_token: String,
}

/// Credential storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Local store for the session's token pair
pub trait CredentialStore: Send + Sync + 'static {
    /// Read the stored pair, if any
    fn load(&self) -> Result<Option<StoredCredentials>, StorageError>;

    /// Replace the stored pair in one step
    fn replace(&self, credentials: &StoredCredentials) -> Result<(), StorageError>;

    /// Remove the stored pair
    fn clear(&self) -> Result<(), StorageError>;
}

/// Credentials kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing pair
    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, StorageError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn replace(&self, credentials: &StoredCredentials) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// Credentials kept in a JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so a
/// reader never sees a half-written pair.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn replace(&self, credentials: &StoredCredentials) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        std::fs::write(&temp, serde_json::to_string_pretty(credentials)?)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
