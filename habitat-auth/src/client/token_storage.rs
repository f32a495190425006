use crate::error::AuthError;
use chrono::{serde::ts_seconds_option, DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Name of the persisted access credential
pub const ACCESS_CREDENTIAL: &str = "access_token";
/// Name of the persisted refresh credential
pub const REFRESH_CREDENTIAL: &str = "refresh_token";

/// Named credential storage that outlives the process.
///
/// Entries past their expiry are reported as absent.
pub trait CredentialStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>, AuthError>;

    fn set(
        &self,
        name: &str,
        value: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AuthError>;

    fn remove(&self, name: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    value: String,
    #[serde(with = "ts_seconds_option", default)]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredCredential {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// Credential store backed by a JSON file readable only by the owner
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Store at `<cache dir>/habitat/credentials.json`
    pub fn new() -> Result<Self, AuthError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find cache directory".to_string()))?
            .join("habitat");
        Self::at(cache_dir.join("credentials.json"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    AuthError::Storage(format!("Failed to create credential directory: {}", e))
                })?;
            }
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, StoredCredential>, AuthError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let json = fs::read_to_string(&self.path)
            .map_err(|e| AuthError::Storage(format!("Failed to read credentials: {}", e)))?;

        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, entries: &HashMap<String, StoredCredential>) -> Result<(), AuthError> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|e| {
                    AuthError::Storage(format!("Failed to delete credentials: {}", e))
                })?;
            }
            return Ok(());
        }

        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)
            .map_err(|e| AuthError::Storage(format!("Failed to save credentials: {}", e)))?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.path)
                .map_err(|e| {
                    AuthError::Storage(format!("Failed to get file permissions: {}", e))
                })?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms).map_err(|e| {
                AuthError::Storage(format!("Failed to set file permissions: {}", e))
            })?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, name: &str) -> Result<Option<String>, AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;

        match entries.get(name) {
            Some(entry) if entry.is_live(Utc::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                tracing::debug!(credential = name, "Dropping expired credential");
                entries.remove(name);
                self.save(&entries)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(
        &self,
        name: &str,
        value: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        entries.insert(
            name.to_string(),
            StoredCredential {
                value: value.to_string(),
                expires_at,
            },
        );
        self.save(&entries)
    }

    fn remove(&self, name: &str) -> Result<(), AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        if entries.remove(name).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// In-process credential store, for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw view of an entry, ignoring expiry
    pub fn peek(&self, name: &str) -> Option<(String, Option<DateTime<Utc>>)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| (entry.value.clone(), entry.expires_at))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, name: &str) -> Result<Option<String>, AuthError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(name) {
            Some(entry) if entry.is_live(Utc::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(name);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(
        &self,
        name: &str,
        value: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AuthError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                StoredCredential {
                    value: value.to_string(),
                    expires_at,
                },
            );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), AuthError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}
