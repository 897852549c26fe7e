//! Credential pair ownership and persistence.
//!
//! [`TokenStore`] is the only holder of the access/refresh pair. It is
//! replaced wholesale under a write lock, so readers never observe one
//! half of a rotation. Durable copies go through a [`TokenStorage`]
//! backend keyed by two configurable names.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::Credentials;

/// Default storage key for the access token.
pub const DEFAULT_ACCESS_TOKEN_KEY: &str = "access_token";

/// Default storage key for the refresh token.
pub const DEFAULT_REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Names under which the two tokens are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub access: String,
    pub refresh: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_TOKEN_KEY.to_string(),
            refresh: DEFAULT_REFRESH_TOKEN_KEY.to_string(),
        }
    }
}

/// Raw persisted values; either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

// ============================================================================
// TokenStorage Trait
// ============================================================================

/// Durable key-value home for the credential pair.
pub trait TokenStorage: Send + Sync + std::fmt::Debug {
    /// Read whatever is persisted.
    fn load(&self) -> Result<PersistedTokens>;

    /// Persist both tokens.
    fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Remove both tokens.
    fn remove(&self) -> Result<()>;
}

// ============================================================================
// FileTokenStorage
// ============================================================================

/// JSON file storage, one entry per storage key.
///
/// Entries under other keys are preserved.
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    keys: StorageKeys,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>, keys: StorageKeys) -> Self {
        Self {
            path: path.into(),
            keys,
        }
    }

    /// Get the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Storage(format!("Failed to read token file: {}", e)))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => Err(Error::Storage(format!(
                "Token file {} is not a JSON object",
                self.path.display()
            ))),
        }
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)
                    .map_err(|e| Error::Storage(format!("Failed to delete token file: {}", e)))?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create token directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::Storage(format!("Failed to write token file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::Storage(format!("Failed to restrict token file: {}", e)))?;
        }

        Ok(())
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<PersistedTokens> {
        let entries = self.read_entries()?;
        let get = |key: &str| {
            entries
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Ok(PersistedTokens {
            access: get(&self.keys.access),
            refresh: get(&self.keys.refresh),
        })
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        // A corrupt file is replaced rather than blocking the login.
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(
            self.keys.access.clone(),
            Value::String(credentials.access.clone()),
        );
        entries.insert(
            self.keys.refresh.clone(),
            Value::String(credentials.refresh.clone()),
        );
        self.write_entries(&entries)?;
        tracing::debug!(path = %self.path.display(), "Tokens persisted");
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let mut entries = self.read_entries().unwrap_or_default();
        entries.remove(&self.keys.access);
        entries.remove(&self.keys.refresh);
        self.write_entries(&entries)
    }
}

// ============================================================================
// MemoryTokenStorage
// ============================================================================

/// Process-local storage; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    tokens: Mutex<PersistedTokens>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with raw values, including half-present ones.
    pub fn with_tokens(tokens: PersistedTokens) -> Self {
        Self {
            tokens: Mutex::new(tokens),
        }
    }

    /// Snapshot of what is currently persisted.
    pub fn snapshot(&self) -> PersistedTokens {
        self.tokens.lock().clone()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<PersistedTokens> {
        Ok(self.snapshot())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.tokens.lock() = PersistedTokens {
            access: Some(credentials.access.clone()),
            refresh: Some(credentials.refresh.clone()),
        };
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.tokens.lock() = PersistedTokens::default();
        Ok(())
    }
}

// ============================================================================
// TokenStore
// ============================================================================

/// Shared token store for use across async contexts.
pub type SharedTokenStore = Arc<TokenStore>;

/// Owner of the credential pair.
///
/// Storage failures are logged and never block the in-memory update: the
/// session keeps working for the lifetime of the process.
#[derive(Debug)]
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    current: RwLock<Option<Credentials>>,
}

impl TokenStore {
    /// Prime the store from persisted state.
    ///
    /// A half-present pair is discarded and wiped from storage.
    pub fn load(storage: Arc<dyn TokenStorage>) -> Self {
        let current = match storage.load() {
            Ok(PersistedTokens {
                access: Some(access),
                refresh: Some(refresh),
            }) => Some(Credentials::new(access, refresh)),
            Ok(PersistedTokens {
                access: None,
                refresh: None,
            }) => None,
            Ok(_) => {
                tracing::warn!("Discarding incomplete persisted token pair");
                if let Err(e) = storage.remove() {
                    tracing::warn!(error = %e, "Failed to wipe incomplete token pair");
                }
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted tokens");
                None
            }
        };

        Self {
            storage,
            current: RwLock::new(current),
        }
    }

    /// Store with no persistence.
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryTokenStorage::new()))
    }

    /// Replace the pair.
    pub fn set(&self, access: impl Into<String>, refresh: impl Into<String>) {
        let credentials = Credentials::new(access, refresh);
        if !credentials.is_complete() {
            tracing::warn!("Refusing to store incomplete token pair; clearing session");
            self.clear();
            return;
        }

        let mut current = self.current.write();
        if let Err(e) = self.storage.save(&credentials) {
            tracing::warn!(error = %e, "Failed to persist tokens");
        }
        *current = Some(credentials);
    }

    /// Swap in a refreshed access token, and the refresh token if it was
    /// rotated.
    ///
    /// Returns `false` without storing anything when no pair is held (the
    /// session was cleared while the refresh was in flight).
    pub fn rotate(&self, access: &str, refresh: Option<&str>) -> bool {
        let mut current = self.current.write();
        let Some(existing) = current.as_ref() else {
            return false;
        };
        if access.is_empty() {
            return false;
        }

        let rotated = Credentials::new(
            access,
            refresh
                .filter(|r| !r.is_empty())
                .unwrap_or(existing.refresh.as_str()),
        );
        if let Err(e) = self.storage.save(&rotated) {
            tracing::warn!(error = %e, "Failed to persist rotated tokens");
        }
        *current = Some(rotated);
        true
    }

    /// Current access token.
    pub fn access(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.access.clone())
    }

    /// Current refresh token.
    pub fn refresh(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.refresh.clone())
    }

    /// Snapshot of the whole pair.
    pub fn credentials(&self) -> Option<Credentials> {
        self.current.read().clone()
    }

    /// Drop both tokens. Idempotent.
    pub fn clear(&self) {
        let mut current = self.current.write();
        if let Err(e) = self.storage.remove() {
            tracing::warn!(error = %e, "Failed to remove persisted tokens");
        }
        *current = None;
    }

    /// Both tokens are present. No expiry inspection happens here.
    pub fn has_valid_tokens(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(Credentials::is_complete)
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
