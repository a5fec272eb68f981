//! Credential storage.
//!
//! Access tokens are stored under the Flickr username, pending request
//! tokens under the request token itself. Production uses one file per
//! key in a directory; tests use the in-memory store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;
use crate::flickr::TokenPair;

/// Key-value store of token pairs.
pub trait CredentialStore: Send + Sync {
    /// All keys, sorted.
    fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Fetch a token pair.
    fn get(&self, key: &str) -> Result<Option<TokenPair>, StoreError>;

    /// Store a token pair, replacing any previous one.
    fn put(&self, key: &str, token: &TokenPair) -> Result<(), StoreError>;

    /// Delete a token pair. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;
}

/// Reject keys that are empty or unsafe as file names. Dotfiles are refused
/// too since [`FileStore`] does not list them.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty() || key.starts_with('.') || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Directory-backed store: one file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`; it is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }
}

impl CredentialStore for FileStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(
                    path = %entry.path().display(),
                    "Skipping non UTF-8 credential file"
                );
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            keys.push(name);
        }
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Option<TokenPair>, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => decode_record(key, &content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, token: &TokenPair) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(token).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, content)?;
        tracing::debug!(path = %path.display(), "Stored credential");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse a record. JSON is what [`FileStore`] writes; plain line records
/// (`token`/`secret`, or `api_key`/`api_secret`/`token`/`secret`) are
/// accepted for files written by hand or by older tooling.
fn decode_record(key: &str, content: &str) -> Result<TokenPair, StoreError> {
    if let Ok(token) = serde_json::from_str::<TokenPair>(content) {
        return Ok(token);
    }

    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    match lines.as_slice() {
        [token, secret] | [_, _, token, secret] => Ok(TokenPair::new(*token, *secret)),
        _ => Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("expected a token/secret record, found {} lines", lines.len()),
        }),
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, TokenPair>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    pub fn with_entries<K: Into<String>>(
        entries: impl IntoIterator<Item = (K, TokenPair)>,
    ) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TokenPair>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn get(&self, key: &str) -> Result<Option<TokenPair>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &str, token: &TokenPair) -> Result<(), StoreError> {
        validate_key(key)?;
        self.lock().insert(key.to_string(), token.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock().remove(key).is_some())
    }
}
