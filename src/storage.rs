//! Persisted key-value storage: search defaults and common-filter history.
//!
//! Values are opaque JSON strings. The defaults live in one blob under
//! `storage.global_key`; legacy key names inside that blob are renamed once
//! when it is loaded.

use crate::condition::SearchMode;
use crate::config::StorageRules;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

mod history;

pub use history::{CommonFilterEntry, CommonFilterHistory};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read storage file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write storage file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Storage file '{path}' is not a JSON object: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Browser-style string key-value store.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// All keys in one JSON object on disk, rewritten on every change.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    /// Open `path`; a missing file starts out empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let path_display = path.display().to_string();

        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                path: path_display,
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StorageError::Read {
                    path: path_display,
                    source,
                });
            }
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, raw).map_err(|source| StorageError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Search defaults remembered between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedDefaults {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub search_mode: Option<SearchMode>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub page_size: Option<u32>,
}

// A stored value of the wrong shape counts as missing rather than poisoning
// the whole blob.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Rename legacy keys in place; returns whether anything changed.
pub fn migrate_legacy_keys(blob: &mut Map<String, Value>, rules: &StorageRules) -> bool {
    let mut changed = false;
    for (old, new) in &rules.legacy_keys {
        let Some(value) = blob.remove(old) else {
            continue;
        };
        changed = true;
        if blob.contains_key(new) {
            debug!(old = %old, new = %new, "dropping legacy key shadowed by current key");
        } else {
            debug!(old = %old, new = %new, "renaming legacy storage key");
            blob.insert(new.clone(), value);
        }
    }
    changed
}

/// Load the defaults blob, migrating legacy keys. Unreadable or corrupt
/// blobs yield an empty object.
pub fn load_global(storage: &mut dyn KeyValueStorage, rules: &StorageRules) -> Map<String, Value> {
    let raw = match storage.get(&rules.global_key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Map::new(),
        Err(err) => {
            warn!(error = %err, "cannot read persisted defaults");
            return Map::new();
        }
    };

    let mut blob = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(blob)) => blob,
        Ok(_) | Err(_) => {
            warn!(key = %rules.global_key, "persisted defaults are not a JSON object, ignoring");
            return Map::new();
        }
    };

    if migrate_legacy_keys(&mut blob, rules) {
        let written = serde_json::to_string(&blob)
            .map_err(StorageError::from)
            .and_then(|raw| storage.set(&rules.global_key, raw));
        if let Err(err) = written {
            warn!(error = %err, "cannot write migrated defaults back");
        }
    }

    blob
}

pub fn load_defaults(storage: &mut dyn KeyValueStorage, rules: &StorageRules) -> PersistedDefaults {
    let blob = load_global(storage, rules);
    serde_json::from_value(Value::Object(blob)).unwrap_or_default()
}

/// Merge `defaults` into the blob, keeping keys owned by other features.
pub fn save_defaults(
    storage: &mut dyn KeyValueStorage,
    rules: &StorageRules,
    defaults: &PersistedDefaults,
) -> Result<(), StorageError> {
    let mut blob = load_global(storage, rules);
    if let Value::Object(update) = serde_json::to_value(defaults)? {
        blob.extend(update);
    }
    storage.set(&rules.global_key, serde_json::to_string(&blob)?)
}
