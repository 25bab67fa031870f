//! Durable key-value state for the tracker.
//!
//! Three logical keys are stored through the [`Storage`] trait:
//! - [`TRACKED_MODS_KEY`]: the tracked set ([`TrackedSetStore`])
//! - [`HISTORY_KEY`]: the change history ([`HistoryLedger`])
//! - [`TRACKING_SETTINGS_KEY`]: tracking settings ([`SettingsStore`])
//!
//! Every value is JSON wrapped in a versioned envelope (`{"schema": 1, ...}`).
//! A missing key loads as the default value; a corrupt key loads as the
//! default value plus a [`PersistenceError`] that the caller reports as a
//! warning. Loading never fails startup.

pub mod history;
pub mod settings;
pub mod tracked_set;

pub use history::{HistoryLedger, LedgerError};
pub use settings::SettingsStore;
pub use tracked_set::{TrackedSetStore, canonicalize};

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use thiserror::Error;

pub const TRACKED_MODS_KEY: &str = "tracked_mods";
pub const HISTORY_KEY: &str = "history";
pub const TRACKING_SETTINGS_KEY: &str = "tracking_settings";

/// Current envelope schema written by this build
pub const SCHEMA_VERSION: u32 = 1;

/// Errors reading or writing persisted state
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read stored value for {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write stored value for {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored value for {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Failed to serialize value for {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub fn key(&self) -> &str {
        match self {
            PersistenceError::Read { key, .. }
            | PersistenceError::Write { key, .. }
            | PersistenceError::Corrupt { key, .. }
            | PersistenceError::Serialize { key, .. } => key,
        }
    }
}

/// Key-value string storage that survives process restarts
pub trait Storage: Send + Sync {
    /// Read the raw value for `key`, or `None` if it was never written
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Replace the value for `key` as a whole
    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// One JSON file per key under a state directory.
///
/// Writes go to `<key>.json.tmp` first and are renamed over `<key>.json`, so
/// a crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: Utf8PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a state directory
    pub fn new<P: AsRef<Utf8Path>>(dir: P) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| PersistenceError::Write {
                key: dir.to_string(),
                source,
            })?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> Utf8PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| PersistenceError::Read {
                key: key.to_string(),
                source,
            })
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!("{key}.json.tmp"));
        let write_err = |source| PersistenceError::Write {
            key: key.to_string(),
            source,
        };

        fs::write(&tmp_path, value).map_err(write_err)?;
        fs::rename(&tmp_path, &path).map_err(write_err)?;

        tracing::debug!("Saved {} ({} bytes) to {}", key, value.len(), path);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| PersistenceError::Write {
                key: key.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Volatile storage for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing any envelope
    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Load and decode a key, falling back to `T::default()` when it is missing
/// or unreadable. The error, if any, is returned alongside for reporting.
pub(crate) fn load_or_default<T, F>(
    storage: &dyn Storage,
    key: &str,
    decode: F,
) -> (T, Option<PersistenceError>)
where
    T: Default,
    F: FnOnce(&str) -> Result<T, String>,
{
    let raw = match storage.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return (T::default(), None),
        Err(e) => {
            tracing::warn!("{}, using defaults", e);
            return (T::default(), Some(e));
        }
    };

    match decode(&raw) {
        Ok(value) => (value, None),
        Err(reason) => {
            let error = PersistenceError::Corrupt {
                key: key.to_string(),
                reason,
            };
            tracing::warn!("{}, using defaults", error);
            (T::default(), Some(error))
        }
    }
}

/// Warn when state was written by a newer build; it is still read
/// best-effort since unknown fields are ignored.
pub(crate) fn check_schema(key: &str, schema: u32) {
    if schema > SCHEMA_VERSION {
        tracing::warn!(
            "{} was written with schema {} (this build writes {}), reading known fields only",
            key,
            schema,
            SCHEMA_VERSION
        );
    }
}
