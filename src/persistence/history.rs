use super::{HISTORY_KEY, PersistenceError, SCHEMA_VERSION, Storage, check_schema, load_or_default};
use crate::models::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("History entry has no mod id")]
    MissingModId,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Serialize)]
struct HistoryEnvelope<'a> {
    schema: u32,
    entries: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct StoredHistory {
    schema: u32,
    #[serde(default)]
    entries: Vec<HistoryEntry>,
}

/// Append-only, chronological log of detected version transitions.
///
/// Entries are never edited. When a retention limit is configured the oldest
/// entries are evicted on append; without one the ledger grows unbounded.
pub struct HistoryLedger {
    storage: Arc<dyn Storage>,
    entries: Mutex<Vec<HistoryEntry>>,
    limit: Option<usize>,
}

impl HistoryLedger {
    /// Load the ledger; a corrupt value yields an empty ledger plus the error
    pub fn open(storage: Arc<dyn Storage>, limit: Option<usize>) -> (Self, Option<PersistenceError>) {
        let (entries, warning) = load_or_default(storage.as_ref(), HISTORY_KEY, |raw| {
            let stored: StoredHistory = serde_json::from_str(raw).map_err(|e| e.to_string())?;
            check_schema(HISTORY_KEY, stored.schema);
            Ok(stored.entries)
        });

        tracing::info!("Loaded {} history entries", entries.len());

        (
            Self {
                storage,
                entries: Mutex::new(entries),
                limit,
            },
            warning,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append one entry and persist the ledger
    pub fn append(&self, entry: HistoryEntry) -> Result<(), LedgerError> {
        if entry.mod_id().trim().is_empty() {
            return Err(LedgerError::MissingModId);
        }

        let mut current = self.lock();
        let mut next = current.clone();
        next.push(entry);

        if let Some(limit) = self.limit {
            if next.len() > limit {
                let excess = next.len() - limit;
                next.drain(..excess);
                tracing::debug!("Evicted {} oldest history entries", excess);
            }
        }

        let envelope = HistoryEnvelope {
            schema: SCHEMA_VERSION,
            entries: &next,
        };
        let json = serde_json::to_string_pretty(&envelope).map_err(|source| {
            PersistenceError::Serialize {
                key: HISTORY_KEY.to_string(),
                source,
            }
        })?;
        self.storage.save(HISTORY_KEY, &json)?;

        *current = next;
        Ok(())
    }

    /// Every entry, oldest first
    pub fn list_all(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    /// Entries for one mod, oldest first
    pub fn entries_for(&self, mod_id: &str) -> Vec<HistoryEntry> {
        self.lock()
            .iter()
            .filter(|e| e.mod_id() == mod_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
