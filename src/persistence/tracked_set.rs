use super::{PersistenceError, SCHEMA_VERSION, Storage, TRACKED_MODS_KEY, check_schema, load_or_default};
use crate::models::{ModSummary, compare_ids};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Serialize)]
struct TrackedSetEnvelope<'a> {
    schema: u32,
    mods: &'a [ModSummary],
}

/// Accepted on-disk shapes: the current envelope, or the bare array written
/// before the envelope existed.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTrackedSet {
    Versioned {
        schema: u32,
        #[serde(default)]
        mods: Vec<ModSummary>,
    },
    Legacy(Vec<ModSummary>),
}

/// De-duplicate by id (last write wins) and sort by numeric id.
pub fn canonicalize<I>(mods: I) -> Vec<ModSummary>
where
    I: IntoIterator<Item = ModSummary>,
{
    let mut by_id: IndexMap<String, ModSummary> = IndexMap::new();
    for summary in mods {
        by_id.insert(summary.id.clone(), summary);
    }

    let mut canonical: Vec<ModSummary> = by_id.into_values().collect();
    canonical.sort_by(|a, b| compare_ids(&a.id, &b.id));
    canonical
}

/// Durable, canonically ordered set of tracked mods.
///
/// Every mutation builds the complete new set, writes it through the
/// [`Storage`] as a whole and only then swaps it into memory. A failed write
/// leaves both the stored and the in-memory set untouched. The internal lock
/// is held across the write, so concurrent callers (a poll cycle and a user
/// edit) are applied one after another rather than overwriting each other.
pub struct TrackedSetStore {
    storage: Arc<dyn Storage>,
    mods: Mutex<Vec<ModSummary>>,
}

impl TrackedSetStore {
    /// Load the tracked set from storage.
    ///
    /// Returns the store together with the error that forced a fallback to
    /// an empty set, if the stored value was unreadable.
    pub fn open(storage: Arc<dyn Storage>) -> (Self, Option<PersistenceError>) {
        let (mods, warning) = load_or_default(storage.as_ref(), TRACKED_MODS_KEY, |raw| {
            match serde_json::from_str::<StoredTrackedSet>(raw).map_err(|e| e.to_string())? {
                StoredTrackedSet::Versioned { schema, mods } => {
                    check_schema(TRACKED_MODS_KEY, schema);
                    Ok(canonicalize(mods))
                }
                StoredTrackedSet::Legacy(mods) => {
                    tracing::info!("Upgrading legacy tracked set ({} mods)", mods.len());
                    Ok(canonicalize(mods))
                }
            }
        });

        tracing::info!("Loaded {} tracked mods", mods.len());

        (
            Self {
                storage,
                mods: Mutex::new(mods),
            },
            warning,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ModSummary>> {
        self.mods.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, mods: &[ModSummary]) -> Result<(), PersistenceError> {
        let envelope = TrackedSetEnvelope {
            schema: SCHEMA_VERSION,
            mods,
        };
        let json = serde_json::to_string_pretty(&envelope).map_err(|source| {
            PersistenceError::Serialize {
                key: TRACKED_MODS_KEY.to_string(),
                source,
            }
        })?;
        self.storage.save(TRACKED_MODS_KEY, &json)
    }

    /// Replace the whole set and return it in canonical form
    pub fn replace_all(&self, mods: Vec<ModSummary>) -> Result<Vec<ModSummary>, PersistenceError> {
        let mut current = self.lock();
        let canonical = canonicalize(mods);
        self.persist(&canonical)?;
        *current = canonical.clone();
        Ok(canonical)
    }

    /// Edit the set in place under the store lock.
    ///
    /// `edit_fn` sees the current set and may change, add or drop entries.
    /// The result is canonicalized and persisted before anyone else can read
    /// or write the set, so a concurrent [`update_existing`](Self::update_existing)
    /// is either visible to `edit_fn` or applied after it, never lost.
    /// Returns the closure's value and the new set size.
    pub fn modify<F, R>(&self, edit_fn: F) -> Result<(R, usize), PersistenceError>
    where
        F: FnOnce(&mut Vec<ModSummary>) -> R,
    {
        let mut current = self.lock();
        let mut next = current.clone();
        let output = edit_fn(&mut next);
        let canonical = canonicalize(next);
        self.persist(&canonical)?;
        let len = canonical.len();
        *current = canonical;
        Ok((output, len))
    }

    /// Insert or replace one mod by id
    pub fn upsert(&self, summary: ModSummary) -> Result<(), PersistenceError> {
        let mut current = self.lock();
        let next = canonicalize(current.iter().cloned().chain(std::iter::once(summary)));
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    /// Replace one mod only if it is still tracked.
    ///
    /// Poll cycles use this so a mod removed while its version was being
    /// fetched does not come back.
    pub fn update_existing(&self, summary: ModSummary) -> Result<bool, PersistenceError> {
        let mut current = self.lock();
        let Some(index) = current.iter().position(|m| m.id == summary.id) else {
            return Ok(false);
        };

        let mut next = current.clone();
        next[index] = summary;
        self.persist(&next)?;
        *current = next;
        Ok(true)
    }

    /// Remove one mod by id; returns whether it was tracked
    pub fn remove(&self, id: &str) -> Result<bool, PersistenceError> {
        let mut current = self.lock();
        if !current.iter().any(|m| m.id == id) {
            return Ok(false);
        }

        let next: Vec<ModSummary> = current.iter().filter(|m| m.id != id).cloned().collect();
        self.persist(&next)?;
        *current = next;
        Ok(true)
    }

    /// Drop every tracked mod
    pub fn clear(&self) -> Result<(), PersistenceError> {
        let mut current = self.lock();
        self.persist(&[])?;
        current.clear();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<ModSummary> {
        self.lock().iter().find(|m| m.id == id).cloned()
    }

    /// Snapshot of the whole set in canonical order
    pub fn all(&self) -> Vec<ModSummary> {
        self.lock().clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().iter().map(|m| m.id.clone()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().iter().any(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
