//! Integration tests for the tracked-set store and history ledger
//!
//! These tests verify:
//! - Canonical ordering and de-duplication for arbitrary inputs
//! - Reload from disk yields the same set
//! - History retention and per-mod filtering

use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};
use modwatch::models::{HistoryEntry, ModSummary, compare_ids};
use modwatch::persistence::{HistoryLedger, TRACKED_MODS_KEY, TrackedSetStore, canonicalize};
use modwatch::{FileStorage, MemoryStorage, Storage};
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn file_storage() -> (Arc<dyn Storage>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().join("state")).unwrap();
    (Arc::new(FileStorage::new(&dir).unwrap()), temp_dir)
}

fn entry(id: &str, from: &str, to: &str, minute: u32) -> HistoryEntry {
    let before = ModSummary::new(id, format!("Mod {id}")).with_package_version(from);
    let after = ModSummary::new(id, format!("Mod {id}")).with_package_version(to);
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap();
    HistoryEntry::from_transition(&before, &after, at)
}

proptest! {
    #[test]
    fn canonical_set_is_sorted_and_unique(raw_ids in prop::collection::vec(0u32..50, 0..40)) {
        let mods: Vec<ModSummary> = raw_ids
            .iter()
            .enumerate()
            .map(|(i, id)| ModSummary::new(id.to_string(), format!("v{i}")))
            .collect();

        let canonical = canonicalize(mods);

        for pair in canonical.windows(2) {
            prop_assert_eq!(compare_ids(&pair[0].id, &pair[1].id), std::cmp::Ordering::Less);
        }

        let mut expected: Vec<u32> = raw_ids.clone();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(canonical.len(), expected.len());

        // Last write wins
        for summary in &canonical {
            let last_index = raw_ids
                .iter()
                .rposition(|id| id.to_string() == summary.id)
                .unwrap();
            prop_assert_eq!(&summary.name, &format!("v{last_index}"));
        }
    }

    #[test]
    fn canonicalize_is_idempotent(raw_ids in prop::collection::vec("[0-9]{1,4}|[a-z]{1,3}", 0..20)) {
        let mods: Vec<ModSummary> = raw_ids.iter().map(|id| ModSummary::new(id.as_str(), "x")).collect();

        let once = canonicalize(mods);
        let twice = canonicalize(once.clone());

        prop_assert_eq!(once, twice);
    }
}

#[test]
fn test_tracked_set_survives_reload() {
    let (storage, _temp_dir) = file_storage();

    let (store, _) = TrackedSetStore::open(Arc::clone(&storage));
    store
        .replace_all(vec![
            ModSummary::new("300", "C").with_package_version("1.0"),
            ModSummary::new("20", "B"),
            ModSummary::new("1", "A").with_compatibility_version("~3.9"),
        ])
        .unwrap();

    let (reopened, warning) = TrackedSetStore::open(storage);
    assert!(warning.is_none());
    assert_eq!(reopened.ids(), vec!["1", "20", "300"]);
    assert_eq!(reopened.get("300").unwrap().package_version.as_deref(), Some("1.0"));
}

#[test]
fn test_legacy_bare_array_is_read() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new().with_value(
        TRACKED_MODS_KEY,
        r#"[{"id":"9","name":"Nine","packageVersion":"2.0"},{"id":"3","name":"Three"}]"#,
    ));

    let (store, warning) = TrackedSetStore::open(storage);

    assert!(warning.is_none());
    assert_eq!(store.ids(), vec!["3", "9"]);
}

#[test]
fn test_history_retention_and_filtering() {
    let (storage, _temp_dir) = file_storage();
    let (ledger, _) = HistoryLedger::open(Arc::clone(&storage), Some(3));

    ledger.append(entry("1", "1.0", "1.1", 0)).unwrap();
    ledger.append(entry("2", "2.0", "2.1", 1)).unwrap();
    ledger.append(entry("1", "1.1", "1.2", 2)).unwrap();
    ledger.append(entry("1", "1.2", "1.3", 3)).unwrap();

    let all = ledger.list_all();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].mod_id(), "2");

    let (reopened, _) = HistoryLedger::open(storage, Some(3));
    let for_one: Vec<_> = reopened
        .entries_for("1")
        .into_iter()
        .map(|e| e.new_package_version.unwrap())
        .collect();
    assert_eq!(for_one, vec!["1.2", "1.3"]);
}
