use super::catalog::CatalogSource;
use crate::metrics::Metrics;
use crate::models::{CycleReport, HistoryEntry, ModSummary, VersionRecord};
use crate::persistence::{HistoryLedger, TrackedSetStore};
use crate::state::StateManager;
use chrono::Utc;

/// Result of comparing a stored summary against the catalog's latest version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDiff {
    /// Nothing new, or the catalog omitted the fields
    Unchanged,
    /// A field that was unknown is now known; no transition to record
    Baseline(ModSummary),
    /// A known value changed; the updated summary is attached
    Changed(ModSummary),
}

/// Compare package and compatibility versions.
///
/// A value missing from the catalog response is unknown, never a change.
/// A value missing from the stored summary but present in the response is a
/// baseline. Only a present value replaced by a different present value
/// counts as a change.
pub fn diff_versions(stored: &ModSummary, latest: &VersionRecord) -> VersionDiff {
    let mut updated = stored.clone();
    let mut changed = false;
    let mut baselined = false;

    let fields = [
        (&mut updated.package_version, &latest.version),
        (&mut updated.compatibility_version, &latest.compatibility_constraint),
    ];

    for (current, fetched) in fields {
        let Some(fetched) = fetched else { continue };
        if current.as_ref() == Some(fetched) {
            continue;
        }

        if current.is_some() {
            changed = true;
        } else {
            baselined = true;
        }
        *current = Some(fetched.clone());
    }

    if changed {
        VersionDiff::Changed(updated)
    } else if baselined {
        VersionDiff::Baseline(updated)
    } else {
        VersionDiff::Unchanged
    }
}

/// Run one poll cycle over a snapshot of the tracked set.
///
/// Mods are processed one after another. A fetch or persistence failure is
/// logged, counted and skipped; the cycle always finishes and always returns
/// a report. Transitions are appended to the ledger before the store is
/// updated, and a `ChangeDetected` event is emitted for each.
pub async fn run_poll_cycle<C: CatalogSource>(
    catalog: &C,
    store: &TrackedSetStore,
    ledger: &HistoryLedger,
    state: &StateManager,
    metrics: &Metrics,
) -> CycleReport {
    let snapshot = store.all();
    let mut report = CycleReport::default();

    tracing::info!("Poll cycle started for {} mods", snapshot.len());

    for stored in snapshot {
        state.set_loading_mod(Some(stored.id.clone()));

        let latest = match catalog.latest_version(&stored.id).await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!("Skipping {} ({}): {}", stored.display_name(), stored.id, e);
                report.errors += 1;
                metrics.record_fetch_error();
                continue;
            }
        };

        report.checked += 1;
        metrics.record_mod_checked();

        let Some(latest) = latest else {
            tracing::debug!("{} has no published versions", stored.id);
            continue;
        };

        match diff_versions(&stored, &latest) {
            VersionDiff::Unchanged => {
                tracing::debug!("{} unchanged", stored.display_name());
            }
            VersionDiff::Baseline(updated) => match store.update_existing(updated) {
                Ok(_) => {
                    tracing::debug!("Recorded first known version of {}", stored.display_name());
                    report.baselined += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to store baseline for {}: {}", stored.id, e);
                    report.errors += 1;
                }
            },
            VersionDiff::Changed(updated) => {
                let entry = HistoryEntry::from_transition(&stored, &updated, Utc::now());

                if let Err(e) = ledger.append(entry.clone()) {
                    tracing::warn!("Failed to record history for {}: {}", stored.id, e);
                    report.errors += 1;
                    continue;
                }

                match store.update_existing(updated) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!("{} was removed during the cycle", stored.id);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to update stored summary for {}: {}", stored.id, e);
                        report.errors += 1;
                        continue;
                    }
                }

                tracing::info!("Update detected: {}", entry.describe());
                report.changes += 1;
                metrics.record_change();
                state.record_change(&entry);
            }
        }
    }

    tracing::info!("Poll cycle finished: {}", report.summary());
    report
}
