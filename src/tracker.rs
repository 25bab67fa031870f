//! Tracker facade - the operations the presentation layer calls.
//!
//! [`Tracker`] wires the stores, the state manager and the scheduler together
//! and exposes the user-triggered operations: add/remove tracked mods,
//! refresh now, read history, configure tracking.

use crate::metrics::Metrics;
use crate::models::{HistoryEntry, ModSummary, RecoveredValue, SchedulerState, TrackingSettings};
use crate::persistence::{HistoryLedger, SettingsStore, Storage, TrackedSetStore};
use crate::services::{
    CatalogSource, DEFAULT_TICK_UNIT, PollingScheduler, RefreshOutcome, SettingsError,
};
use crate::state::{StateManager, TrackerEvent};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Construction options for [`Tracker`]
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Maximum number of history entries kept; unbounded when `None`
    pub history_limit: Option<usize>,

    /// Length of one interval unit (one minute in production)
    pub tick_unit: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            history_limit: None,
            tick_unit: DEFAULT_TICK_UNIT,
        }
    }
}

/// Result of [`Tracker::add_tracked`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Ids newly added to the tracked set
    pub added: Vec<String>,
    /// Ids that were already tracked (their name and URL were refreshed)
    pub refreshed: Vec<String>,
    /// Ids the catalog did not return
    pub missing: Vec<String>,
}

pub struct Tracker<C: CatalogSource> {
    catalog: Arc<C>,
    store: Arc<TrackedSetStore>,
    ledger: Arc<HistoryLedger>,
    settings: Arc<SettingsStore>,
    state: StateManager,
    metrics: Arc<Metrics>,
    scheduler: PollingScheduler<C>,
    recovery_announced: AtomicBool,
}

impl<C: CatalogSource> Tracker<C> {
    /// Open all persisted state and build a disabled scheduler.
    ///
    /// Unreadable stored values are replaced with defaults. Each replacement
    /// is logged at warn level and kept in [`persistence_warnings`](Self::persistence_warnings);
    /// the matching [`TrackerEvent::PersistenceRecovered`] events are sent
    /// from [`start`](Self::start), after callers had a chance to subscribe.
    pub fn new(
        catalog: C,
        storage: Arc<dyn Storage>,
        options: TrackerOptions,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self::with_metrics(catalog, storage, options, runtime, Arc::new(Metrics::new()))
    }

    /// Like [`new`](Self::new), sharing an existing [`Metrics`] instance
    pub fn with_metrics(
        catalog: C,
        storage: Arc<dyn Storage>,
        options: TrackerOptions,
        runtime: tokio::runtime::Handle,
        metrics: Arc<Metrics>,
    ) -> Self {
        let state = StateManager::new();

        let (store, store_warning) = TrackedSetStore::open(Arc::clone(&storage));
        let (ledger, ledger_warning) = HistoryLedger::open(Arc::clone(&storage), options.history_limit);
        let (settings, settings_warning) = SettingsStore::open(storage);

        for warning in [store_warning, ledger_warning, settings_warning].into_iter().flatten() {
            state.report_persistence_warning(&warning);
        }

        state.set_tracked_count(store.len());
        state.set_settings(settings.get());

        let catalog = Arc::new(catalog);
        let store = Arc::new(store);
        let ledger = Arc::new(ledger);
        let settings = Arc::new(settings);

        let scheduler = PollingScheduler::new(
            Arc::clone(&catalog),
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&settings),
            state.clone(),
            Arc::clone(&metrics),
            options.tick_unit,
            runtime,
        );

        Self {
            catalog,
            store,
            ledger,
            settings,
            state,
            metrics,
            scheduler,
            recovery_announced: AtomicBool::new(false),
        }
    }

    /// Arm the timer if the persisted settings have tracking enabled.
    ///
    /// The first call also announces any stored values that were replaced
    /// with defaults while opening.
    pub fn start(&self) {
        if !self.recovery_announced.swap(true, Ordering::SeqCst) {
            self.state.announce_recovered();
        }

        let settings = self.settings.get();
        self.scheduler.apply(settings);
    }

    /// Disarm the timer and log metrics. An in-flight cycle still completes.
    pub fn shutdown(&self) {
        self.scheduler.disable();
        self.metrics.log_summary();
    }

    /// Resolve ids against the catalog and add them to the tracked set.
    ///
    /// Already-tracked mods keep their known versions; only name and URL are
    /// refreshed. Ids the catalog does not return are reported as missing.
    pub async fn add_tracked(&self, ids: &[String]) -> Result<AddReport> {
        let mut seen = HashSet::new();
        let requested: Vec<String> = ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        if requested.is_empty() {
            return Ok(AddReport::default());
        }

        let fetched = self
            .catalog
            .fetch_summaries(&requested)
            .await
            .context("Failed to look up mods in the catalog")?;

        let mut wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();

        let (mut report, tracked_count) = self
            .store
            .modify(|mods| {
                let mut report = AddReport::default();
                let index: HashMap<String, usize> = mods
                    .iter()
                    .enumerate()
                    .map(|(i, m)| (m.id.clone(), i))
                    .collect();

                for summary in fetched {
                    if !wanted.remove(summary.id.as_str()) {
                        continue;
                    }
                    match index.get(&summary.id).copied() {
                        Some(i) => {
                            mods[i].name = summary.name;
                            mods[i].catalog_url = summary.catalog_url;
                            report.refreshed.push(summary.id);
                        }
                        None => {
                            report.added.push(summary.id.clone());
                            mods.push(summary);
                        }
                    }
                }

                report
            })
            .context("Failed to save tracked mods")?;

        // Whatever the merge did not consume was not returned by the catalog
        report.missing = requested
            .iter()
            .filter(|id| wanted.contains(id.as_str()))
            .cloned()
            .collect();

        self.state.set_tracked_count(tracked_count);

        if !report.missing.is_empty() {
            tracing::warn!("Catalog did not return mods: {}", report.missing.join(", "));
        }
        tracing::info!(
            "Tracking {} mods ({} added, {} refreshed)",
            tracked_count,
            report.added.len(),
            report.refreshed.len()
        );

        Ok(report)
    }

    /// Stop tracking one mod; returns whether it was tracked
    pub fn remove_tracked(&self, id: &str) -> Result<bool> {
        let removed = self
            .store
            .remove(id)
            .with_context(|| format!("Failed to remove mod {}", id))?;
        self.state.set_tracked_count(self.store.len());

        if removed {
            tracing::info!("Stopped tracking {}", id);
        }
        Ok(removed)
    }

    /// Explicit reset: drop every tracked mod. History is kept.
    pub fn reset_tracked(&self) -> Result<()> {
        self.store.clear().context("Failed to clear tracked mods")?;
        self.state.set_tracked_count(0);
        self.state.reset_cycle_state();
        tracing::info!("Tracked set reset");
        Ok(())
    }

    /// Run one poll cycle now unless one is in flight
    pub async fn refresh_now(&self) -> RefreshOutcome {
        self.scheduler.refresh_now().await
    }

    /// Whole history, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.ledger.list_all()
    }

    pub fn history_for(&self, mod_id: &str) -> Vec<HistoryEntry> {
        self.ledger.entries_for(mod_id)
    }

    /// Stored values that were unreadable when the tracker was opened
    pub fn persistence_warnings(&self) -> Vec<RecoveredValue> {
        self.state.read(|state| state.recovered.clone())
    }

    pub fn tracked(&self) -> Vec<ModSummary> {
        self.store.all()
    }

    pub fn tracked_mod(&self, id: &str) -> Option<ModSummary> {
        self.store.get(id)
    }

    /// Validate and apply new tracking settings
    pub fn configure_tracking(&self, settings: TrackingSettings) -> Result<(), SettingsError> {
        self.scheduler.configure(settings)
    }

    /// Change only the polling interval
    pub fn set_interval_minutes(&self, minutes: i64) -> Result<u32, SettingsError> {
        self.scheduler.set_interval_minutes(minutes)
    }

    pub fn settings(&self) -> TrackingSettings {
        self.settings.get()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn scheduler(&self) -> &PollingScheduler<C> {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.state.subscribe()
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
