// State management module
//
// This module provides the StateManager which wraps TrackerState with thread-safe access
// using Arc<RwLock<T>> and emits change events for the presentation layer.

use crate::models::{
    CycleReport, HistoryEntry, RecoveredValue, SchedulerState, TrackerState, TrackingSettings,
};
use crate::persistence::PersistenceError;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when tracker state is modified
///
/// These events are the notification sink of the engine: the presentation
/// layer subscribes and decides whether and how to surface each one.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    /// Scheduler moved between Disabled, Idle and Polling
    SchedulerChanged { state: SchedulerState },

    /// Tracking settings were replaced
    SettingsChanged { settings: TrackingSettings },

    /// Number of tracked mods changed
    TrackedSetChanged { count: usize },

    /// A poll cycle started fetching a mod (or finished with the last one)
    ModLoading { mod_id: Option<String> },

    /// A poll cycle has started
    CycleStarted { tracked: usize },

    /// A poll cycle has finished
    CycleCompleted { report: CycleReport },

    /// A new version was detected for a tracked mod
    ChangeDetected {
        mod_id: String,
        name: String,
        previous_package_version: Option<String>,
        new_package_version: Option<String>,
        previous_compatibility_version: Option<String>,
        new_compatibility_version: Option<String>,
    },

    /// Stored state was unreadable and replaced with defaults
    PersistenceRecovered { key: String, reason: String },

    /// Cycle results have been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the explicitly constructed state object shared by the scheduler and
/// the [`crate::tracker::Tracker`] facade. It:
/// - Provides thread-safe access to [`TrackerState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`TrackerEvent`]s
/// - Supports subscribing to events via tokio broadcast channels
///
/// # Usage
///
/// - [`read()`](Self::read) for reading state through a closure
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to events
pub struct StateManager {
    state: Arc<RwLock<TrackerState>>,

    /// Multiple subscribers can listen; sends with no listener are dropped
    event_tx: broadcast::Sender<TrackerEvent>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast channel buffers 100 events per subscriber.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(TrackerState::default())),
            event_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> TrackerState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let polling = state_manager.read(|state| state.polling);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&TrackerState) -> R,
    {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs the two and sends
    /// one event per detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<TrackerEvent>
    where
        F: FnOnce(&mut TrackerState),
    {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            self.emit(change.clone());
        }

        changes
    }

    /// Subscribe to tracker events
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn detect_changes(old: &TrackerState, new: &TrackerState) -> Vec<TrackerEvent> {
        let mut changes = Vec::new();

        if !old.polling && new.polling {
            changes.push(TrackerEvent::CycleStarted {
                tracked: new.tracked_count,
            });
        }

        if old.scheduler_state() != new.scheduler_state() {
            changes.push(TrackerEvent::SchedulerChanged {
                state: new.scheduler_state(),
            });
        }

        if old.loading_mod != new.loading_mod {
            changes.push(TrackerEvent::ModLoading {
                mod_id: new.loading_mod.clone(),
            });
        }

        if old.cycles_completed < new.cycles_completed {
            if let Some(report) = &new.last_cycle {
                changes.push(TrackerEvent::CycleCompleted {
                    report: report.clone(),
                });
            }
        }

        if old.tracked_count != new.tracked_count {
            changes.push(TrackerEvent::TrackedSetChanged {
                count: new.tracked_count,
            });
        }

        if old.settings != new.settings {
            changes.push(TrackerEvent::SettingsChanged {
                settings: new.settings,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn set_timer_armed(&self, armed: bool) -> Vec<TrackerEvent> {
        self.update(|state| state.timer_armed = armed)
    }

    pub fn set_settings(&self, settings: TrackingSettings) -> Vec<TrackerEvent> {
        self.update(|state| state.settings = settings)
    }

    pub fn set_tracked_count(&self, count: usize) -> Vec<TrackerEvent> {
        self.update(|state| state.tracked_count = count)
    }

    pub fn begin_cycle(&self) -> Vec<TrackerEvent> {
        self.update(|state| state.begin_cycle())
    }

    pub fn set_loading_mod(&self, mod_id: Option<String>) -> Vec<TrackerEvent> {
        self.update(|state| state.loading_mod = mod_id)
    }

    pub fn finish_cycle(&self, report: CycleReport) -> Vec<TrackerEvent> {
        self.update(|state| state.finish_cycle(report, Utc::now()))
    }

    /// Announce a recorded transition
    pub fn record_change(&self, entry: &HistoryEntry) -> TrackerEvent {
        let event = TrackerEvent::ChangeDetected {
            mod_id: entry.mod_summary.id.clone(),
            name: entry.mod_summary.display_name().to_string(),
            previous_package_version: entry.previous_package_version.clone(),
            new_package_version: entry.new_package_version.clone(),
            previous_compatibility_version: entry.previous_compatibility_version.clone(),
            new_compatibility_version: entry.new_compatibility_version.clone(),
        };
        self.emit(event.clone());
        event
    }

    /// Record that stored state was replaced with defaults and announce it.
    ///
    /// The value stays in [`TrackerState::recovered`] so it can be announced
    /// again with [`announce_recovered`](Self::announce_recovered) once
    /// subscribers exist.
    pub fn report_persistence_warning(&self, error: &PersistenceError) -> TrackerEvent {
        let recovered = RecoveredValue {
            key: error.key().to_string(),
            reason: error.to_string(),
        };
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .recovered
            .push(recovered.clone());

        let event = TrackerEvent::PersistenceRecovered {
            key: recovered.key,
            reason: recovered.reason,
        };
        self.emit(event.clone());
        event
    }

    /// Send one [`TrackerEvent::PersistenceRecovered`] per recorded value
    pub fn announce_recovered(&self) -> Vec<TrackerEvent> {
        let events: Vec<TrackerEvent> = self.read(|state| {
            state
                .recovered
                .iter()
                .map(|r| TrackerEvent::PersistenceRecovered {
                    key: r.key.clone(),
                    reason: r.reason.clone(),
                })
                .collect()
        });

        for event in &events {
            self.emit(event.clone());
        }
        events
    }

    /// Reset cycle counters and results
    pub fn reset_cycle_state(&self) -> Vec<TrackerEvent> {
        let mut changes = self.update(|state| state.reset_cycle_state());

        let reset_event = TrackerEvent::StateReset;
        self.emit(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            event_tx: self.event_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModSummary;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.scheduler_state(), SchedulerState::Disabled);
        assert!(!state.polling);
        assert_eq!(state.tracked_count, 0);
    }

    #[test]
    fn test_timer_armed_emits_scheduler_change() {
        let manager = StateManager::new();

        let changes = manager.set_timer_armed(true);

        assert_eq!(
            changes,
            vec![TrackerEvent::SchedulerChanged {
                state: SchedulerState::Idle
            }]
        );
    }

    #[test]
    fn test_no_events_without_change() {
        let manager = StateManager::new();
        manager.set_timer_armed(true);

        assert!(manager.set_timer_armed(true).is_empty());
    }

    #[test]
    fn test_cycle_lifecycle_events() {
        let manager = StateManager::new();
        manager.set_tracked_count(3);
        manager.set_timer_armed(true);

        let started = manager.begin_cycle();
        assert_eq!(started[0], TrackerEvent::CycleStarted { tracked: 3 });
        assert_eq!(
            started[1],
            TrackerEvent::SchedulerChanged {
                state: SchedulerState::Polling
            }
        );

        let loading = manager.set_loading_mod(Some("12".to_string()));
        assert_eq!(
            loading,
            vec![TrackerEvent::ModLoading {
                mod_id: Some("12".to_string())
            }]
        );

        let report = CycleReport {
            checked: 3,
            changes: 1,
            errors: 0,
            baselined: 0,
        };
        let finished = manager.finish_cycle(report.clone());

        assert!(finished.contains(&TrackerEvent::SchedulerChanged {
            state: SchedulerState::Idle
        }));
        assert!(finished.contains(&TrackerEvent::ModLoading { mod_id: None }));
        assert!(finished.contains(&TrackerEvent::CycleCompleted { report }));
    }

    #[test]
    fn test_settings_change_detection() {
        let manager = StateManager::new();

        let settings = TrackingSettings {
            interval_minutes: 10,
            ..Default::default()
        };
        let changes = manager.set_settings(settings);

        assert_eq!(changes, vec![TrackerEvent::SettingsChanged { settings }]);
    }

    #[test]
    fn test_record_change_event() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        let entry = HistoryEntry::from_transition(
            &ModSummary::new("7", "SAIN").with_package_version("1.0"),
            &ModSummary::new("7", "SAIN").with_package_version("1.1"),
            Utc::now(),
        );
        manager.record_change(&entry);

        match rx.try_recv().unwrap() {
            TrackerEvent::ChangeDetected {
                mod_id,
                name,
                previous_package_version,
                new_package_version,
                ..
            } => {
                assert_eq!(mod_id, "7");
                assert_eq!(name, "SAIN");
                assert_eq!(previous_package_version.as_deref(), Some("1.0"));
                assert_eq!(new_package_version.as_deref(), Some("1.1"));
            }
            other => panic!("Expected ChangeDetected, got: {:?}", other),
        }
    }

    #[test]
    fn test_report_persistence_warning() {
        let manager = StateManager::new();
        let error = PersistenceError::Corrupt {
            key: "history".to_string(),
            reason: "bad json".to_string(),
        };

        let event = manager.report_persistence_warning(&error);

        assert!(matches!(
            event,
            TrackerEvent::PersistenceRecovered { ref key, .. } if key == "history"
        ));
        assert_eq!(manager.read(|s| s.recovered.len()), 1);
    }

    #[test]
    fn test_announce_recovered_reaches_late_subscriber() {
        let manager = StateManager::new();
        manager.report_persistence_warning(&PersistenceError::Corrupt {
            key: "tracked_mods".to_string(),
            reason: "truncated".to_string(),
        });

        let mut rx = manager.subscribe();
        let events = manager.announce_recovered();

        assert_eq!(events.len(), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(TrackerEvent::PersistenceRecovered { ref key, .. }) if key == "tracked_mods"
        ));
    }

    #[test]
    fn test_reset_cycle_state() {
        let manager = StateManager::new();
        manager.begin_cycle();
        manager.finish_cycle(CycleReport::default());

        let changes = manager.reset_cycle_state();

        assert!(changes.iter().any(|c| matches!(c, TrackerEvent::StateReset)));
        assert_eq!(manager.read(|s| s.cycles_completed), 0);
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.set_tracked_count(2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_clone_shares_state() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.set_tracked_count(10);

        assert_eq!(manager2.snapshot().tracked_count, 10);
    }
}
