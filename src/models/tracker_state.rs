use super::TrackingSettings;
use chrono::{DateTime, Utc};
use std::fmt;

/// Maximum number of poll cycles in flight at once.
///
/// **IMPORTANT:** This is 1. Two overlapping cycles would diff against the
/// same stored summaries and could record the same transition twice. The
/// scheduler enforces it with a `tokio::sync::Semaphore` that ticks and manual
/// refreshes only ever `try_acquire`.
pub const MAX_CONCURRENT_POLL_CYCLES: usize = 1;

/// Scheduler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer armed
    Disabled,
    /// Timer armed, waiting for the next tick
    Idle,
    /// A poll cycle is in flight
    Polling,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SchedulerState::Disabled => "disabled",
            SchedulerState::Idle => "idle",
            SchedulerState::Polling => "polling",
        };
        f.write_str(label)
    }
}

/// Aggregate outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Mods whose latest version was fetched successfully
    pub checked: usize,
    /// Transitions recorded in the history ledger
    pub changes: usize,
    /// Mods skipped because of fetch or persistence failures
    pub errors: usize,
    /// Mods that got their first known version without a history entry
    pub baselined: usize,
}

impl CycleReport {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} checked, {} changed, {} failed",
            self.checked, self.changes, self.errors
        )
    }
}

/// A persisted value that was unreadable at startup and replaced with its default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredValue {
    /// Storage key of the replaced value
    pub key: String,
    pub reason: String,
}

/// Runtime state of the tracker.
///
/// Owned by [`crate::state::StateManager`], which wraps it in
/// `Arc<RwLock<TrackerState>>` and emits [`crate::state::TrackerEvent`]s on
/// every mutation. Nothing else holds a copy.
#[derive(Clone, Debug, Default)]
pub struct TrackerState {
    // Scheduler
    pub timer_armed: bool,
    pub polling: bool,
    pub settings: TrackingSettings,

    // Tracked set
    pub tracked_count: usize,

    /// Mod currently being fetched inside a cycle
    pub loading_mod: Option<String>,

    // Cycle results
    pub last_cycle: Option<CycleReport>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub cycles_completed: usize,
    pub total_changes: usize,

    /// Stored values replaced with defaults when the tracker was opened
    pub recovered: Vec<RecoveredValue>,
}

impl TrackerState {
    pub fn scheduler_state(&self) -> SchedulerState {
        if self.polling {
            SchedulerState::Polling
        } else if self.timer_armed {
            SchedulerState::Idle
        } else {
            SchedulerState::Disabled
        }
    }

    pub fn begin_cycle(&mut self) {
        self.polling = true;
        self.loading_mod = None;
    }

    pub fn finish_cycle(&mut self, report: CycleReport, finished_at: DateTime<Utc>) {
        self.polling = false;
        self.loading_mod = None;
        self.cycles_completed += 1;
        self.total_changes += report.changes;
        self.last_cycle = Some(report);
        self.last_cycle_at = Some(finished_at);
    }

    /// Forget cycle results, keeping scheduler and settings state
    pub fn reset_cycle_state(&mut self) {
        self.loading_mod = None;
        self.last_cycle = None;
        self.last_cycle_at = None;
        self.cycles_completed = 0;
        self.total_changes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = TrackerState::default();
        assert_eq!(state.scheduler_state(), SchedulerState::Disabled);
        assert_eq!(state.tracked_count, 0);
        assert!(state.last_cycle.is_none());
    }

    #[test]
    fn test_scheduler_state_derivation() {
        let mut state = TrackerState::default();

        state.timer_armed = true;
        assert_eq!(state.scheduler_state(), SchedulerState::Idle);

        state.begin_cycle();
        assert_eq!(state.scheduler_state(), SchedulerState::Polling);

        // A manual refresh polls even with the timer disarmed
        state.timer_armed = false;
        assert_eq!(state.scheduler_state(), SchedulerState::Polling);
    }

    #[test]
    fn test_finish_cycle_accumulates() {
        let mut state = TrackerState::default();

        state.begin_cycle();
        state.loading_mod = Some("12".to_string());
        state.finish_cycle(
            CycleReport {
                checked: 3,
                changes: 2,
                errors: 1,
                baselined: 0,
            },
            Utc::now(),
        );
        state.begin_cycle();
        state.finish_cycle(
            CycleReport {
                checked: 3,
                changes: 1,
                ..Default::default()
            },
            Utc::now(),
        );

        assert!(!state.polling);
        assert!(state.loading_mod.is_none());
        assert_eq!(state.cycles_completed, 2);
        assert_eq!(state.total_changes, 3);
        assert_eq!(state.last_cycle.as_ref().map(|r| r.changes), Some(1));
    }

    #[test]
    fn test_reset_cycle_state() {
        let mut state = TrackerState::default();
        state.timer_armed = true;
        state.finish_cycle(CycleReport::default(), Utc::now());

        state.reset_cycle_state();

        assert!(state.timer_armed);
        assert_eq!(state.cycles_completed, 0);
        assert!(state.last_cycle_at.is_none());
    }

    #[test]
    fn test_cycle_report_summary() {
        let report = CycleReport {
            checked: 2,
            changes: 1,
            errors: 1,
            baselined: 0,
        };
        assert!(report.has_errors());
        assert_eq!(report.summary(), "2 checked, 1 changed, 1 failed");
    }

    #[test]
    fn test_display() {
        assert_eq!(SchedulerState::Polling.to_string(), "polling");
    }
}
