use super::catalog::CatalogSource;
use super::poller::run_poll_cycle;
use crate::metrics::Metrics;
use crate::models::{
    ConfigurationError, CycleReport, MAX_CONCURRENT_POLL_CYCLES, SchedulerState, TrackingSettings,
};
use crate::persistence::{HistoryLedger, PersistenceError, SettingsStore, TrackedSetStore};
use crate::state::StateManager;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Length of one interval unit; intervals are configured in minutes
pub const DEFAULT_TICK_UNIT: Duration = Duration::from_secs(60);

/// Errors from changing tracking settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to persist tracking settings: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Outcome of a manual refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(CycleReport),
    /// Another cycle was in flight; nothing was started
    AlreadyRunning,
}

/// The armed timer.
///
/// Dropping the handle tells the timer task to stop. A cycle the task is
/// running at that moment completes; no further tick is taken.
struct TimerHandle {
    interval_minutes: u32,
    cancel_tx: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
    }
}

struct SchedulerInner<C: CatalogSource> {
    catalog: Arc<C>,
    store: Arc<TrackedSetStore>,
    ledger: Arc<HistoryLedger>,
    settings: Arc<SettingsStore>,
    state: StateManager,
    metrics: Arc<Metrics>,
    cycle_permits: Semaphore,
    timer: Mutex<Option<TimerHandle>>,
    runtime: tokio::runtime::Handle,
    tick_unit: Duration,
}

/// Polling scheduler: owns the recurring timer and runs poll cycles.
///
/// States are `Disabled` (no timer), `Idle` (timer armed) and `Polling` (a
/// cycle in flight). At most [`MAX_CONCURRENT_POLL_CYCLES`] cycle runs at a
/// time: ticks and [`refresh_now`](Self::refresh_now) that find one running
/// are skipped.
pub struct PollingScheduler<C: CatalogSource> {
    inner: Arc<SchedulerInner<C>>,
}

impl<C: CatalogSource> Clone for PollingScheduler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: CatalogSource> PollingScheduler<C> {
    /// Create a disabled scheduler.
    ///
    /// # Arguments
    /// * `tick_unit` - Duration of one interval unit ([`DEFAULT_TICK_UNIT`] in production)
    /// * `runtime` - Handle used to spawn the timer task
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<C>,
        store: Arc<TrackedSetStore>,
        ledger: Arc<HistoryLedger>,
        settings: Arc<SettingsStore>,
        state: StateManager,
        metrics: Arc<Metrics>,
        tick_unit: Duration,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                catalog,
                store,
                ledger,
                settings,
                state,
                metrics,
                cycle_permits: Semaphore::new(MAX_CONCURRENT_POLL_CYCLES),
                timer: Mutex::new(None),
                runtime,
                tick_unit,
            }),
        }
    }

    fn timer(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.inner.timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.state.read(|s| s.scheduler_state())
    }

    pub fn is_enabled(&self) -> bool {
        self.timer().is_some()
    }

    /// Interval of the armed timer, if any
    pub fn armed_interval(&self) -> Option<u32> {
        self.timer().as_ref().map(|t| t.interval_minutes)
    }

    /// Arm the recurring timer, replacing any existing one.
    ///
    /// The first tick fires one full interval from now.
    pub fn enable(&self, interval_minutes: u32) {
        let interval_minutes = interval_minutes.max(1);
        let period = self.inner.tick_unit * interval_minutes;

        let mut timer = self.timer();
        // Release the old timer before arming the new one
        drop(timer.take());

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = self
            .inner
            .runtime
            .spawn(timer_loop(Arc::downgrade(&self.inner), period, cancel_rx));

        *timer = Some(TimerHandle {
            interval_minutes,
            cancel_tx,
            _task: task,
        });
        drop(timer);

        self.inner.state.set_timer_armed(true);
        tracing::info!("Polling enabled every {} minute(s)", interval_minutes);
    }

    /// Tear down the timer. A cycle already in flight is left to finish.
    pub fn disable(&self) {
        let previous = self.timer().take();
        let was_enabled = previous.is_some();
        drop(previous);

        self.inner.state.set_timer_armed(false);
        if was_enabled {
            tracing::info!("Polling disabled");
        }
    }

    /// Change the polling interval.
    ///
    /// Rejects values outside [1, 180]. Values strictly inside the range are
    /// stored one minute shorter (see [`TrackingSettings::adjusted_interval`]).
    /// Persists the result and re-arms the timer if polling is enabled.
    /// Returns the interval now in effect.
    pub fn set_interval_minutes(&self, requested: i64) -> Result<u32, SettingsError> {
        let minutes = TrackingSettings::adjusted_interval(requested)?;
        let settings = self
            .inner
            .settings
            .update(|s| s.interval_minutes = minutes)?;
        self.inner.state.set_settings(settings);

        if self.is_enabled() {
            self.enable(minutes);
        }

        tracing::info!("Polling interval set to {} minute(s) (requested {})", minutes, requested);
        Ok(minutes)
    }

    /// Validate, persist and apply a complete settings value
    pub fn configure(&self, settings: TrackingSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.inner.settings.save(settings)?;
        self.inner.state.set_settings(settings);
        self.apply(settings);
        Ok(())
    }

    /// Arm or disarm the timer to match `settings`, without persisting
    pub fn apply(&self, settings: TrackingSettings) {
        if !settings.enabled {
            self.disable();
        } else if self.armed_interval() != Some(settings.interval_minutes) {
            self.enable(settings.interval_minutes);
        }
    }

    /// Run one cycle now, unless one is already in flight
    pub async fn refresh_now(&self) -> RefreshOutcome {
        tracing::info!("Manual refresh requested");
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> RefreshOutcome {
        let inner = &self.inner;

        let Ok(_permit) = inner.cycle_permits.try_acquire() else {
            tracing::debug!("Poll cycle already in flight, skipping");
            inner.metrics.record_cycle_skipped();
            return RefreshOutcome::AlreadyRunning;
        };

        let started = Instant::now();
        inner.state.set_tracked_count(inner.store.len());
        inner.state.begin_cycle();

        let report = run_poll_cycle(
            inner.catalog.as_ref(),
            &inner.store,
            &inner.ledger,
            &inner.state,
            &inner.metrics,
        )
        .await;

        inner.metrics.record_cycle(started.elapsed());
        inner.state.set_tracked_count(inner.store.len());
        inner.state.finish_cycle(report.clone());

        RefreshOutcome::Completed(report)
    }
}

async fn timer_loop<C: CatalogSource>(
    inner: Weak<SchedulerInner<C>>,
    period: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                if *cancel_rx.borrow() {
                    break;
                }
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let scheduler = PollingScheduler { inner };
                if let RefreshOutcome::Completed(report) = scheduler.run_cycle().await {
                    tracing::debug!("Scheduled cycle done: {}", report.summary());
                }
            }
        }
    }

    tracing::debug!("Timer task stopped");
}
