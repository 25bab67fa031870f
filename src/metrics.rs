// Performance metrics module
//
// Lightweight counters for monitoring the tracker over a long-running session

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Tracker metrics
///
/// Uses atomic operations for lock-free updates from the scheduler, the poll
/// cycle and the fetcher. Logged on shutdown and after each cycle at debug
/// level.
#[derive(Debug)]
pub struct Metrics {
    /// Poll cycles that ran to completion
    pub cycles_completed: AtomicUsize,

    /// Ticks or refreshes skipped because a cycle was already in flight
    pub cycles_skipped: AtomicUsize,

    /// Mods whose latest version was fetched successfully
    pub mods_checked: AtomicUsize,

    /// Version transitions recorded
    pub changes_detected: AtomicUsize,

    /// Per-mod fetch failures
    pub fetch_errors: AtomicUsize,

    /// HTTP requests sent to the catalog
    pub requests_sent: AtomicU64,

    /// Total time spent inside poll cycles in milliseconds
    pub total_cycle_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_completed: AtomicUsize::new(0),
            cycles_skipped: AtomicUsize::new(0),
            mods_checked: AtomicUsize::new(0),
            changes_detected: AtomicUsize::new(0),
            fetch_errors: AtomicUsize::new(0),
            requests_sent: AtomicU64::new(0),
            total_cycle_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed cycle and its duration
    pub fn record_cycle(&self, duration: Duration) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.total_cycle_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mod_checked(&self) {
        self.mods_checked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_change(&self) {
        self.changes_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average cycle duration in milliseconds
    pub fn avg_cycle_time_ms(&self) -> f64 {
        let total = self.total_cycle_time_ms.load(Ordering::Relaxed);
        let count = self.cycles_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Tracker Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Cycles: {} completed, {} skipped (avg: {:.2}ms per cycle)",
            self.cycles_completed.load(Ordering::Relaxed),
            self.cycles_skipped.load(Ordering::Relaxed),
            self.avg_cycle_time_ms()
        );
        tracing::info!(
            "Mods: {} checked, {} changes, {} fetch errors",
            self.mods_checked.load(Ordering::Relaxed),
            self.changes_detected.load(Ordering::Relaxed),
            self.fetch_errors.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Catalog requests: {}",
            self.requests_sent.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
