//! Services module - the update-tracking engine.
//!
//! The services are **framework-agnostic**: no dependency on the command line
//! front end, so they are exercised directly by the tests.
//!
//! # Components
//!
//! - [`RateLimitedFetcher`]: Sends catalog requests through a [`RateGate`] that
//!   spaces request starts by a fixed gap, and attaches the bearer token.
//!   Failures surface as [`CatalogError`]; nothing is retried here.
//!
//! - [`CatalogClient`]: Builds the summary and version-list queries and
//!   normalizes responses. Implements [`CatalogSource`], the seam the
//!   scheduler is generic over.
//!
//! - [`run_poll_cycle`] / [`diff_versions`]: One pass over the tracked set.
//!   Compares package and compatibility versions, appends history, updates the
//!   store, emits change events. Never fails outward.
//!
//! - [`PollingScheduler`]: The Disabled/Idle/Polling state machine. Owns the
//!   timer and guarantees a single in-flight cycle.
//!
//! # Data Flow
//!
//! 1. Timer tick (or a manual refresh) acquires the cycle permit
//! 2. The tracked set is snapshotted
//! 3. For each mod the latest version is fetched through the rate gate
//! 4. Differences are appended to the ledger and written to the store
//! 5. `ChangeDetected` and `CycleCompleted` events go out through the
//!    [`StateManager`](crate::state::StateManager)

pub mod catalog;
pub mod fetcher;
pub mod poller;
pub mod scheduler;

pub use catalog::{CatalogClient, CatalogSource, SummaryPage, VersionPage};
pub use fetcher::{CatalogError, CatalogRequest, RateGate, RateLimitedFetcher};
pub use poller::{VersionDiff, diff_versions, run_poll_cycle};
pub use scheduler::{DEFAULT_TICK_UNIT, PollingScheduler, RefreshOutcome, SettingsError};
