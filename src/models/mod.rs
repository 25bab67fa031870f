//! Data models for the modwatch update tracker.
//!
//! This module contains the core data structures used throughout the engine:
//! - [`ModSummary`]: Last-known state of one tracked mod
//! - [`VersionRecord`]: One version-list entry normalized from the catalog
//! - [`HistoryEntry`]: Immutable record of a detected version transition
//! - [`TrackingSettings`]: Enabled flag, notification flag and polling interval
//! - [`AppConfig`]: Catalog connection settings loaded from `modwatch.yaml`
//! - [`TrackerState`]: Runtime scheduler state and cycle results
//!
//! # Persistence Note
//!
//! `ModSummary`, `HistoryEntry` and `TrackingSettings` form the persisted
//! schema. Optional fields default to `None` when missing and unknown fields
//! are ignored, so state written by older or newer builds still loads.

pub mod config;
pub mod history;
pub mod mod_summary;
pub mod tracker_state;

pub use config::{
    AppConfig, ConfigurationError, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES, TrackingSettings,
};
pub use history::HistoryEntry;
pub use mod_summary::{ModSummary, VersionRecord, compare_ids};
pub use tracker_state::{
    CycleReport, MAX_CONCURRENT_POLL_CYCLES, RecoveredValue, SchedulerState, TrackerState,
};
