// modwatch - update tracker for mods published on a remote catalog
//
// This is the library crate containing the tracking engine and its data structures.
// The binary crate (main.rs) provides the command line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod services;
pub mod state;
pub mod tracker;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{AppConfig, HistoryEntry, ModSummary, TrackerState, TrackingSettings};
pub use persistence::{FileStorage, MemoryStorage, Storage};
pub use services::{CatalogClient, CatalogSource, RateLimitedFetcher, RefreshOutcome};
pub use state::{StateManager, TrackerEvent};
pub use tracker::{AddReport, Tracker, TrackerOptions};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
