use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted polling interval, in minutes
pub const MIN_INTERVAL_MINUTES: u32 = 1;

/// Largest accepted polling interval, in minutes
pub const MAX_INTERVAL_MINUTES: u32 = 180;

/// Default catalog endpoint
pub const DEFAULT_BASE_URL: &str = "https://forge.sp-tarkov.com/api/v0";

/// Errors raised at the configuration boundary.
///
/// A rejected value never reaches the settings state; whatever was in effect
/// before stays in effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Polling interval {0} is outside [1, 180] minutes")]
    IntervalOutOfRange(i64),

    #[error("Malformed tracking settings: {0}")]
    Malformed(String),
}

/// Application configuration from modwatch.yaml (overridable with MODWATCH_* env vars)
///
/// Connection details for the catalog plus engine-wide limits. Tracking
/// settings are not part of this file; they live in the state storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every catalog request
    #[serde(default)]
    pub api_token: String,

    #[serde(default = "default_request_gap_ms")]
    pub request_gap_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of history entries kept; unbounded when absent
    #[serde(default)]
    pub history_limit: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: String::new(),
            request_gap_ms: default_request_gap_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            history_limit: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_gap_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Process-wide tracking settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub notify_on_change: bool,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_on_change: true,
            interval_minutes: default_interval_minutes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u32 {
    30
}

impl TrackingSettings {
    /// Check that every field is acceptable before the settings are applied
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_interval(i64::from(self.interval_minutes)).map(|_| ())
    }

    /// Parse and validate a settings payload
    pub fn from_json(payload: &str) -> Result<Self, ConfigurationError> {
        let settings: Self = serde_json::from_str(payload)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Interval actually stored for a requested value.
    ///
    /// Values strictly between the bounds are stored one minute shorter;
    /// previously persisted settings were written this way. The bounds
    /// themselves are stored unchanged.
    pub fn adjusted_interval(requested: i64) -> Result<u32, ConfigurationError> {
        let minutes = check_interval(requested)?;
        if minutes > MIN_INTERVAL_MINUTES && minutes < MAX_INTERVAL_MINUTES {
            Ok(minutes - 1)
        } else {
            Ok(minutes)
        }
    }
}

fn check_interval(minutes: i64) -> Result<u32, ConfigurationError> {
    if minutes < i64::from(MIN_INTERVAL_MINUTES) || minutes > i64::from(MAX_INTERVAL_MINUTES) {
        return Err(ConfigurationError::IntervalOutOfRange(minutes));
    }
    Ok(minutes as u32)
}
