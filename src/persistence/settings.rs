use super::{PersistenceError, SCHEMA_VERSION, Storage, TRACKING_SETTINGS_KEY, check_schema, load_or_default};
use crate::models::TrackingSettings;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Serialize, Deserialize)]
struct SettingsEnvelope {
    schema: u32,
    settings: TrackingSettings,
}

/// Persisted [`TrackingSettings`], kept apart from the tracked set and history
pub struct SettingsStore {
    storage: Arc<dyn Storage>,
    current: Mutex<TrackingSettings>,
}

impl SettingsStore {
    /// Load settings; corrupt or out-of-range values fall back to defaults
    pub fn open(storage: Arc<dyn Storage>) -> (Self, Option<PersistenceError>) {
        let (settings, warning) = load_or_default(storage.as_ref(), TRACKING_SETTINGS_KEY, |raw| {
            let stored: SettingsEnvelope = serde_json::from_str(raw).map_err(|e| e.to_string())?;
            check_schema(TRACKING_SETTINGS_KEY, stored.schema);
            stored.settings.validate().map_err(|e| e.to_string())?;
            Ok(stored.settings)
        });

        tracing::info!(
            "Loaded tracking settings: enabled={}, notify={}, interval={}m",
            settings.enabled,
            settings.notify_on_change,
            settings.interval_minutes
        );

        (
            Self {
                storage,
                current: Mutex::new(settings),
            },
            warning,
        )
    }

    fn lock(&self) -> MutexGuard<'_, TrackingSettings> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> TrackingSettings {
        *self.lock()
    }

    fn persist(&self, settings: TrackingSettings) -> Result<(), PersistenceError> {
        let envelope = SettingsEnvelope {
            schema: SCHEMA_VERSION,
            settings,
        };
        let json = serde_json::to_string_pretty(&envelope).map_err(|source| {
            PersistenceError::Serialize {
                key: TRACKING_SETTINGS_KEY.to_string(),
                source,
            }
        })?;
        self.storage.save(TRACKING_SETTINGS_KEY, &json)
    }

    /// Persist new settings, then make them current.
    ///
    /// Callers validate first; this only writes.
    pub fn save(&self, settings: TrackingSettings) -> Result<(), PersistenceError> {
        let mut current = self.lock();
        self.persist(settings)?;
        *current = settings;
        Ok(())
    }

    /// Apply a change to the current settings and persist the result.
    ///
    /// The lock is held from read to write, so a concurrent [`save`](Self::save)
    /// or `update` is applied either wholly before or wholly after this one.
    pub fn update<F>(&self, update_fn: F) -> Result<TrackingSettings, PersistenceError>
    where
        F: FnOnce(&mut TrackingSettings),
    {
        let mut current = self.lock();
        let mut next = *current;
        update_fn(&mut next);
        self.persist(next)?;
        *current = next;
        Ok(next)
    }
}
