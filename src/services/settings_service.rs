use tracing::warn;

use crate::models::Settings;
use crate::services::store::{KeyValueStore, SETTINGS_KEY};

/// Absent or malformed settings degrade to the defaults.
pub fn load_settings(store: &dyn KeyValueStore) -> Settings {
    let Some(raw) = store.get(SETTINGS_KEY) else {
        return Settings::default();
    };
    match serde_json::from_str::<Settings>(&raw) {
        Ok(settings) => settings.clamped(),
        Err(e) => {
            warn!("discarding malformed settings: {}", e);
            Settings::default()
        }
    }
}

/// Clamps, persists, and returns the settings as stored.
pub fn save_settings(store: &dyn KeyValueStore, settings: Settings) -> Result<Settings, String> {
    let settings = settings.clamped();
    let raw = serde_json::to_string(&settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    store.set(SETTINGS_KEY, &raw)?;
    Ok(settings)
}
