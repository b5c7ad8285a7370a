use tauri::State;

use crate::models::Settings;
use crate::services::ollama::OllamaClient;
use crate::services::settings_service;
use crate::AppState;

#[tauri::command]
pub async fn get_settings(state: State<'_, AppState>) -> Result<Settings, String> {
    Ok(state.controller.lock().await.settings().clone())
}

/// Persists settings and applies them. An endpoint change rebuilds the
/// API client; in-flight streams keep the client they started with.
#[tauri::command]
pub async fn save_settings(
    state: State<'_, AppState>,
    settings: Settings,
) -> Result<Settings, String> {
    let saved = settings_service::save_settings(state.store.as_ref(), settings)?;

    state
        .controller
        .lock()
        .await
        .set_settings(saved.clone());

    let mut client = state.client.write().await;
    if client.base_url() != saved.api_endpoint.trim_end_matches('/') {
        *client = OllamaClient::new(&saved.api_endpoint);
    }

    Ok(saved)
}
