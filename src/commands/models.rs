use tauri::State;

use crate::models::ModelsResponse;
use crate::AppState;

/// Fetches the model list. On success the first model becomes the
/// selection if none is set; on failure the selection is left alone
/// and the error lands in the banner.
#[tauri::command]
pub async fn fetch_models(state: State<'_, AppState>) -> Result<ModelsResponse, String> {
    let client = state.client.read().await.clone();
    match client.list_models().await {
        Ok(listing) => {
            let mut controller = state.controller.lock().await;
            controller.clear_error();
            if controller.selected_model().is_none() {
                if let Some(first) = listing.models.first() {
                    controller.select_model(&first.name);
                }
            }
            Ok(listing)
        }
        Err(e) => {
            state.controller.lock().await.set_error(&e);
            Err(e)
        }
    }
}

#[tauri::command]
pub async fn select_model(state: State<'_, AppState>, name: String) -> Result<(), String> {
    state.controller.lock().await.select_model(&name);
    Ok(())
}

#[tauri::command]
pub async fn pull_model(
    state: State<'_, AppState>,
    name: String,
) -> Result<serde_json::Value, String> {
    let client = state.client.read().await.clone();
    match client.pull_model(&name).await {
        Ok(value) => Ok(value),
        Err(e) => {
            state.controller.lock().await.set_error(&e);
            Err(e)
        }
    }
}

#[tauri::command]
pub async fn show_model_details(
    state: State<'_, AppState>,
    name: String,
) -> Result<serde_json::Value, String> {
    let client = state.client.read().await.clone();
    client.show_model_details(&name).await
}

#[tauri::command]
pub async fn delete_model(
    state: State<'_, AppState>,
    name: String,
) -> Result<serde_json::Value, String> {
    let client = state.client.read().await.clone();
    match client.delete_model(&name).await {
        Ok(value) => Ok(value),
        Err(e) => {
            state.controller.lock().await.set_error(&e);
            Err(e)
        }
    }
}
