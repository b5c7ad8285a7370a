mod commands;
mod models;
mod services;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use commands::*;
use services::controller::ChatController;
use services::ollama::OllamaClient;
use services::registry::ChatRegistry;
use services::settings_service;
use services::store::{ConversationStore, DiskStore, KeyValueStore};

/// Shared state behind every command. The controller mutex serializes
/// all conversation-state mutation, so stream events are applied one
/// at a time in arrival order.
pub struct AppState {
    pub controller: Arc<Mutex<ChatController>>,
    pub client: Arc<RwLock<OllamaClient>>,
    pub store: Arc<dyn KeyValueStore>,
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store: Arc<dyn KeyValueStore> =
        Arc::new(DiskStore::new().expect("Could not resolve application data directory"));
    let settings = settings_service::load_settings(store.as_ref());
    let registry = ChatRegistry::load(ConversationStore::new(store.clone()));
    let client = OllamaClient::new(&settings.api_endpoint);
    let controller = ChatController::new(registry, settings);

    let state = AppState {
        controller: Arc::new(Mutex::new(controller)),
        client: Arc::new(RwLock::new(client)),
        store,
    };

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            // Chat commands
            list_chats,
            get_active_chat,
            create_chat,
            switch_chat,
            delete_chat,
            rename_chat,
            clear_chat,
            send_message,
            stop_generation,
            generate_chat_title,
            ui_snapshot,
            // Model commands
            fetch_models,
            select_model,
            pull_model,
            show_model_details,
            delete_model,
            // Settings commands
            get_settings,
            save_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
