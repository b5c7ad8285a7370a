use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::models::Chat;

pub const CHAT_HISTORY_KEY: &str = "chat-history";
pub const SETTINGS_KEY: &str = "settings";

/// Local string-keyed persistence. The whole chat collection is stored
/// as one JSON value under a fixed key, settings under another.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// One JSON file per key under the application data directory.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new() -> Result<Self, String> {
        let root = dirs::data_dir()
            .ok_or("Could not find data directory")?
            .join("OllamaChat");
        Ok(Self { root })
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

impl KeyValueStore for DiskStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.key_path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| e.to_string())?;
        }
        fs::write(self.key_path(key), value)
            .map_err(|e| format!("Failed to write {}: {}", key, e))
    }
}

/// Durable mapping for the chat collection. Saves are full-snapshot
/// overwrites; a failed save is logged and does not block the caller.
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Absent or malformed history degrades to an empty collection
    /// rather than failing.
    pub fn load(&self) -> Vec<Chat> {
        let Some(raw) = self.store.get(CHAT_HISTORY_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(chats) => chats,
            Err(e) => {
                warn!("discarding malformed chat history: {}", e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, chats: &[Chat]) -> Result<(), String> {
        let raw = serde_json::to_string(chats)
            .map_err(|e| format!("Failed to serialize chats: {}", e))?;
        self.store.set(CHAT_HISTORY_KEY, &raw)
    }
}
