use tracing::warn;

use crate::models::{Chat, Message, Role};
use crate::services::store::ConversationStore;

/// In-memory chat collection plus the "active chat" pointer. Every
/// mutator re-saves the full collection; a failed save is logged and
/// the in-memory state stays authoritative for the session.
pub struct ChatRegistry {
    chats: Vec<Chat>,
    store: ConversationStore,
}

impl ChatRegistry {
    pub fn load(store: ConversationStore) -> Self {
        let mut chats = store.load();
        normalize(&mut chats);
        Self { chats, store }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.chats) {
            warn!("failed to persist chats: {}", e);
        }
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.chats.iter().find(|c| c.is_active)
    }

    pub fn active_chat_id(&self) -> Option<String> {
        self.active_chat().map(|c| c.id.clone())
    }

    pub fn create_chat(&mut self) -> Chat {
        let title = format!("New Chat {}", self.chats.len() + 1);
        for chat in &mut self.chats {
            chat.is_active = false;
        }
        let chat = Chat::new(&title);
        self.chats.push(chat.clone());
        self.persist();
        chat
    }

    pub fn switch_chat(&mut self, id: &str) -> Result<(), String> {
        if !self.chats.iter().any(|c| c.id == id) {
            return Err(format!("Chat not found: {}", id));
        }
        for chat in &mut self.chats {
            chat.is_active = chat.id == id;
        }
        self.persist();
        Ok(())
    }

    /// Removing the active chat promotes the first remaining chat (in
    /// registry order); removing the last chat creates a fresh one.
    pub fn delete_chat(&mut self, id: &str) -> Result<(), String> {
        let index = self
            .chats
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| format!("Chat not found: {}", id))?;
        let removed = self.chats.remove(index);

        if self.chats.is_empty() {
            self.create_chat();
            return Ok(());
        }
        if removed.is_active {
            self.chats[0].is_active = true;
        }
        self.persist();
        Ok(())
    }

    /// Sets the title verbatim; the caller trims and validates.
    pub fn rename_chat(&mut self, id: &str, title: &str) -> Result<(), String> {
        let chat = self
            .chats
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| format!("Chat not found: {}", id))?;
        chat.title = title.to_string();
        self.persist();
        Ok(())
    }

    pub fn clear_messages(&mut self, id: &str) -> Result<(), String> {
        let chat = self
            .chats
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| format!("Chat not found: {}", id))?;
        chat.messages.clear();
        self.persist();
        Ok(())
    }

    pub fn append_message(&mut self, chat_id: &str, message: Message) -> Result<(), String> {
        let chat = self
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| format!("Chat not found: {}", chat_id))?;
        chat.messages.push(message);
        self.persist();
        Ok(())
    }

    /// Replaces the trailing message's content while it is still the
    /// loading assistant placeholder identified by `message_id`.
    /// Anything else means the event is stale and nothing happens.
    pub fn update_streaming_message(
        &mut self,
        chat_id: &str,
        message_id: &str,
        content: &str,
    ) -> bool {
        match self.trailing_placeholder_mut(chat_id, message_id) {
            Some(last) => {
                last.content = content.to_string();
                self.persist();
                true
            }
            None => false,
        }
    }

    /// Same guard as `update_streaming_message`, but also freezes the
    /// message by clearing its loading flag.
    pub fn finalize_streaming_message(
        &mut self,
        chat_id: &str,
        message_id: &str,
        content: &str,
    ) -> bool {
        match self.trailing_placeholder_mut(chat_id, message_id) {
            Some(last) => {
                last.content = content.to_string();
                last.loading = false;
                self.persist();
                true
            }
            None => false,
        }
    }

    fn trailing_placeholder_mut(
        &mut self,
        chat_id: &str,
        message_id: &str,
    ) -> Option<&mut Message> {
        let chat = self.chats.iter_mut().find(|c| c.id == chat_id)?;
        let last = chat.messages.last_mut()?;
        if last.id == message_id && last.loading && last.role == Role::Assistant {
            Some(last)
        } else {
            None
        }
    }
}

/// Repairs a loaded collection: exactly one active chat when non-empty,
/// and no message left marked loading by an interrupted run.
fn normalize(chats: &mut [Chat]) {
    let mut seen_active = false;
    for chat in chats.iter_mut() {
        if chat.is_active {
            if seen_active {
                chat.is_active = false;
            }
            seen_active = true;
        }
        for message in &mut chat.messages {
            message.loading = false;
        }
    }
    if !seen_active {
        if let Some(first) = chats.first_mut() {
            first.is_active = true;
        }
    }
}
