use crate::models::{Chat, Role};

/// Default titles look like "New Chat 3"; a chat keeps one only until
/// its first user message lands or the user renames it.
pub const DEFAULT_TITLE_PREFIX: &str = "New Chat";

const TITLE_MAX_CHARS: usize = 25;

/// First 25 characters of the message, with an ellipsis when truncated.
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Returns the automatic title for a chat that still carries a default
/// title and opens with a user message. Naturally idempotent: once the
/// chat is renamed the default-prefix check no longer matches.
pub fn auto_title(chat: &Chat) -> Option<String> {
    if !chat.title.starts_with(DEFAULT_TITLE_PREFIX) {
        return None;
    }
    let first = chat.messages.first()?;
    if first.role != Role::User || first.content.trim().is_empty() {
        return None;
    }
    Some(derive_title(&first.content))
}
