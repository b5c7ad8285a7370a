use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{Chat, Message, Settings, StreamEvent, WireMessage};
use crate::services::registry::ChatRegistry;
use crate::services::session::{SessionOutcome, StreamSession};
use crate::services::title;

/// Literal stop notice a cancelled generation finalizes with.
pub const STOP_NOTICE: &str = "Generation stopped";
/// Literal marker left in the chat when a stream fails.
pub const ERROR_NOTICE: &str = "Error: Failed to generate response";

/// Everything the transport needs to issue one streaming request. The
/// cancellation token is shared with the session the controller keeps.
pub struct OutboundRequest {
    pub chat_id: String,
    pub message_id: String,
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopOutcome {
    Requested,
    NothingToStop,
}

/// Read-only projection the UI renders from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSnapshot {
    pub chats: Vec<Chat>,
    pub messages: Vec<Message>,
    pub selected_model: Option<String>,
    pub generating: bool,
    pub stop_pending: bool,
    pub error: Option<String>,
}

/// Orchestrates user actions against the registry and the single
/// in-flight stream session. All mutation happens on the caller's
/// turn; stream events are handed in through `apply_event`.
pub struct ChatController {
    registry: ChatRegistry,
    session: Option<StreamSession>,
    settings: Settings,
    selected_model: Option<String>,
    last_error: Option<String>,
}

impl ChatController {
    pub fn new(mut registry: ChatRegistry, settings: Settings) -> Self {
        if registry.is_empty() {
            registry.create_chat();
        }
        Self {
            registry,
            session: None,
            settings: settings.clamped(),
            selected_model: None,
            last_error: None,
        }
    }

    pub fn registry(&self) -> &ChatRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings.clamped();
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    pub fn select_model(&mut self, name: &str) {
        self.selected_model = Some(name.to_string());
    }

    pub fn set_error(&mut self, message: &str) {
        self.last_error = Some(message.to_string());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn generating(&self) -> bool {
        self.session.is_some()
    }

    pub fn stop_pending(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.stop_requested())
    }

    /// Turns a user-submitted message into an outbound request, or
    /// `None` when the send is silently refused (blank input, no model
    /// selected). A send while a generation is in flight stops the
    /// previous one first.
    pub fn send_message(&mut self, content: &str) -> Option<OutboundRequest> {
        let content = content.trim();
        if content.is_empty() {
            debug!("ignoring send: empty message");
            return None;
        }
        let Some(model) = self.selected_model.clone() else {
            debug!("ignoring send: no model selected");
            return None;
        };

        self.stop_and_finalize_session();
        self.last_error = None;

        let chat_id = match self.registry.active_chat_id() {
            Some(id) => id,
            None => self.registry.create_chat().id,
        };

        if let Err(e) = self.registry.append_message(&chat_id, Message::user(content)) {
            warn!("failed to append user message: {}", e);
            return None;
        }
        self.maybe_auto_title(&chat_id);

        // History for the request is everything prior to the
        // placeholder, including the message just appended.
        let messages: Vec<WireMessage> = self
            .registry
            .get(&chat_id)
            .map(|chat| {
                chat.messages
                    .iter()
                    .map(|m| WireMessage {
                        role: m.role,
                        content: m.content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let placeholder = Message::assistant_placeholder();
        let message_id = placeholder.id.clone();
        if let Err(e) = self.registry.append_message(&chat_id, placeholder) {
            warn!("failed to append placeholder: {}", e);
            return None;
        }

        let session = StreamSession::new(chat_id.clone(), message_id.clone());
        let cancel = session.cancel_token();
        self.session = Some(session);

        Some(OutboundRequest {
            chat_id,
            message_id,
            model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            cancel,
        })
    }

    /// Applies one stream event to conversation state. `message_id` is
    /// the placeholder the emitting stream was opened for; events whose
    /// session is gone or superseded are discarded, as are fragments
    /// for a chat the user has switched away from. Returns whether the
    /// event produced a visible mutation.
    pub fn apply_event(&mut self, message_id: &str, event: &StreamEvent) -> bool {
        let Some(session) = self.session.as_ref() else {
            debug!("discarding stream event: no active session");
            return false;
        };
        if session.message_id() != message_id {
            debug!("discarding stream event: session superseded");
            return false;
        }
        let chat_id = session.chat_id().to_string();

        match event {
            StreamEvent::Fragment { cumulative, .. } => {
                if self.registry.active_chat_id().as_deref() != Some(chat_id.as_str()) {
                    debug!("discarding fragment: chat no longer active");
                    return false;
                }
                let applied = self
                    .registry
                    .update_streaming_message(&chat_id, message_id, cumulative);
                if applied {
                    if let Some(session) = self.session.as_mut() {
                        session.set_accumulated(cumulative);
                    }
                } else {
                    debug!("discarding fragment: placeholder no longer loading");
                }
                applied
            }
            StreamEvent::Done { cumulative } => {
                let stopped = self
                    .session
                    .take()
                    .is_some_and(|s| s.stop_requested());
                let applied =
                    self.registry
                        .finalize_streaming_message(&chat_id, message_id, cumulative);
                let outcome = if stopped {
                    SessionOutcome::Cancelled
                } else {
                    SessionOutcome::Completed
                };
                info!("stream finished: {:?}", outcome);
                applied
            }
            StreamEvent::Error { message } => {
                self.session = None;
                let applied =
                    self.registry
                        .finalize_streaming_message(&chat_id, message_id, ERROR_NOTICE);
                self.last_error = Some(message.clone());
                info!("stream finished: {:?}", SessionOutcome::Errored);
                applied
            }
        }
    }

    /// Requests cooperative cancellation of the in-flight generation.
    /// The transport answers with a synthetic done event carrying the
    /// stop notice; a genuine terminal event racing the cancellation
    /// wins if it is processed first.
    pub fn stop_generation(&mut self) -> StopOutcome {
        match self.session.as_mut() {
            Some(session) => {
                session.request_stop();
                StopOutcome::Requested
            }
            None => StopOutcome::NothingToStop,
        }
    }

    pub fn create_chat(&mut self) -> Chat {
        self.registry.create_chat()
    }

    pub fn switch_chat(&mut self, id: &str) -> Result<(), String> {
        self.registry.switch_chat(id)
    }

    pub fn delete_chat(&mut self, id: &str) -> Result<(), String> {
        if self.session.as_ref().is_some_and(|s| s.chat_id() == id) {
            if let Some(session) = self.session.take() {
                session.abort();
            }
        }
        self.registry.delete_chat(id)
    }

    pub fn rename_chat(&mut self, id: &str, title: &str) -> Result<(), String> {
        self.registry.rename_chat(id, title)
    }

    pub fn clear_chat(&mut self, id: &str) -> Result<(), String> {
        if self.session.as_ref().is_some_and(|s| s.chat_id() == id) {
            if let Some(session) = self.session.take() {
                session.abort();
            }
        }
        self.registry.clear_messages(id)
    }

    pub fn snapshot(&self) -> UiSnapshot {
        UiSnapshot {
            chats: self.registry.chats().to_vec(),
            messages: self
                .registry
                .active_chat()
                .map(|c| c.messages.clone())
                .unwrap_or_default(),
            selected_model: self.selected_model.clone(),
            generating: self.generating(),
            stop_pending: self.stop_pending(),
            error: self.last_error.clone(),
        }
    }

    /// Stops and finalizes the current session synchronously, leaving
    /// whatever streamed so far (or the stop notice) in the placeholder.
    /// Late events from the aborted stream are then stale and discarded.
    fn stop_and_finalize_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.request_stop();
        let content = if session.accumulated().is_empty() {
            STOP_NOTICE.to_string()
        } else {
            session.accumulated().to_string()
        };
        self.registry
            .finalize_streaming_message(session.chat_id(), session.message_id(), &content);
    }

    fn maybe_auto_title(&mut self, chat_id: &str) {
        let Some(chat) = self.registry.get(chat_id) else {
            return;
        };
        if let Some(new_title) = title::auto_title(chat) {
            let _ = self.registry.rename_chat(chat_id, &new_title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::store::{ConversationStore, DiskStore};
    use std::sync::Arc;

    fn controller() -> (tempfile::TempDir, ChatController) {
        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskStore::with_root(dir.path().to_path_buf()));
        let registry = ChatRegistry::load(ConversationStore::new(disk));
        let mut controller = ChatController::new(registry, Settings::default());
        controller.select_model("llama2");
        (dir, controller)
    }

    fn fragment(content: &str, cumulative: &str) -> StreamEvent {
        StreamEvent::Fragment {
            content: content.to_string(),
            cumulative: cumulative.to_string(),
        }
    }

    fn done(cumulative: &str) -> StreamEvent {
        StreamEvent::Done {
            cumulative: cumulative.to_string(),
        }
    }

    fn last_message(controller: &ChatController) -> crate::models::Message {
        controller
            .registry()
            .active_chat()
            .unwrap()
            .messages
            .last()
            .cloned()
            .unwrap()
    }

    #[test]
    fn empty_registry_starts_with_one_default_chat() {
        let (_dir, controller) = controller();
        let chats = controller.registry().chats();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "New Chat 1");
        assert!(chats[0].is_active);
    }

    #[test]
    fn send_appends_user_message_and_placeholder() {
        let (_dir, mut controller) = controller();

        let request = controller.send_message("Hello").expect("send accepted");
        assert_eq!(request.model, "llama2");
        // History carries the new user turn but not the placeholder.
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content, "Hello");

        let chat = controller.registry().active_chat().unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, Role::User);
        assert_eq!(chat.messages[0].content, "Hello");
        let placeholder = chat.messages.last().unwrap();
        assert_eq!(placeholder.role, Role::Assistant);
        assert_eq!(placeholder.content, "");
        assert!(placeholder.loading);
        assert_eq!(placeholder.id, request.message_id);
        assert!(controller.generating());
    }

    #[test]
    fn blank_input_or_missing_model_is_silently_refused() {
        let (_dir, mut controller) = controller();
        assert!(controller.send_message("   ").is_none());

        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskStore::with_root(dir.path().to_path_buf()));
        let registry = ChatRegistry::load(ConversationStore::new(disk));
        let mut no_model = ChatController::new(registry, Settings::default());
        assert!(no_model.send_message("Hello").is_none());
        assert_eq!(no_model.registry().active_chat().unwrap().messages.len(), 0);
    }

    #[test]
    fn fragments_update_the_placeholder_and_done_finalizes() {
        let (_dir, mut controller) = controller();
        let request = controller.send_message("Hello").unwrap();

        assert!(controller.apply_event(&request.message_id, &fragment("Hi", "Hi")));
        let last = last_message(&controller);
        assert_eq!(last.content, "Hi");
        assert!(last.loading);

        assert!(controller.apply_event(&request.message_id, &done("Hi there!")));
        let last = last_message(&controller);
        assert_eq!(last.content, "Hi there!");
        assert!(!last.loading);
        assert!(!controller.generating());
    }

    #[test]
    fn stop_then_synthetic_done_finalizes_without_error_banner() {
        let (_dir, mut controller) = controller();
        let request = controller.send_message("Hello").unwrap();
        controller.apply_event(&request.message_id, &fragment("Hi", "Hi"));

        assert_eq!(controller.stop_generation(), StopOutcome::Requested);
        assert!(controller.stop_pending());
        assert!(request.cancel.is_cancelled());

        assert!(controller.apply_event(&request.message_id, &done(STOP_NOTICE)));
        let last = last_message(&controller);
        assert_eq!(last.content, STOP_NOTICE);
        assert!(!last.loading);
        assert!(controller.snapshot().error.is_none());
    }

    #[test]
    fn stop_with_no_session_reports_nothing_to_stop() {
        let (_dir, mut controller) = controller();
        assert_eq!(controller.stop_generation(), StopOutcome::NothingToStop);
    }

    #[test]
    fn fragments_for_a_switched_away_chat_are_discarded() {
        let (_dir, mut controller) = controller();
        let streaming_chat = controller.registry().active_chat_id().unwrap();
        let request = controller.send_message("Hello").unwrap();
        controller.apply_event(&request.message_id, &fragment("Hi", "Hi"));

        let other = controller.create_chat();
        controller.switch_chat(&other.id).unwrap();

        assert!(!controller.apply_event(&request.message_id, &fragment(" there", "Hi there")));
        let first = controller.registry().get(&streaming_chat).unwrap();
        assert_eq!(first.messages.last().unwrap().content, "Hi");
        assert!(controller
            .registry()
            .get(&other.id)
            .unwrap()
            .messages
            .is_empty());
    }

    #[test]
    fn terminal_event_still_finalizes_a_background_chat() {
        let (_dir, mut controller) = controller();
        let streaming_chat = controller.registry().active_chat_id().unwrap();
        let request = controller.send_message("Hello").unwrap();

        let other = controller.create_chat();
        controller.switch_chat(&other.id).unwrap();

        assert!(controller.apply_event(&request.message_id, &done("Hi there!")));
        let last = controller
            .registry()
            .get(&streaming_chat)
            .unwrap()
            .messages
            .last()
            .cloned()
            .unwrap();
        assert_eq!(last.content, "Hi there!");
        assert!(!last.loading);
        assert!(!controller.generating());
    }

    #[test]
    fn stream_error_finalizes_with_marker_and_sets_banner() {
        let (_dir, mut controller) = controller();
        let request = controller.send_message("Hello").unwrap();

        assert!(controller.apply_event(
            &request.message_id,
            &StreamEvent::Error {
                message: "connection refused".to_string(),
            }
        ));
        let last = last_message(&controller);
        assert_eq!(last.content, ERROR_NOTICE);
        assert!(!last.loading);
        assert_eq!(
            controller.snapshot().error.as_deref(),
            Some("connection refused")
        );

        // A late duplicate terminal event is a no-op.
        assert!(!controller.apply_event(&request.message_id, &done("late")));
    }

    #[test]
    fn auto_title_truncates_long_first_messages() {
        let (_dir, mut controller) = controller();
        let content = "Explain quantum computing in simple terms please";
        let request = controller.send_message(content).unwrap();

        let title = controller.registry().active_chat().unwrap().title.clone();
        assert_eq!(title, format!("{}...", &content[..25]));

        // Second send does not retitle.
        controller.apply_event(&request.message_id, &done("done"));
        controller.send_message("Another question entirely").unwrap();
        assert_eq!(controller.registry().active_chat().unwrap().title, title);
    }

    #[test]
    fn send_while_active_stops_the_previous_stream_first() {
        let (_dir, mut controller) = controller();
        let first = controller.send_message("First").unwrap();
        controller.apply_event(&first.message_id, &fragment("partial", "partial"));

        let second = controller.send_message("Second").expect("send accepted");
        assert!(first.cancel.is_cancelled());

        let chat = controller.registry().active_chat().unwrap();
        // First exchange finalized with what had streamed, then the new
        // user turn and a fresh placeholder.
        assert_eq!(chat.messages.len(), 4);
        assert_eq!(chat.messages[1].content, "partial");
        assert!(!chat.messages[1].loading);
        assert_eq!(chat.messages[2].content, "Second");
        assert!(chat.messages[3].loading);
        assert_eq!(second.messages.len(), 3);

        // Late events from the superseded stream no longer apply.
        assert!(!controller.apply_event(&first.message_id, &fragment("stale", "stale")));
        assert!(!controller.apply_event(&first.message_id, &done("stale")));
        assert_eq!(last_message(&controller).content, "");
        assert!(controller.generating());
    }

    #[test]
    fn send_with_nothing_streamed_finalizes_predecessor_with_stop_notice() {
        let (_dir, mut controller) = controller();
        controller.send_message("First").unwrap();
        controller.send_message("Second").unwrap();

        let chat = controller.registry().active_chat().unwrap();
        assert_eq!(chat.messages[1].content, STOP_NOTICE);
        assert!(!chat.messages[1].loading);
    }

    #[test]
    fn deleting_the_only_chat_leaves_one_fresh_active_chat() {
        let (_dir, mut controller) = controller();
        let only = controller.registry().active_chat_id().unwrap();
        controller.send_message("Hello").unwrap();

        controller.delete_chat(&only).unwrap();
        assert!(!controller.generating());
        let chats = controller.registry().chats();
        assert_eq!(chats.len(), 1);
        assert_ne!(chats[0].id, only);
        assert!(chats[0].is_active);
        assert!(chats[0].messages.is_empty());
    }

    #[test]
    fn events_after_chat_deletion_are_discarded() {
        let (_dir, mut controller) = controller();
        let only = controller.registry().active_chat_id().unwrap();
        let request = controller.send_message("Hello").unwrap();

        controller.delete_chat(&only).unwrap();
        assert!(request.cancel.is_cancelled());

        // The aborted stream's synthetic done no longer applies, so the
        // transport must not surface it.
        assert!(!controller.apply_event(&request.message_id, &done(STOP_NOTICE)));
        assert!(controller
            .registry()
            .active_chat()
            .unwrap()
            .messages
            .is_empty());
    }

    #[test]
    fn snapshot_reflects_generation_state() {
        let (_dir, mut controller) = controller();
        let request = controller.send_message("Hello").unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.generating);
        assert!(!snapshot.stop_pending);
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.selected_model.as_deref(), Some("llama2"));

        controller.stop_generation();
        assert!(controller.snapshot().stop_pending);

        controller.apply_event(&request.message_id, &done(STOP_NOTICE));
        let snapshot = controller.snapshot();
        assert!(!snapshot.generating);
        assert!(!snapshot.stop_pending);
    }
}
