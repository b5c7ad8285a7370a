use tokio_util::sync::CancellationToken;

/// Terminal outcome of a streaming generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Errored,
    Cancelled,
}

/// One in-flight generation request, bound to the placeholder assistant
/// message it is filling in. At most one session exists process-wide;
/// the controller owns it and drops it on the terminal event.
pub struct StreamSession {
    chat_id: String,
    message_id: String,
    accumulated: String,
    cancel: CancellationToken,
    stop_requested: bool,
}

impl StreamSession {
    pub fn new(chat_id: String, message_id: String) -> Self {
        Self {
            chat_id,
            message_id,
            accumulated: String::new(),
            cancel: CancellationToken::new(),
            stop_requested: false,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn set_accumulated(&mut self, text: &str) {
        self.accumulated = text.to_string();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Cooperative cancellation: signals the transport to abort the
    /// outbound request. Idempotent; a second call changes nothing.
    pub fn request_stop(&mut self) {
        if self.stop_requested {
            return;
        }
        self.stop_requested = true;
        self.cancel.cancel();
    }

    /// Cancels without marking a user stop, for teardown paths where
    /// the placeholder is going away with its chat.
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}
