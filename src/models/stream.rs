use serde::Serialize;

use super::Role;

/// A message reduced to the shape the chat API expects.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// The closed set of events a streaming generation can produce. A
/// terminal event (`Done` or `Error`) is always the last one delivered
/// for a session.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment { content: String, cumulative: String },
    Done { cumulative: String },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment { .. })
    }
}

// Payload shapes emitted to the window, matching the renderer's
// chat-response-chunk / done / error listeners.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub content: String,
    pub full_content: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonePayload {
    pub content: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}
