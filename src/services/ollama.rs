use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::{ModelsResponse, StreamEvent, WireMessage};
use crate::services::controller::STOP_NOTICE;

const TITLE_INSTRUCTION: &str = "Generate a short title (at most five words) for a \
conversation that starts with the following message. Reply with the title only, \
no quotes or punctuation around it.";

/// Chat request in the server's wire shape. Generation parameters ride
/// at the top level alongside the stream flag.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// One newline-delimited JSON object from a streaming chat response.
#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChunkMessage>,
}

#[derive(Debug, Serialize)]
struct ModelNameRequest {
    name: String,
}

/// Client for the local Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300)) // 5 minute timeout for long generations
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Lists the models the server has available.
    pub async fn list_models(&self) -> Result<ModelsResponse, String> {
        let response = self
            .client
            .get(self.api_url("/api/tags"))
            .send()
            .await
            .map_err(|e| format!("Failed to fetch models. Is Ollama running? ({})", e))?;

        if !response.status().is_success() {
            return Err(format!("API error ({})", response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse model list: {}", e))
    }

    /// Opens a streaming chat request and returns the event sequence.
    /// Fragments carry the delta plus the running cumulative text; the
    /// last event is always `Done` or `Error`. Cancelling the token
    /// aborts the request and yields a synthetic done event carrying
    /// the stop notice.
    pub fn chat_stream(
        &self,
        model: String,
        messages: Vec<WireMessage>,
        temperature: f32,
        max_tokens: u32,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let client = self.client.clone();
        let url = self.api_url("/api/chat");

        tokio::spawn(async move {
            let request = ChatRequest {
                model,
                messages,
                stream: true,
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
            };
            let outcome = pump_stream(&client, &url, &request, &cancel, &tx).await;
            let terminal = match outcome {
                PumpOutcome::Finished => None,
                PumpOutcome::Cancelled => Some(StreamEvent::Done {
                    cumulative: STOP_NOTICE.to_string(),
                }),
                PumpOutcome::Ended(cumulative) => Some(StreamEvent::Done { cumulative }),
                PumpOutcome::Failed(message) => Some(StreamEvent::Error { message }),
            };
            if let Some(event) = terminal {
                let _ = tx.send(event).await;
            }
        });

        rx
    }

    /// Non-streaming completion, kept for callers that want the whole
    /// response in one piece.
    pub async fn generate_chat(
        &self,
        model: &str,
        messages: Vec<WireMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        };

        let response = self
            .client
            .post(self.api_url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("API error ({})", response.status()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))?;

        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    /// Asks the model for a short chat title from the first user
    /// message. Never fails past this boundary: any error falls back
    /// to the default title.
    pub async fn generate_title(&self, model: &str, first_user_message: &str) -> String {
        let messages = vec![WireMessage {
            role: crate::models::Role::User,
            content: format!("{}\n\n{}", TITLE_INSTRUCTION, first_user_message),
        }];

        match self.generate_chat(model, messages, 0.3, 100).await {
            Ok(title) => {
                let title = title.trim().trim_matches('"').trim().to_string();
                if title.is_empty() {
                    "New Chat".to_string()
                } else {
                    title
                }
            }
            Err(e) => {
                warn!("title generation failed: {}", e);
                "New Chat".to_string()
            }
        }
    }

    pub async fn pull_model(&self, name: &str) -> Result<serde_json::Value, String> {
        let response = self
            .client
            .post(self.api_url("/api/pull"))
            .json(&ModelNameRequest {
                name: name.to_string(),
            })
            .send()
            .await
            .map_err(|e| format!("Failed to pull model: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("API error ({})", response.status()));
        }
        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))
    }

    pub async fn show_model_details(&self, name: &str) -> Result<serde_json::Value, String> {
        let response = self
            .client
            .post(self.api_url("/api/show"))
            .json(&ModelNameRequest {
                name: name.to_string(),
            })
            .send()
            .await
            .map_err(|e| format!("Failed to get model details: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("API error ({})", response.status()));
        }
        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))
    }

    pub async fn delete_model(&self, name: &str) -> Result<serde_json::Value, String> {
        let response = self
            .client
            .delete(self.api_url("/api/delete"))
            .json(&ModelNameRequest {
                name: name.to_string(),
            })
            .send()
            .await
            .map_err(|e| format!("Failed to delete model: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("API error ({})", response.status()));
        }
        // A successful delete may return an empty body.
        match response.json().await {
            Ok(value) => Ok(value),
            Err(_) => Ok(serde_json::json!({ "success": true })),
        }
    }
}

enum PumpOutcome {
    /// The server sent its done flag; the terminal event went out.
    Finished,
    /// The token was cancelled before a terminal event arrived.
    Cancelled,
    /// The byte stream ended without a done flag.
    Ended(String),
    Failed(String),
}

/// Reads the response byte stream, reassembles newline-delimited JSON
/// objects, and forwards them as events. Fragment delivery order is the
/// order the server emitted them.
async fn pump_stream(
    client: &Client,
    url: &str,
    request: &ChatRequest,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<StreamEvent>,
) -> PumpOutcome {
    let send = client.post(url).json(request).send();
    let response = tokio::select! {
        _ = cancel.cancelled() => return PumpOutcome::Cancelled,
        result = send => match result {
            Ok(response) => response,
            Err(e) => return PumpOutcome::Failed(format!("Request failed: {}", e)),
        },
    };

    if !response.status().is_success() {
        return PumpOutcome::Failed(format!("API error ({})", response.status()));
    }

    let mut stream = response.bytes_stream();
    let mut line_buffer: Vec<u8> = Vec::new();
    let mut cumulative = String::new();

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return PumpOutcome::Cancelled,
            item = stream.next() => item,
        };

        let chunk = match item {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return PumpOutcome::Failed(format!("Stream error: {}", e)),
            None => return PumpOutcome::Ended(cumulative),
        };

        line_buffer.extend_from_slice(&chunk);
        for line in drain_lines(&mut line_buffer) {
            let parsed: ChatStreamChunk = match serde_json::from_str(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Unknown shapes are dropped at the boundary.
                    debug!("skipping malformed stream line: {}", e);
                    continue;
                }
            };

            if let Some(message) = parsed.message {
                if !message.content.is_empty() {
                    cumulative.push_str(&message.content);
                    let event = StreamEvent::Fragment {
                        content: message.content,
                        cumulative: cumulative.clone(),
                    };
                    if tx.send(event).await.is_err() {
                        return PumpOutcome::Cancelled;
                    }
                }
            }

            if parsed.done {
                let event = StreamEvent::Done {
                    cumulative: cumulative.clone(),
                };
                let _ = tx.send(event).await;
                return PumpOutcome::Finished;
            }
        }
    }
}

/// Splits complete newline-terminated lines out of the byte buffer,
/// leaving any partial trailing line in place. Lines are decoded only
/// once whole, so a multi-byte character that straddles a network
/// chunk boundary stays intact.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let rest = buffer.split_off(pos + 1);
        let mut line = std::mem::replace(buffer, rest);
        line.truncate(pos);
        let line = String::from_utf8_lossy(&line).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_chunks_parse_fragment_and_done_lines() {
        let fragment: ChatStreamChunk =
            serde_json::from_str(r#"{"message":{"content":"Hi"},"done":false}"#).unwrap();
        assert_eq!(fragment.message.unwrap().content, "Hi");
        assert!(!fragment.done);

        let done: ChatStreamChunk = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(done.message.is_none());
        assert!(done.done);
    }

    #[test]
    fn multibyte_character_split_across_chunks_stays_intact() {
        let mut buffer = Vec::new();
        // "café" with the chunk boundary between the two bytes of 'é'.
        buffer.extend_from_slice(br#"{"message":{"content":"caf"#);
        buffer.extend_from_slice(&[0xC3]);
        assert!(drain_lines(&mut buffer).is_empty());

        buffer.extend_from_slice(&[0xA9]);
        buffer.extend_from_slice(b"\"},\"done\":false}\n");
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines.len(), 1);
        assert!(buffer.is_empty());

        let parsed: ChatStreamChunk = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed.message.unwrap().content, "café");
    }

    #[test]
    fn drain_lines_keeps_a_partial_trailing_line() {
        let mut buffer = b"{\"done\":true}\n{\"mess".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec!["{\"done\":true}".to_string()]);
        assert_eq!(buffer, b"{\"mess".to_vec());
    }

    #[test]
    fn chat_request_omits_absent_parameters() {
        let request = ChatRequest {
            model: "llama2".to_string(),
            messages: Vec::new(),
            stream: true,
            temperature: None,
            max_tokens: None,
        };
        let raw = serde_json::to_string(&request).unwrap();
        assert!(!raw.contains("temperature"));
        assert!(!raw.contains("max_tokens"));
    }
}
