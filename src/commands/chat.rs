use tauri::{AppHandle, Emitter, State};

use crate::models::{Chat, ChunkPayload, DonePayload, ErrorPayload, Role, StreamEvent};
use crate::services::controller::{StopOutcome, UiSnapshot};
use crate::AppState;

#[tauri::command]
pub async fn list_chats(state: State<'_, AppState>) -> Result<Vec<Chat>, String> {
    Ok(state.controller.lock().await.registry().chats().to_vec())
}

#[tauri::command]
pub async fn get_active_chat(state: State<'_, AppState>) -> Result<Option<Chat>, String> {
    Ok(state
        .controller
        .lock()
        .await
        .registry()
        .active_chat()
        .cloned())
}

#[tauri::command]
pub async fn create_chat(state: State<'_, AppState>) -> Result<Chat, String> {
    Ok(state.controller.lock().await.create_chat())
}

#[tauri::command]
pub async fn switch_chat(state: State<'_, AppState>, chat_id: String) -> Result<(), String> {
    state.controller.lock().await.switch_chat(&chat_id)
}

#[tauri::command]
pub async fn delete_chat(state: State<'_, AppState>, chat_id: String) -> Result<(), String> {
    state.controller.lock().await.delete_chat(&chat_id)
}

#[tauri::command]
pub async fn rename_chat(
    state: State<'_, AppState>,
    chat_id: String,
    title: String,
) -> Result<(), String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("Title cannot be empty".to_string());
    }
    state.controller.lock().await.rename_chat(&chat_id, title)
}

#[tauri::command]
pub async fn clear_chat(state: State<'_, AppState>, chat_id: String) -> Result<(), String> {
    state.controller.lock().await.clear_chat(&chat_id)
}

#[tauri::command]
pub async fn ui_snapshot(state: State<'_, AppState>) -> Result<UiSnapshot, String> {
    Ok(state.controller.lock().await.snapshot())
}

/// Starts a streaming generation for the active chat. Returns as soon
/// as the request is issued; response events reach the window as
/// chat-response-chunk / done / error after the controller has applied
/// them. A blank message or a missing model selection is ignored.
#[tauri::command]
pub async fn send_message(
    app: AppHandle,
    state: State<'_, AppState>,
    content: String,
) -> Result<(), String> {
    let request = state.controller.lock().await.send_message(&content);
    let Some(request) = request else {
        return Ok(());
    };

    let client = state.client.read().await.clone();
    let controller = state.controller.clone();

    tauri::async_runtime::spawn(async move {
        let mut events = client.chat_stream(
            request.model,
            request.messages,
            request.temperature,
            request.max_tokens,
            request.cancel,
        );
        while let Some(event) = events.recv().await {
            let applied = controller
                .lock()
                .await
                .apply_event(&request.message_id, &event);
            forward_event(&app, &event, applied);
            if event.is_terminal() {
                break;
            }
        }
    });

    Ok(())
}

fn forward_event(app: &AppHandle, event: &StreamEvent, applied: bool) {
    // Events the controller discarded as stale stay invisible; a
    // terminal event from a deleted chat's aborted stream must not
    // reach the window either.
    if !applied {
        return;
    }
    match event {
        StreamEvent::Fragment {
            content,
            cumulative,
        } => {
            let _ = app.emit(
                "chat-response-chunk",
                ChunkPayload {
                    content: content.clone(),
                    full_content: cumulative.clone(),
                    done: false,
                },
            );
        }
        StreamEvent::Done { cumulative } => {
            let _ = app.emit(
                "chat-response-done",
                DonePayload {
                    content: cumulative.clone(),
                    done: true,
                },
            );
        }
        StreamEvent::Error { message } => {
            let _ = app.emit(
                "chat-response-error",
                ErrorPayload {
                    error: message.clone(),
                },
            );
        }
    }
}

#[tauri::command]
pub async fn stop_generation(state: State<'_, AppState>) -> Result<StopOutcome, String> {
    Ok(state.controller.lock().await.stop_generation())
}

/// Asks the model for a richer title than the substring heuristic and
/// applies it. Falls back to "New Chat" rather than failing.
#[tauri::command]
pub async fn generate_chat_title(
    state: State<'_, AppState>,
    chat_id: String,
) -> Result<String, String> {
    let (model, first_message) = {
        let controller = state.controller.lock().await;
        let model = controller
            .selected_model()
            .ok_or("No model selected")?
            .to_string();
        let chat = controller
            .registry()
            .get(&chat_id)
            .ok_or_else(|| format!("Chat not found: {}", chat_id))?;
        let first = chat
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .ok_or("Chat has no user message")?;
        (model, first.content.clone())
    };

    let client = state.client.read().await.clone();
    let title = client.generate_title(&model, &first_message).await;
    state.controller.lock().await.rename_chat(&chat_id, &title)?;
    Ok(title)
}
