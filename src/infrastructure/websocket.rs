//! WebSocket handler for reader connections
//!
//! One story session per connection. Book mode (`choice`) streams prose and
//! offers choices; after a quiet period the latest segment is illustrated.
//! Scene mode (`start_story` / `next_scene`) answers with structured scenes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::application::services::{
    GenerationStatus, IllustrationService, ProgressCallback, SegmentUpdate,
};
use crate::domain::entities::{ContextDisplay, StorySession};
use crate::domain::value_objects::{ClientId, SceneResponse};
use crate::infrastructure::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let client_id = ClientId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    tracing::info!("New WebSocket connection established: {}", client_id);

    // Forward messages from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let mut session = state.new_session();
    let _ = tx.send(ServerMessage::Choices {
        choices: vec![state.tunables.story.start_label.clone()],
    });

    let illustration_delay = Duration::from_secs(state.tunables.story.illustration_delay_secs);
    let mut illustration: Option<JoinHandle<()>> = None;
    let mut pending: Option<ClientMessage> = None;

    loop {
        let message = match pending.take() {
            Some(message) => message,
            None => match next_client_message(&mut ws_receiver, client_id, &tx).await {
                Some(message) => message,
                None => break,
            },
        };

        if let Some(task) = illustration.take() {
            task.abort();
            tracing::debug!("Cancelled pending illustration for client {}", client_id);
        }

        match message {
            ClientMessage::Choice { content } => {
                let Some(text) = run_book_turn(&state, &mut session, &content, &tx).await else {
                    continue;
                };

                // Anything the reader sends during the delay becomes the next turn
                match tokio::time::timeout(
                    illustration_delay,
                    next_client_message(&mut ws_receiver, client_id, &tx),
                )
                .await
                {
                    Ok(Some(next)) => pending = Some(next),
                    Ok(None) => break,
                    Err(_) => {
                        illustration = Some(spawn_illustration(
                            state.illustration_service.clone(),
                            text,
                            tx.clone(),
                        ))
                    }
                }
            }
            ClientMessage::StartStory => {
                let scene = state.story_service.start_new_story(&mut session).await;
                let _ = tx.send(ServerMessage::StoryStart { data: scene });
            }
            ClientMessage::NextScene { choice } => {
                let scene = state
                    .story_service
                    .generate_next_scene(&mut session, choice.as_deref())
                    .await;
                let _ = tx.send(ServerMessage::StoryUpdate { data: scene });
            }
        }
    }

    if let Some(task) = illustration {
        task.abort();
    }
    send_task.abort();

    tracing::info!("WebSocket connection terminated: {}", client_id);
}

/// Wait for the next well-formed client message
///
/// Malformed frames are answered with an error and skipped. `None` once the
/// connection is closed or broken.
async fn next_client_message<S>(
    receiver: &mut S,
    client_id: ClientId,
    tx: &UnboundedSender<ServerMessage>,
) -> Option<ClientMessage>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => return Some(message),
                Err(e) => {
                    tracing::warn!("Failed to parse message: {}", e);
                    let _ = tx.send(ServerMessage::Error {
                        code: "PARSE_ERROR".to_string(),
                        message: format!("Invalid message format: {}", e),
                    });
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket connection closed by client: {}", client_id);
                return None;
            }
            Err(e) => {
                tracing::error!("WebSocket error for client {}: {}", client_id, e);
                return None;
            }
            _ => {}
        }
    }
    None
}

/// Stream one book segment and follow it with context and choices
///
/// Returns the segment text when it is worth illustrating.
async fn run_book_turn(
    state: &AppState,
    session: &mut StorySession,
    content: &str,
    tx: &UnboundedSender<ServerMessage>,
) -> Option<String> {
    let restart = content == state.tunables.story.start_label.as_str();
    let choice = (!restart).then_some(content);

    let stream_tx = tx.clone();
    let segment = state
        .narrator_service
        .stream_segment(session, choice, move |update| {
            if let SegmentUpdate::Text { content, done } = update {
                let _ = stream_tx.send(ServerMessage::Story { content, done });
            }
        })
        .await;

    state.narrator_service.complete_segment(session, &segment);

    if !segment.failed {
        let context = state
            .context_service
            .update_context(session, &segment.full_text, content)
            .await;
        let _ = tx.send(ServerMessage::Context { content: context });
    }

    let _ = tx.send(ServerMessage::Choices {
        choices: segment.choices,
    });

    (!segment.failed).then_some(segment.full_text)
}

fn spawn_illustration(
    illustrations: Arc<IllustrationService>,
    text: String,
    tx: UnboundedSender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let progress: ProgressCallback = Arc::new(move |value, max| {
            let _ = progress_tx.send(ServerMessage::ImageProgress { value, max });
        });

        let (result, prompt) = illustrations.illustrate(&text, Some(progress)).await;
        match (result.status, result.image_data) {
            (GenerationStatus::Completed, Some(image)) => {
                let _ = tx.send(ServerMessage::Image {
                    content: image,
                    prompt,
                });
            }
            _ => {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "Image generation failed".to_string());
                tracing::warn!("Illustration failed: {}", message);
                let _ = tx.send(ServerMessage::Error {
                    code: "IMAGE_GENERATION_FAILED".to_string(),
                    message,
                });
            }
        }
    })
}

/// Messages from the browser
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Book mode; the start label begins a new story
    Choice { content: String },
    /// Scene mode: begin a new story
    StartStory,
    /// Scene mode: continue after `choice`
    NextScene { choice: Option<String> },
}

/// Messages to the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Choices { choices: Vec<String> },
    Story { content: String, done: bool },
    Context { content: ContextDisplay },
    /// `content` is a `data:` URL
    Image { content: String, prompt: String },
    ImageProgress { value: u32, max: u32 },
    StoryStart { data: SceneResponse },
    StoryUpdate { data: SceneResponse },
    Error { code: String, message: String },
}
