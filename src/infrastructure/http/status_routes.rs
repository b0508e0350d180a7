//! Model server status routes

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::application::ports::outbound::ConnectionStatus;
use crate::infrastructure::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub text: ConnectionStatus,
    pub model: String,
    pub image: ImageServerStatus,
}

#[derive(Debug, Serialize)]
pub struct ImageServerStatus {
    pub base_url: String,
    pub reachable: bool,
}

/// Connection state of both model servers
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let text = state.text_client.status().await;
    let reachable = state.image_client.health_check().await;

    Json(StatusResponse {
        text,
        model: state.config.ollama_model.clone(),
        image: ImageServerStatus {
            base_url: state.config.comfyui_base_url.clone(),
            reachable,
        },
    })
}

/// Checkpoints installed on the image server
pub async fn list_checkpoints(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    state
        .image_client
        .list_checkpoints()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))
}
