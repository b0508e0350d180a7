//! ComfyUI client for story illustrations

mod progress;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::ports::outbound::{
    GeneratedImage, HistoryResponse, ImageGenError, ImageGenPort, MemoryStats, ProgressStream,
};

/// Client for the ComfyUI HTTP API
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
}

impl ComfyUIClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, ImageGenError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(request_failed)?;
        let response = check_status(response).await?;
        response.json().await.map_err(request_failed)
    }
}

fn request_failed(error: reqwest::Error) -> ImageGenError {
    ImageGenError::RequestFailed(error.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ImageGenError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ImageGenError::ApiError(format!("{}: {}", status, error_text)))
}

#[derive(Debug, Serialize)]
struct QueuePromptRequest<'a> {
    prompt: Value,
    client_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    prompt_id: String,
}

/// Free/total memory from a `/system_stats` document
///
/// The first GPU wins; servers without one report system RAM, either as
/// `system.ram_*` or `system.memory.*`.
fn memory_from_stats(stats: &Value) -> Option<MemoryStats> {
    let pair = |free: &Value, total: &Value| {
        Some(MemoryStats {
            free_bytes: free.as_u64()?,
            total_bytes: total.as_u64()?,
        })
    };

    if let Some(device) = stats["devices"].get(0) {
        if let Some(stats) = pair(&device["vram_free"], &device["vram_total"]) {
            return Some(stats);
        }
    }

    let system = &stats["system"];
    pair(&system["ram_free"], &system["ram_total"])
        .or_else(|| pair(&system["memory"]["free"], &system["memory"]["total"]))
}

/// Checkpoint names from `/object_info/CheckpointLoaderSimple`
fn checkpoints_from_object_info(info: &Value) -> Vec<String> {
    info["CheckpointLoaderSimple"]["input"]["required"]["ckpt_name"][0]
        .as_array()
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ImageGenPort for ComfyUIClient {
    async fn queue_prompt(&self, graph: Value, client_id: &str) -> Result<String, ImageGenError> {
        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&QueuePromptRequest {
                prompt: graph,
                client_id,
            })
            .send()
            .await
            .map_err(request_failed)?;
        let response = check_status(response).await?;

        let queued: QueueResponse = response.json().await.map_err(request_failed)?;
        tracing::debug!("Queued prompt {} for client {}", queued.prompt_id, client_id);
        Ok(queued.prompt_id)
    }

    async fn get_history(&self, prompt_id: &str) -> Result<HistoryResponse, ImageGenError> {
        let history = self.get_json(&format!("/history/{}", prompt_id)).await?;
        serde_json::from_value(history).map_err(|e| ImageGenError::ApiError(e.to_string()))
    }

    async fn get_image(&self, image: &GeneratedImage) -> Result<Vec<u8>, ImageGenError> {
        let response = self
            .client
            .get(format!("{}/view", self.base_url))
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.r#type.as_str()),
            ])
            .send()
            .await
            .map_err(request_failed)?;
        let response = check_status(response).await?;

        let bytes = response.bytes().await.map_err(request_failed)?;
        Ok(bytes.to_vec())
    }

    async fn memory_stats(&self) -> Result<Option<MemoryStats>, ImageGenError> {
        let stats = self.get_json("/system_stats").await?;
        Ok(memory_from_stats(&stats))
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, ImageGenError> {
        let info = self.get_json("/object_info/CheckpointLoaderSimple").await?;
        Ok(checkpoints_from_object_info(&info))
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/system_stats", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("ComfyUI health check failed: {}", e);
                false
            }
        }
    }

    async fn watch_progress(&self, client_id: &str) -> Result<ProgressStream, ImageGenError> {
        progress::watch(&self.base_url, client_id).await
    }
}
