//! Image generation port

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Result of a job status lookup, keyed by job id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(flatten)]
    pub prompts: HashMap<String, PromptHistory>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptHistory {
    #[serde(default)]
    pub outputs: HashMap<String, NodeOutput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<GeneratedImage>,
}

/// Location of an image produced by a save node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default = "default_folder_type")]
    pub r#type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

impl HistoryResponse {
    /// First image of `node_id` for job `prompt_id`, once the node has output
    pub fn output_image(&self, prompt_id: &str, node_id: &str) -> Option<&GeneratedImage> {
        self.prompts
            .get(prompt_id)?
            .outputs
            .get(node_id)?
            .images
            .first()
    }
}

/// Free memory reported by the image server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryStats {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

impl MemoryStats {
    pub fn free_gb(&self) -> f64 {
        self.free_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Events from the job progress feed
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress {
        prompt_id: Option<String>,
        value: u32,
        max: u32,
    },
    /// `node == None` means the job finished executing
    Executing {
        prompt_id: Option<String>,
        node: Option<String>,
    },
    ExecutionError {
        prompt_id: Option<String>,
        message: String,
    },
}

pub type ProgressStream = BoxStream<'static, ProgressEvent>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageGenError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("API error: {0}")]
    ApiError(String),
}

#[async_trait]
pub trait ImageGenPort: Send + Sync {
    /// Submit a job graph; returns the job id
    async fn queue_prompt(
        &self,
        graph: serde_json::Value,
        client_id: &str,
    ) -> Result<String, ImageGenError>;

    async fn get_history(&self, prompt_id: &str) -> Result<HistoryResponse, ImageGenError>;

    async fn get_image(&self, image: &GeneratedImage) -> Result<Vec<u8>, ImageGenError>;

    /// `Ok(None)` when the server does not report memory figures
    async fn memory_stats(&self) -> Result<Option<MemoryStats>, ImageGenError>;

    async fn list_checkpoints(&self) -> Result<Vec<String>, ImageGenError>;

    async fn health_check(&self) -> bool;

    /// Subscribe to progress events for jobs queued under `client_id`
    async fn watch_progress(&self, client_id: &str) -> Result<ProgressStream, ImageGenError>;
}
