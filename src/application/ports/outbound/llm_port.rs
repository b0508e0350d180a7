//! Text generation port
//!
//! The story services only talk to the language model through this trait, so
//! they can be exercised against mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::GenerationParams;

/// A single completion request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub options: GenerationParams,
    /// Ask the server to constrain output to JSON
    pub json_format: bool,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, options: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            options,
            json_format: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_format = true;
        self
    }
}

/// A completed, non-streamed answer
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    pub model: String,
}

/// One fragment of a streamed answer
#[derive(Debug, Clone, PartialEq)]
pub struct TokenChunk {
    pub text: String,
    pub done: bool,
}

pub type TokenStream = BoxStream<'static, Result<TokenChunk, LlmError>>;

/// Connectivity of the text server as last observed
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub error_count: u32,
    pub last_error_time: Option<DateTime<Utc>>,
    pub base_url: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

#[async_trait]
pub trait TextGenPort: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;

    /// Stream the answer fragment by fragment; the last fragment has `done` set
    async fn generate_stream(&self, request: GenerateRequest) -> Result<TokenStream, LlmError>;

    /// Ask the server to release the model from (GPU) memory
    async fn unload_model(&self) -> Result<(), LlmError>;

    async fn health_check(&self) -> bool;

    async fn status(&self) -> ConnectionStatus;
}
