//! Scripted port implementations shared by the service tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::application::ports::outbound::{
    ConnectionStatus, GenerateRequest, GenerateResponse, GeneratedImage, HistoryResponse,
    ImageGenError, ImageGenPort, LlmError, MemoryStats, NodeOutput, ProgressEvent, ProgressStream,
    PromptHistory, TextGenPort, TokenChunk, TokenStream,
};

/// Text model that answers from a script and records every request
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    streams: Mutex<VecDeque<Vec<Result<TokenChunk, LlmError>>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    unloads: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(LlmError::RequestFailed("connection refused".into())));
        self
    }

    /// A stream yielding `fragments` and then a final empty `done` chunk
    pub fn stream(self, fragments: &[&str]) -> Self {
        let mut items: Vec<_> = fragments
            .iter()
            .map(|text| {
                Ok(TokenChunk {
                    text: text.to_string(),
                    done: false,
                })
            })
            .collect();
        items.push(Ok(TokenChunk {
            text: String::new(),
            done: true,
        }));
        self.streams.lock().unwrap().push_back(items);
        self
    }

    /// A stream yielding `fragments` and then breaking
    pub fn broken_stream(self, fragments: &[&str]) -> Self {
        let mut items: Vec<_> = fragments
            .iter()
            .map(|text| {
                Ok(TokenChunk {
                    text: text.to_string(),
                    done: false,
                })
            })
            .collect();
        items.push(Err(LlmError::StreamInterrupted("connection reset".into())));
        self.streams.lock().unwrap().push_back(items);
        self
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenPort for ScriptedLlm {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::RequestFailed("no scripted reply".into())))?;
        Ok(GenerateResponse {
            text: reply,
            model: "scripted".to_string(),
        })
    }

    async fn generate_stream(&self, request: GenerateRequest) -> Result<TokenStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        let items = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed("no scripted stream".into()))?;
        Ok(stream::iter(items).boxed())
    }

    async fn unload_model(&self) -> Result<(), LlmError> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_connected: true,
            base_url: "scripted".to_string(),
            ..Default::default()
        }
    }
}

/// Image server whose job finishes after a fixed number of polls
pub struct MockImageGen {
    pub memory: Option<MemoryStats>,
    pub polls_until_done: usize,
    pub image_bytes: Vec<u8>,
    pub filename: String,
    pub fail_queue: bool,
    /// How long `get_image` takes
    pub download_delay: Duration,
    pub progress: Vec<ProgressEvent>,
    pub polls: AtomicUsize,
    pub graphs: Mutex<Vec<serde_json::Value>>,
}

impl MockImageGen {
    pub fn new() -> Self {
        Self {
            memory: Some(MemoryStats {
                free_bytes: 8 * 1024 * 1024 * 1024,
                total_bytes: 12 * 1024 * 1024 * 1024,
            }),
            polls_until_done: 2,
            image_bytes: vec![0x89, b'P', b'N', b'G'],
            filename: "Talebook_00001_.png".to_string(),
            fail_queue: false,
            download_delay: Duration::ZERO,
            progress: Vec::new(),
            polls: AtomicUsize::new(0),
            graphs: Mutex::new(Vec::new()),
        }
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn queued_graphs(&self) -> Vec<serde_json::Value> {
        self.graphs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenPort for MockImageGen {
    async fn queue_prompt(
        &self,
        graph: serde_json::Value,
        _client_id: &str,
    ) -> Result<String, ImageGenError> {
        if self.fail_queue {
            return Err(ImageGenError::ApiError("queue rejected".into()));
        }
        self.graphs.lock().unwrap().push(graph);
        Ok("job-1".to_string())
    }

    async fn get_history(&self, prompt_id: &str) -> Result<HistoryResponse, ImageGenError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut history = HistoryResponse::default();
        if polls >= self.polls_until_done {
            let mut outputs = std::collections::HashMap::new();
            outputs.insert(
                "9".to_string(),
                NodeOutput {
                    images: vec![GeneratedImage {
                        filename: self.filename.clone(),
                        subfolder: String::new(),
                        r#type: "output".to_string(),
                    }],
                },
            );
            history
                .prompts
                .insert(prompt_id.to_string(), PromptHistory { outputs });
        }
        Ok(history)
    }

    async fn get_image(&self, _image: &GeneratedImage) -> Result<Vec<u8>, ImageGenError> {
        tokio::time::sleep(self.download_delay).await;
        Ok(self.image_bytes.clone())
    }

    async fn memory_stats(&self) -> Result<Option<MemoryStats>, ImageGenError> {
        Ok(self.memory)
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, ImageGenError> {
        Ok(vec!["CrowPonyQp_ponyV3.safetensors".to_string()])
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn watch_progress(&self, _client_id: &str) -> Result<ProgressStream, ImageGenError> {
        Ok(stream::iter(self.progress.clone()).boxed())
    }
}
