//! Illustration Service - turns the latest story text into a picture
//!
//! The text model and the diffusion model share one GPU. The prompt is
//! prepared first (which needs the text model), then the text model is
//! unloaded, then the image job runs.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::StreamExt;
use serde::Serialize;

use crate::application::dto::{JobGraph, SAVE_IMAGE_NODE};
use crate::application::ports::outbound::{
    GenerateRequest, GeneratedImage, ImageGenError, ImageGenPort, ProgressEvent, ProgressStream,
    TextGenPort,
};
use crate::application::services::llm::prompt_builder::build_translator_system_prompt;
use crate::domain::value_objects::{ImageClientId, Tunables};

/// Sentences of the story text that describe the illustrated moment
const SCENE_SENTENCES: usize = 3;

/// Receives `(value, max)` sampler progress
pub type ProgressCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub status: GenerationStatus,
    /// `data:image/<format>;base64,...`
    pub image_data: Option<String>,
    pub error_message: Option<String>,
}

impl GenerationResult {
    fn completed(image_data: String) -> Self {
        Self {
            status: GenerationStatus::Completed,
            image_data: Some(image_data),
            error_message: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: GenerationStatus::Failed,
            image_data: None,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Server(#[from] ImageGenError),
    #[error("Timed out after {0:?} waiting for the image")]
    Timeout(Duration),
}

pub struct IllustrationService {
    llm: Arc<dyn TextGenPort>,
    images: Arc<dyn ImageGenPort>,
    tunables: Arc<Tunables>,
    base_prompt: String,
    min_memory_gb: f64,
}

impl IllustrationService {
    pub fn new(
        llm: Arc<dyn TextGenPort>,
        images: Arc<dyn ImageGenPort>,
        tunables: Arc<Tunables>,
        base_prompt: impl Into<String>,
        min_memory_gb: f64,
    ) -> Self {
        Self {
            llm,
            images,
            tunables,
            base_prompt: base_prompt.into(),
            min_memory_gb,
        }
    }

    /// Prepare a prompt for `text`, free the GPU and generate the picture
    ///
    /// Returns the result together with the prompt that was used.
    pub async fn illustrate(
        &self,
        text: &str,
        progress: Option<ProgressCallback>,
    ) -> (GenerationResult, String) {
        let prompt = self.prepare_prompt(text).await;

        if let Err(e) = self.llm.unload_model().await {
            tracing::warn!("Failed to unload text model: {}", e);
        } else {
            tracing::info!("Text model unloaded");
        }

        let result = self.generate(&prompt, progress).await;
        (result, prompt)
    }

    /// Base prompt plus an English description of the last few sentences
    pub async fn prepare_prompt(&self, text: &str) -> String {
        let scene = extract_scene_description(text);
        let english = self.translate(&scene).await;
        let prompt = format!("{}, {}", self.base_prompt, english);
        tracing::info!("Prepared image prompt: {}", prompt);
        prompt
    }

    /// Translate story text to English with the text model
    pub async fn translate(&self, text: &str) -> String {
        let request = GenerateRequest::new(text, self.tunables.generation.clone())
            .with_system(build_translator_system_prompt(&self.tunables.story.language))
            .with_temperature(self.tunables.image.translation_temperature);

        match self.llm.generate(request).await {
            Ok(response) if !response.text.trim().is_empty() => response.text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Empty translation, using fallback");
                fallback_translation(text)
            }
            Err(e) => {
                tracing::warn!("Translation failed, using fallback: {}", e);
                fallback_translation(text)
            }
        }
    }

    /// Run one image job for `prompt`
    pub async fn generate(&self, prompt: &str, progress: Option<ProgressCallback>) -> GenerationResult {
        if let Err(message) = self.check_resources().await {
            tracing::warn!("Skipping image generation: {}", message);
            return GenerationResult::failed(message);
        }

        let settings = &self.tunables.image;
        let graph = JobGraph::story_illustration(settings, prompt, None, settings.width, settings.height)
            .to_graph(settings);
        let client_id = ImageClientId::new().to_string();

        let feed = match progress {
            Some(callback) => self.open_progress_feed(&client_id).await.map(|events| (events, callback)),
            None => None,
        };

        // The feed is polled alongside the job so both stop together
        let job = self.run_job(graph, &client_id);
        let result = match feed {
            Some((events, callback)) => {
                tokio::pin!(job);
                let forward = forward_progress(events, callback);
                tokio::pin!(forward);
                tokio::select! {
                    result = &mut job => result,
                    _ = &mut forward => job.await,
                }
            }
            None => job.await,
        };

        match result {
            Ok(image_data) => GenerationResult::completed(image_data),
            Err(e) => {
                tracing::error!("Image generation failed: {}", e);
                GenerationResult::failed(e.to_string())
            }
        }
    }

    /// Free memory on the image server must be at least `min_memory_gb`
    pub async fn check_resources(&self) -> Result<(), String> {
        match self.images.memory_stats().await {
            Ok(Some(stats)) if stats.free_gb() < self.min_memory_gb => Err(format!(
                "Not enough GPU memory: {:.2}GB < {}GB",
                stats.free_gb(),
                self.min_memory_gb
            )),
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err("Image server reports no memory information".to_string()),
            Err(e) => Err(format!("Resource check failed: {}", e)),
        }
    }

    /// Queue, wait for and download one image, all within `image.timeout_secs`
    async fn run_job(&self, graph: serde_json::Value, client_id: &str) -> Result<String, JobError> {
        let timeout = Duration::from_secs(self.tunables.image.timeout_secs);
        tokio::time::timeout(timeout, async {
            let prompt_id = self.images.queue_prompt(graph, client_id).await?;
            tracing::info!("Queued image job {}", prompt_id);

            let image = self.wait_for_output(&prompt_id).await?;

            let bytes = self.images.get_image(&image).await?;
            tracing::info!("Downloaded {} ({} bytes)", image.filename, bytes.len());
            Ok(to_data_url(&image.filename, &bytes))
        })
        .await
        .map_err(|_| JobError::Timeout(timeout))?
    }

    async fn wait_for_output(&self, prompt_id: &str) -> Result<GeneratedImage, ImageGenError> {
        let interval = Duration::from_millis(self.tunables.image.poll_interval_ms);
        loop {
            let history = self.images.get_history(prompt_id).await?;
            if let Some(image) = history.output_image(prompt_id, SAVE_IMAGE_NODE) {
                return Ok(image.clone());
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn open_progress_feed(&self, client_id: &str) -> Option<ProgressStream> {
        match self.images.watch_progress(client_id).await {
            Ok(events) => Some(events),
            Err(e) => {
                tracing::warn!("Progress feed unavailable: {}", e);
                None
            }
        }
    }
}

/// Pass sampler progress to `callback` until the job finishes or fails
async fn forward_progress(mut events: ProgressStream, callback: ProgressCallback) {
    while let Some(event) = events.next().await {
        match event {
            ProgressEvent::Progress { value, max, .. } => callback(value, max),
            ProgressEvent::Executing { node: None, .. } => break,
            ProgressEvent::ExecutionError { message, .. } => {
                tracing::warn!("Image server reported an error: {}", message);
                break;
            }
            ProgressEvent::Executing { .. } => {}
        }
    }
}

/// The last few `.`-separated sentences of `text`
pub fn extract_scene_description(text: &str) -> String {
    let sentences: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let start = sentences.len().saturating_sub(SCENE_SENTENCES);
    sentences[start..].join(". ")
}

/// Image prompt built without the text model
pub fn fallback_translation(text: &str) -> String {
    let cleaned = text.replace("**", "").replace("[DONE]", "");
    format!("scene with characters, story illustration, {}", cleaned.trim())
}

fn to_data_url(filename: &str, bytes: &[u8]) -> String {
    let format = match filename.rsplit_once('.') {
        Some((_, ext)) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => "jpeg",
        Some((_, ext)) if ext.eq_ignore_ascii_case("webp") => "webp",
        _ => "png",
    };
    format!("data:image/{};base64,{}", format, BASE64.encode(bytes))
}
