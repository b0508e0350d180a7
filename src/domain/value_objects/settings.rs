//! Tunable parameter groups
//!
//! Each group maps to one `BOOK__<GROUP>__<KEY>` namespace in the environment
//! (see `infrastructure::config`). Every field has a default so a bare
//! environment yields a working configuration.

use serde::{Deserialize, Serialize};

/// All tunable parameter groups
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tunables {
    pub generation: GenerationParams,
    pub connection: ConnectionParams,
    pub context: ContextParams,
    pub history: HistoryParams,
    pub story: StoryParams,
    pub image: ImageParams,
}

impl Tunables {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), String> {
        if self.history.trim_size > self.history.max_history_size {
            return Err(format!(
                "history.trim_size ({}) must not exceed history.max_history_size ({})",
                self.history.trim_size, self.history.max_history_size
            ));
        }
        if self.connection.max_retries == 0 {
            return Err("connection.max_retries must be at least 1".to_string());
        }
        let delay = self.connection.retry_delay_secs;
        if !delay.is_finite() || delay < 0.0 {
            return Err(format!(
                "connection.retry_delay_secs ({}) must be a non-negative number",
                delay
            ));
        }
        let factor = self.connection.backoff_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(format!(
                "connection.backoff_factor ({}) must be a number of at least 1",
                factor
            ));
        }
        if !(0.0..=1.0).contains(&self.context.similarity_threshold) {
            return Err(format!(
                "context.similarity_threshold ({}) must be within 0.0..=1.0",
                self.context.similarity_threshold
            ));
        }
        if self.image.max_dimension == 0 {
            return Err("image.max_dimension must be positive".to_string());
        }
        if self.image.poll_interval_ms == 0 {
            return Err("image.poll_interval_ms must be positive".to_string());
        }
        Ok(())
    }
}

/// Sampling options sent verbatim as Ollama `options`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub seed: i64,
    pub num_ctx: u32,
    pub num_predict: i32,
    pub stop: Vec<String>,
    pub repeat_last_n: i32,
    pub repeat_penalty: f32,
    pub tfs_z: f32,
    pub num_thread: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.05,
            top_p: 0.9,
            top_k: 40,
            seed: 42,
            num_ctx: 4096,
            num_predict: 5000,
            stop: vec!["[/INST]".to_string()],
            repeat_last_n: 64,
            repeat_penalty: 1.1,
            tfs_z: 1.0,
            num_thread: 8,
        }
    }
}

/// Retry and timeout behaviour of the text server connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionParams {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub backoff_factor: f64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_retries: 3,
            retry_delay_secs: 2.0,
            backoff_factor: 1.5,
        }
    }
}

/// Prompt context and repetition handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextParams {
    /// Number of most recent events embedded in prompts
    pub max_context_length: usize,
    /// Word-overlap ratio at which two phrases count as the same
    pub similarity_threshold: f64,
    /// Regeneration attempts when a scene repeats earlier text
    pub max_retries_generation: u32,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            max_context_length: 5,
            similarity_threshold: 0.7,
            max_retries_generation: 3,
        }
    }
}

/// Event log size limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryParams {
    pub max_history_size: usize,
    pub trim_size: usize,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            max_history_size: 100,
            trim_size: 50,
        }
    }
}

/// Narrative behaviour of a book session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoryParams {
    /// Language the story is written in
    pub language: String,
    /// Label of the choice that starts a new story
    pub start_label: String,
    /// Idle time after the choices are shown before an illustration starts
    pub illustration_delay_secs: u64,
    /// Number of previous choices quoted in the segment prompt
    pub recent_choices: usize,
    /// A new chapter begins after this many choices
    pub choices_per_chapter: usize,
    /// Number of choices asked of the model per segment
    pub choices_per_segment: usize,
    /// Shown instead of a segment the model failed to produce
    pub pause_text: String,
    /// Offered when the model gives no usable choices
    pub fallback_choices: Vec<String>,
}

impl Default for StoryParams {
    fn default() -> Self {
        Self {
            language: "Russian".to_string(),
            start_label: "Начать историю".to_string(),
            illustration_delay_secs: 5,
            recent_choices: 3,
            choices_per_chapter: 3,
            choices_per_segment: 3,
            pause_text: "История на мгновение замерла, словно задумавшись о следующем повороте сюжета..."
                .to_string(),
            fallback_choices: vec![
                "Продолжить путь".to_string(),
                "Осмотреться вокруг".to_string(),
                "Сделать паузу и подумать".to_string(),
            ],
        }
    }
}

/// Job graph and polling settings for the image server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageParams {
    pub checkpoint: String,
    pub steps: u32,
    pub cfg: f32,
    pub sampler_name: String,
    pub scheduler: String,
    pub negative_prompt: String,
    pub filename_prefix: String,
    /// Requested illustration size, clamped to `max_dimension`
    pub width: u32,
    pub height: u32,
    pub max_dimension: u32,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    pub translation_temperature: f32,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            checkpoint: "CrowPonyQp_ponyV3.safetensors".to_string(),
            steps: 10,
            cfg: 7.0,
            sampler_name: "euler_ancestral".to_string(),
            scheduler: "karras".to_string(),
            negative_prompt: "text, watermark, bad quality, blurry, nsfw".to_string(),
            filename_prefix: "Talebook".to_string(),
            width: 768,
            height: 512,
            max_dimension: 384,
            poll_interval_ms: 1000,
            timeout_secs: 300,
            translation_temperature: 0.1,
        }
    }
}
