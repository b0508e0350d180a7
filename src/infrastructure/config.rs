//! Application configuration

use std::env;

use anyhow::{Context, Result};

use crate::domain::value_objects::Tunables;

/// Prefix of the nested parameter variables, e.g. `BOOK__CONNECTION__MAX_RETRIES`
const TUNABLES_PREFIX: &str = "BOOK";
const TUNABLES_SEPARATOR: &str = "__";

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP/WebSocket server binds to
    pub host: String,
    /// HTTP/WebSocket server port
    pub port: u16,

    /// Ollama API base URL
    pub ollama_base_url: String,
    /// Model used for story text, translation and analysis
    pub ollama_model: String,

    /// ComfyUI server URL
    pub comfyui_base_url: String,
    /// Prefix of every illustration prompt
    pub comfyui_base_prompt: String,
    /// Minimum free GPU memory before an image job is started
    pub comfyui_min_memory_gb: f64,

    /// Nested parameter groups
    pub tunables: Tunables,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("PORT must be a valid port number")?,

            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "gemma2:latest".to_string()),

            comfyui_base_url: env::var("COMFYUI_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8188".to_string()),
            comfyui_base_prompt: env::var("COMFYUI_BASE_PROMPT").unwrap_or_else(|_| {
                "book illustration, detailed artistic scene, high quality, masterpiece".to_string()
            }),
            comfyui_min_memory_gb: env::var("COMFYUI_MIN_MEMORY_GB")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()
                .context("COMFYUI_MIN_MEMORY_GB must be a number")?,

            tunables: load_tunables()?,
        };

        config
            .tunables
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid BOOK__* configuration")?;

        Ok(config)
    }
}

/// Layer `BOOK__<GROUP>__<KEY>` variables over the built-in defaults
fn load_tunables() -> Result<Tunables> {
    tunables_from(config::Environment::with_prefix(TUNABLES_PREFIX))
}

fn tunables_from(source: config::Environment) -> Result<Tunables> {
    let source = source
        .prefix_separator(TUNABLES_SEPARATOR)
        .separator(TUNABLES_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("generation.stop")
        .with_list_parse_key("story.fallback_choices");

    config::Config::builder()
        .add_source(source)
        .build()
        .context("Failed to read BOOK__* variables")?
        .try_deserialize()
        .context("Failed to parse BOOK__* variables")
}
