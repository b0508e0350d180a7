//! Shared application state

use std::sync::Arc;

use crate::application::ports::outbound::{ImageGenPort, TextGenPort};
use crate::application::services::{
    ContextService, IllustrationService, NarratorService, StoryService,
};
use crate::domain::entities::StorySession;
use crate::domain::value_objects::Tunables;
use crate::infrastructure::comfyui::ComfyUIClient;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::ollama::OllamaClient;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub tunables: Arc<Tunables>,
    pub text_client: Arc<dyn TextGenPort>,
    pub image_client: Arc<dyn ImageGenPort>,
    // Application services
    pub story_service: StoryService,
    pub narrator_service: NarratorService,
    pub context_service: ContextService,
    pub illustration_service: Arc<IllustrationService>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let text_client: Arc<dyn TextGenPort> = Arc::new(OllamaClient::new(
            &config.ollama_base_url,
            &config.ollama_model,
            config.tunables.connection.clone(),
        ));
        let image_client: Arc<dyn ImageGenPort> =
            Arc::new(ComfyUIClient::new(&config.comfyui_base_url));

        Self::with_clients(config, text_client, image_client)
    }

    /// Wire the services around already constructed model clients
    pub fn with_clients(
        config: AppConfig,
        text_client: Arc<dyn TextGenPort>,
        image_client: Arc<dyn ImageGenPort>,
    ) -> Self {
        let tunables = Arc::new(config.tunables.clone());

        let story_service = StoryService::new(text_client.clone(), tunables.clone());
        let narrator_service = NarratorService::new(text_client.clone(), tunables.clone());
        let context_service = ContextService::new(text_client.clone(), tunables.clone());
        let illustration_service = Arc::new(IllustrationService::new(
            text_client.clone(),
            image_client.clone(),
            tunables.clone(),
            config.comfyui_base_prompt.clone(),
            config.comfyui_min_memory_gb,
        ));

        Self {
            config,
            tunables,
            text_client,
            image_client,
            story_service,
            narrator_service,
            context_service,
            illustration_service,
        }
    }

    /// Fresh story state for a new connection
    pub fn new_session(&self) -> StorySession {
        StorySession::new(
            self.tunables.context.similarity_threshold,
            self.tunables.story.choices_per_chapter,
        )
    }
}

/// State around the given clients with default settings
#[cfg(test)]
pub(crate) fn test_state(
    text_client: Arc<dyn TextGenPort>,
    image_client: Arc<dyn ImageGenPort>,
) -> AppState {
    let config = AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ollama_base_url: "http://ollama".to_string(),
        ollama_model: "gemma2:latest".to_string(),
        comfyui_base_url: "http://comfyui".to_string(),
        comfyui_base_prompt: "book illustration".to_string(),
        comfyui_min_memory_gb: 2.0,
        tunables: Tunables::default(),
    };
    AppState::with_clients(config, text_client, image_client)
}
