//! Story Service - structured scene mode
//!
//! Each turn the model answers with a JSON scene (description, speaker,
//! dialog, choices). The service keeps the session's event log in step with
//! those answers, regenerates scenes that repeat earlier text and replaces
//! technical answers with a canned one while flagging the session.

use std::sync::Arc;

use crate::application::ports::outbound::{GenerateRequest, LlmError, TextGenPort};
use crate::application::services::llm::parse_json_object;
use crate::application::services::llm::prompt_builder::{
    build_next_scene_prompt, build_story_start_prompt,
};
use crate::domain::entities::{StoryEventKind, StorySession};
use crate::domain::value_objects::{SceneResponse, Tunables};

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("Text generation failed: {0}")]
    Llm(#[from] LlmError),
    #[error("Model answer is not a scene")]
    Unparseable,
    #[error("Model answer is a technical message")]
    Technical,
}

pub struct StoryService {
    llm: Arc<dyn TextGenPort>,
    tunables: Arc<Tunables>,
}

impl StoryService {
    pub fn new(llm: Arc<dyn TextGenPort>, tunables: Arc<Tunables>) -> Self {
        Self { llm, tunables }
    }

    /// Reset the session and generate the opening scene
    pub async fn start_new_story(&self, session: &mut StorySession) -> SceneResponse {
        session.reset();
        let prompt = build_story_start_prompt(&self.tunables.story.language);

        let scene = match self.request_scene(prompt).await {
            Ok(scene) => scene,
            Err(e) => {
                tracing::warn!("Failed to start story for session {}: {}", session.id(), e);
                session.mark_error();
                return SceneResponse::technical_fallback();
            }
        };

        // Seed the used phrases so the next scene cannot echo the opening
        session.is_repetitive(&scene.scene_description);

        if !scene.scene_description.is_empty() {
            session.add_to_context(StoryEventKind::Scene, &scene.scene_description);
        }
        if !scene.character_name.is_empty() {
            session.add_to_context(StoryEventKind::Character, &scene.character_name);
        }
        if !scene.character_description.is_empty() {
            session.add_to_context(
                StoryEventKind::CharacterDescription,
                &scene.character_description,
            );
        }
        if !scene.initial_situation.is_empty() {
            session.add_to_context(StoryEventKind::InitialSituation, &scene.initial_situation);
        }

        if !scene.character_name.is_empty() {
            let description = non_empty(&scene.character_description);
            session
                .context_mut()
                .add_character(&scene.character_name, None, None, description);
        }

        tracing::info!("Started new story for session {}", session.id());
        scene
    }

    /// Generate the scene that follows `choice`
    pub async fn generate_next_scene(
        &self,
        session: &mut StorySession,
        choice: Option<&str>,
    ) -> SceneResponse {
        if let Some(choice) = choice {
            session.record_choice(choice);
        }

        let recent = session.format_recent_events(self.tunables.context.max_context_length);
        let prompt = build_next_scene_prompt(
            &self.tunables.story.language,
            &recent,
            session.context().current_state(),
        );

        let max_regenerations = self.tunables.context.max_retries_generation;
        let mut regenerations = 0;

        let scene = loop {
            let scene = match self.request_scene(prompt.clone()).await {
                Ok(scene) => scene,
                Err(e) => {
                    tracing::warn!("Scene generation failed for session {}: {}", session.id(), e);
                    session.mark_error();
                    return SceneResponse::technical_fallback();
                }
            };
            session.clear_error();

            let text = format!("{}. {}", scene.scene_description, scene.dialog);
            if !session.is_repetitive(&text) {
                break scene;
            }
            if regenerations >= max_regenerations {
                tracing::warn!(
                    "Scene still repetitive after {} regenerations, accepting it",
                    regenerations
                );
                break scene;
            }
            regenerations += 1;
            tracing::debug!("Repetitive scene, regenerating ({}/{})", regenerations, max_regenerations);
        };

        session.add_to_context(StoryEventKind::Scene, &scene.scene_description);
        if !scene.dialog.is_empty() {
            session.add_to_context(
                StoryEventKind::Dialog,
                &format!("{}: {}", scene.character_name, scene.dialog),
            );
        }

        let history = &self.tunables.history;
        session.trim_history(history.max_history_size, history.trim_size);

        scene
    }

    async fn request_scene(&self, prompt: String) -> Result<SceneResponse, StoryError> {
        let request = GenerateRequest::new(prompt, self.tunables.generation.clone());
        let response = self.llm.generate(request).await?;

        let scene: SceneResponse =
            parse_json_object(&response.text).ok_or(StoryError::Unparseable)?;
        if scene.is_technical() {
            return Err(StoryError::Technical);
        }
        Ok(scene)
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}
