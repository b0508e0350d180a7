//! Context Service - keeps the reader-facing story context up to date
//!
//! After every segment the model is asked for a JSON analysis of the new text
//! (characters, relationships, what happened, where the story stands). The
//! analysis is merged into the session's `StoryContext`.

use std::sync::Arc;

use serde::Deserialize;

use crate::application::ports::outbound::{GenerateRequest, TextGenPort};
use crate::application::services::llm::parse_json_object;
use crate::application::services::llm::prompt_builder::build_context_analysis_prompt;
use crate::domain::entities::{ContextDisplay, StoryContext, StorySession};
use crate::domain::value_objects::Tunables;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextAnalysis {
    characters: Vec<CharacterInfo>,
    relationships: Vec<RelationshipInfo>,
    event: Option<EventInfo>,
    current_state: StateInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CharacterInfo {
    name: String,
    gender: Option<String>,
    age: Option<String>,
    description: Option<String>,
    traits: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelationshipInfo {
    from: String,
    to: String,
    relationship: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventInfo {
    description: String,
    characters: Vec<String>,
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StateInfo {
    location: Option<String>,
    scene: Option<String>,
    goal: Option<String>,
}

pub struct ContextService {
    llm: Arc<dyn TextGenPort>,
    tunables: Arc<Tunables>,
}

impl ContextService {
    pub fn new(llm: Arc<dyn TextGenPort>, tunables: Arc<Tunables>) -> Self {
        Self { llm, tunables }
    }

    /// Merge what the model extracts from `text` into the session context
    ///
    /// When the analysis fails the player's choice is still added to the
    /// timeline, so the context never falls behind the story.
    pub async fn update_context(
        &self,
        session: &mut StorySession,
        text: &str,
        choice: &str,
    ) -> ContextDisplay {
        let context = session.context_mut();
        let known = context.character_names();

        let prompt =
            build_context_analysis_prompt(&self.tunables.story.language, text, choice, &known);
        let request = GenerateRequest::new(prompt, self.tunables.generation.clone()).json();

        let analysis = match self.llm.generate(request).await {
            Ok(response) => parse_json_object::<ContextAnalysis>(&response.text),
            Err(e) => {
                tracing::warn!("Context analysis failed: {}", e);
                None
            }
        };

        match analysis {
            Some(analysis) => apply_analysis(context, analysis, choice),
            None => context.add_event(choice, Vec::new(), None),
        }

        context.display()
    }
}

fn apply_analysis(context: &mut StoryContext, analysis: ContextAnalysis, choice: &str) {
    for character in analysis.characters {
        let name = character.name.trim();
        if name.is_empty() {
            continue;
        }
        context.add_character(
            name,
            non_empty(character.gender),
            non_empty(character.age),
            non_empty(character.description),
        );
        for trait_name in character.traits.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            context.add_character_trait(name, trait_name);
        }
    }

    for relation in analysis.relationships {
        if !relation.relationship.trim().is_empty() {
            context.add_relationship(&relation.from, &relation.to, relation.relationship.trim());
        }
    }

    match analysis.event {
        Some(event) if !event.description.trim().is_empty() => {
            context.add_event(event.description.trim(), event.characters, non_empty(event.location));
        }
        _ => context.add_event(choice, Vec::new(), None),
    }

    let state = analysis.current_state;
    context.update_current_state(
        non_empty(state.location),
        non_empty(state.scene),
        non_empty(state.goal),
    );
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::ScriptedLlm;

    const ANALYSIS: &str = r#"{
        "characters": [
            {"name": "Анна", "gender": "женский", "age": "", "description": "Травница", "traits": ["смелая", "смелая", ""]},
            {"name": "Пётр", "traits": ["молчаливый"]},
            {"name": "  "}
        ],
        "relationships": [
            {"from": "Анна", "to": "Пётр", "relationship": "сестра"},
            {"from": "Анна", "to": "Незнакомец", "relationship": "враг"}
        ],
        "event": {"description": "Анна нашла брата", "characters": ["Анна", "Пётр"], "location": "Мельница"},
        "current_state": {"location": "Мельница", "scene": "", "goal": "Вернуться домой"}
    }"#;

    fn service(llm: ScriptedLlm) -> (ContextService, Arc<ScriptedLlm>) {
        let llm = Arc::new(llm);
        let service = ContextService::new(llm.clone(), Arc::new(Tunables::default()));
        (service, llm)
    }

    #[tokio::test]
    async fn test_analysis_is_merged() {
        let (service, llm) = service(ScriptedLlm::new().reply(ANALYSIS));
        let mut session = StorySession::new(0.7, 3);

        let display = service
            .update_context(&mut session, "Анна нашла Петра на мельнице.", "Войти")
            .await;

        assert!(llm.requests()[0].json_format);
        assert_eq!(display.characters.len(), 2);
        assert_eq!(
            display.characters[0],
            "Анна (женский)\n  Травница\n  Черты: смелая\n  Отношения: Пётр: сестра"
        );
        assert_eq!(display.timeline, vec!["• Анна нашла брата (Место: Мельница)"]);

        let state = session.context().current_state();
        assert_eq!(state.location.as_deref(), Some("Мельница"));
        assert_eq!(state.scene, None);
        assert_eq!(state.goal.as_deref(), Some("Вернуться домой"));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_choice_event() {
        let (service, _) = service(ScriptedLlm::new().fail().reply("not json at all"));
        let mut session = StorySession::new(0.7, 3);

        service.update_context(&mut session, "…", "Войти").await;
        let display = service.update_context(&mut session, "…", "Уйти").await;

        assert_eq!(display.timeline, vec!["• Войти", "• Уйти"]);
        assert!(display.characters.is_empty());
    }

    #[tokio::test]
    async fn test_known_characters_are_named_in_prompt() {
        let (service, llm) = service(ScriptedLlm::new().reply(ANALYSIS).reply("{}"));
        let mut session = StorySession::new(0.7, 3);

        service.update_context(&mut session, "a", "b").await;
        let display = service.update_context(&mut session, "c", "Ждать").await;

        assert!(llm.requests()[1].prompt.contains("KNOWN CHARACTERS: Анна, Пётр"));
        assert_eq!(display.timeline.last().map(String::as_str), Some("• Ждать"));
    }
}
