//! Prompt building functions for text generation requests

use crate::domain::entities::CurrentState;

/// Line that separates story prose from the list of choices in book mode
pub const CHOICES_MARKER: &str = "[CHOICES]";

/// Prompt that opens a story in structured scene mode
pub fn build_story_start_prompt(language: &str) -> String {
    format!(
        "[INST] You are an experienced writer of interactive fiction.\n\n\
         Write the beginning of an intriguing story in {language}.\n\n\
         Requirements:\n\
         1. An intriguing opening\n\
         2. A vivid main character with a distinct personality\n\
         3. A clear description of the setting that can be visualised\n\
         4. A hint of a future conflict or mystery\n\n\
         Answer strictly in JSON:\n\
         {{\n\
         \x20   \"scene_description\": \"detailed description of the setting\",\n\
         \x20   \"character_name\": \"name of the main character\",\n\
         \x20   \"character_description\": \"appearance and personality\",\n\
         \x20   \"initial_situation\": \"the starting situation\",\n\
         \x20   \"mood\": \"overall mood of the scene\",\n\
         \x20   \"time_of_day\": \"time of day\"\n\
         }} [/INST]"
    )
}

/// Prompt that continues a story in structured scene mode
pub fn build_next_scene_prompt(language: &str, recent_events: &str, state: &CurrentState) -> String {
    let mut prompt = String::from("[INST] You are an experienced writer of interactive fiction.\n\n");

    prompt.push_str("RECENT EVENTS:\n");
    prompt.push_str(recent_events);
    prompt.push_str("\n\n");

    if let Some(location) = &state.location {
        prompt.push_str(&format!("CURRENT LOCATION: {}\n", location));
    }
    if let Some(goal) = &state.goal {
        prompt.push_str(&format!("CURRENT GOAL: {}\n", goal));
    }

    prompt.push_str(&format!(
        "Continue the story in {language}, following from the player's last choice.\n\n\
         STRICT RULES:\n\
         1. Never repeat earlier scenes, dialog or phrases\n\
         2. The story always moves forward\n\
         3. Every line of dialog advances the plot\n\
         4. Avoid clichés\n\n\
         The continuation must show the concrete consequences of the choice, the character's \
         emotional reaction and two or three contrasting options for the next choice.\n\n\
         Answer strictly in JSON:\n\
         {{\n\
         \x20   \"scene_description\": \"description of the new scene\",\n\
         \x20   \"character_name\": \"name of the speaking character\",\n\
         \x20   \"dialog\": \"what the character says\",\n\
         \x20   \"emotion\": \"the character's emotion\",\n\
         \x20   \"mood\": \"mood of the scene\",\n\
         \x20   \"time_of_day\": \"time of day\",\n\
         \x20   \"choices\": [\n\
         \x20       {{\"text\": \"option\", \"consequence\": \"what it leads to\"}}\n\
         \x20   ]\n\
         }} [/INST]"
    ));
    prompt
}

/// System prompt for streamed book segments
pub fn build_segment_system_prompt(language: &str, choices_count: usize) -> String {
    format!(
        "You are an experienced writer creating a gripping interactive story in a literary style. \
         Write in {language}.\n\n\
         IMPORTANT RULES:\n\
         1. Always open a new segment with the direct consequences of the reader's choice\n\
         2. Keep continuity with earlier events and choices\n\
         3. Do not repeat places and events that were already described\n\
         4. Every segment is two or three paragraphs of prose\n\
         5. Do not use markdown\n\n\
         After the prose write a line containing only {CHOICES_MARKER}, followed by \
         {choices_count} options for the reader's next choice, one per line, each logically \
         connected to the current situation."
    )
}

/// User prompt for one streamed book segment
///
/// `choice == None` asks for the opening of a new story.
pub fn build_segment_user_prompt(
    chapter: u32,
    recent_choices: &[String],
    recent_events: &str,
    choice: Option<&str>,
) -> String {
    let Some(choice) = choice else {
        return "Begin a new story. Introduce the main character and the setting, and end on \
                a situation that calls for a decision."
            .to_string();
    };

    let mut prompt = format!("CURRENT CHAPTER: {}\n", chapter);

    if !recent_choices.is_empty() {
        prompt.push_str("RECENT CHOICES:\n");
        for previous in recent_choices {
            prompt.push_str(&format!("- {}\n", previous));
        }
    }

    prompt.push_str("\nSTORY SO FAR:\n");
    prompt.push_str(recent_events);
    prompt.push_str(&format!("\n\nREADER'S CHOICE: {}\n\n", choice));
    prompt.push_str(
        "Continue the story. The new segment must follow directly from the reader's choice \
         and connect logically to the earlier events.",
    );
    prompt
}

/// System prompt for turning story text into an image description
pub fn build_translator_system_prompt(language: &str) -> String {
    format!(
        "You are a professional translator. Translate the following text from {language} to \
         English. Focus on descriptive elements that would be useful for image generation. \
         Return ONLY the translation, without any additional text or explanations. Make the \
         translation more visual and descriptive."
    )
}

/// Prompt asking for a JSON analysis of a finished segment
pub fn build_context_analysis_prompt(
    language: &str,
    text: &str,
    choice: &str,
    known_characters: &[String],
) -> String {
    let mut prompt = String::from(
        "Analyse the story fragment below and extract the story context.\n\n",
    );

    if !known_characters.is_empty() {
        prompt.push_str(&format!(
            "KNOWN CHARACTERS: {}\n",
            known_characters.join(", ")
        ));
    }

    prompt.push_str(&format!("READER'S CHOICE: {}\n\n", choice));
    prompt.push_str("FRAGMENT:\n");
    prompt.push_str(text);
    prompt.push_str(&format!(
        "\n\nWrite all values in {language}. Answer strictly in JSON:\n\
         {{\n\
         \x20   \"characters\": [\n\
         \x20       {{\"name\": \"\", \"gender\": \"\", \"age\": \"\", \"description\": \"\", \"traits\": [\"\"]}}\n\
         \x20   ],\n\
         \x20   \"relationships\": [\n\
         \x20       {{\"from\": \"\", \"to\": \"\", \"relationship\": \"\"}}\n\
         \x20   ],\n\
         \x20   \"event\": {{\"description\": \"\", \"characters\": [\"\"], \"location\": \"\"}},\n\
         \x20   \"current_state\": {{\"location\": \"\", \"scene\": \"\", \"goal\": \"\"}}\n\
         }}"
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_system_prompt_names_marker_and_language() {
        let prompt = build_segment_system_prompt("Russian", 3);
        assert!(prompt.contains(CHOICES_MARKER));
        assert!(prompt.contains("Write in Russian"));
        assert!(prompt.contains("3 options"));
    }

    #[test]
    fn test_segment_user_prompt_quotes_choices() {
        let recent = vec!["Открыть дверь".to_string(), "Зажечь свечу".to_string()];
        let prompt = build_segment_user_prompt(2, &recent, "Scene: Подвал", Some("Спуститься"));

        assert!(prompt.contains("CURRENT CHAPTER: 2"));
        assert!(prompt.contains("- Открыть дверь\n- Зажечь свечу"));
        assert!(prompt.contains("Scene: Подвал"));
        assert!(prompt.contains("READER'S CHOICE: Спуститься"));
    }

    #[test]
    fn test_segment_user_prompt_without_choice_opens_story() {
        let prompt = build_segment_user_prompt(1, &[], "", None);
        assert!(prompt.starts_with("Begin a new story"));
    }

    #[test]
    fn test_next_scene_prompt_includes_state() {
        let state = CurrentState {
            location: Some("Мельница".to_string()),
            scene: None,
            goal: Some("Найти мельника".to_string()),
        };
        let prompt = build_next_scene_prompt("Russian", "Scene: Лес", &state);

        assert!(prompt.contains("RECENT EVENTS:\nScene: Лес"));
        assert!(prompt.contains("CURRENT LOCATION: Мельница"));
        assert!(prompt.contains("CURRENT GOAL: Найти мельника"));
        assert!(prompt.contains("\"choices\""));
        assert!(prompt.ends_with("[/INST]"));
    }

    #[test]
    fn test_story_start_prompt_is_json_instruction() {
        let prompt = build_story_start_prompt("Russian");
        assert!(prompt.starts_with("[INST]"));
        assert!(prompt.contains("\"initial_situation\""));
        assert!(prompt.contains("in Russian"));
    }

    #[test]
    fn test_context_analysis_prompt() {
        let prompt = build_context_analysis_prompt(
            "Russian",
            "Анна вошла в дом.",
            "Войти",
            &["Анна".to_string()],
        );
        assert!(prompt.contains("KNOWN CHARACTERS: Анна"));
        assert!(prompt.contains("FRAGMENT:\nАнна вошла в дом."));
        assert!(prompt.contains("\"current_state\""));
    }
}
