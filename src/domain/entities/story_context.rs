//! Reader-facing story context: who is in the story, what happened, where we are

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A character known to the story
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoryCharacter {
    pub name: String,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub description: Option<String>,
    pub traits: Vec<String>,
    /// Other character name -> relationship
    pub relationships: BTreeMap<String, String>,
}

/// An entry on the story timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub characters: Vec<String>,
    pub location: Option<String>,
}

/// Where the story currently stands
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurrentState {
    pub location: Option<String>,
    pub scene: Option<String>,
    pub goal: Option<String>,
}

/// Characters, timeline and current state of one story
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoryContext {
    characters: BTreeMap<String, StoryCharacter>,
    /// Names in order of first appearance
    character_order: Vec<String>,
    timeline: Vec<TimelineEvent>,
    current_state: CurrentState,
}

/// Display form sent to the browser
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextDisplay {
    pub characters: Vec<String>,
    pub timeline: Vec<String>,
    pub current_state: CurrentState,
}

impl StoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a character, or fill in the given details of a known one
    pub fn add_character(
        &mut self,
        name: &str,
        gender: Option<String>,
        age: Option<String>,
        description: Option<String>,
    ) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }

        match self.characters.get_mut(name) {
            Some(existing) => {
                if gender.is_some() {
                    existing.gender = gender;
                }
                if age.is_some() {
                    existing.age = age;
                }
                if description.is_some() {
                    existing.description = description;
                }
            }
            None => {
                self.character_order.push(name.to_string());
                self.characters.insert(
                    name.to_string(),
                    StoryCharacter {
                        name: name.to_string(),
                        gender,
                        age,
                        description,
                        ..Default::default()
                    },
                );
            }
        }
    }

    /// Add a trait to a known character; duplicates are ignored
    pub fn add_character_trait(&mut self, name: &str, trait_name: &str) {
        if let Some(character) = self.characters.get_mut(name) {
            if !character.traits.iter().any(|t| t == trait_name) {
                character.traits.push(trait_name.to_string());
            }
        }
    }

    /// Record how `from` relates to `to`; both must already be known
    pub fn add_relationship(&mut self, from: &str, to: &str, relationship: &str) {
        if !self.characters.contains_key(to) {
            return;
        }
        if let Some(character) = self.characters.get_mut(from) {
            character
                .relationships
                .insert(to.to_string(), relationship.to_string());
        }
    }

    pub fn add_event(&mut self, description: &str, characters: Vec<String>, location: Option<String>) {
        self.timeline.push(TimelineEvent {
            timestamp: Utc::now(),
            description: description.to_string(),
            characters,
            location,
        });
    }

    /// Keep the `trim_size` most recent timeline entries once there are more than `max_size`
    pub fn trim_timeline(&mut self, max_size: usize, trim_size: usize) {
        if self.timeline.len() > max_size {
            let excess = self.timeline.len() - trim_size.min(max_size);
            self.timeline.drain(0..excess);
        }
    }

    /// Overwrite only the parts of the current state that are given
    pub fn update_current_state(
        &mut self,
        location: Option<String>,
        scene: Option<String>,
        goal: Option<String>,
    ) {
        if location.is_some() {
            self.current_state.location = location;
        }
        if scene.is_some() {
            self.current_state.scene = scene;
        }
        if goal.is_some() {
            self.current_state.goal = goal;
        }
    }

    /// Known character names in order of first appearance
    pub fn character_names(&self) -> Vec<String> {
        self.character_order.clone()
    }

    pub fn character(&self, name: &str) -> Option<&StoryCharacter> {
        self.characters.get(name)
    }

    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    pub fn current_state(&self) -> &CurrentState {
        &self.current_state
    }

    pub fn display(&self) -> ContextDisplay {
        let characters = self
            .character_order
            .iter()
            .filter_map(|name| self.characters.get(name))
            .map(format_character)
            .collect();

        let timeline = self
            .timeline
            .iter()
            .map(|event| match &event.location {
                Some(location) => format!("• {} (Место: {})", event.description, location),
                None => format!("• {}", event.description),
            })
            .collect();

        ContextDisplay {
            characters,
            timeline,
            current_state: self.current_state.clone(),
        }
    }
}

fn format_character(character: &StoryCharacter) -> String {
    let mut info = character.name.clone();

    let details: Vec<&str> = [character.gender.as_deref(), character.age.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !details.is_empty() {
        info.push_str(&format!(" ({})", details.join(", ")));
    }
    if let Some(description) = &character.description {
        info.push_str(&format!("\n  {}", description));
    }
    if !character.traits.is_empty() {
        info.push_str(&format!("\n  Черты: {}", character.traits.join(", ")));
    }
    if !character.relationships.is_empty() {
        let relations: Vec<String> = character
            .relationships
            .iter()
            .map(|(other, relation)| format!("{}: {}", other, relation))
            .collect();
        info.push_str(&format!("\n  Отношения: {}", relations.join(", ")));
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_character_updates_known_fields_only() {
        let mut context = StoryContext::new();
        context.add_character("Анна", Some("женщина".into()), None, Some("травница".into()));
        context.add_character("Анна", None, Some("27".into()), None);

        let anna = context.character("Анна").unwrap();
        assert_eq!(anna.gender.as_deref(), Some("женщина"));
        assert_eq!(anna.age.as_deref(), Some("27"));
        assert_eq!(anna.description.as_deref(), Some("травница"));
    }

    #[test]
    fn test_blank_names_are_ignored() {
        let mut context = StoryContext::new();
        context.add_character("  ", None, None, None);
        assert!(context.display().characters.is_empty());
    }

    #[test]
    fn test_traits_are_deduplicated() {
        let mut context = StoryContext::new();
        context.add_character("Игорь", None, None, None);
        context.add_character_trait("Игорь", "упрямый");
        context.add_character_trait("Игорь", "упрямый");
        context.add_character_trait("Никто", "храбрый");
        assert_eq!(context.character("Игорь").unwrap().traits, vec!["упрямый"]);
    }

    #[test]
    fn test_relationships_require_both_characters() {
        let mut context = StoryContext::new();
        context.add_character("Анна", None, None, None);
        context.add_relationship("Анна", "Игорь", "сестра");
        assert!(context.character("Анна").unwrap().relationships.is_empty());

        context.add_character("Игорь", None, None, None);
        context.add_relationship("Анна", "Игорь", "сестра");
        assert_eq!(
            context.character("Анна").unwrap().relationships.get("Игорь").map(String::as_str),
            Some("сестра")
        );
    }

    #[test]
    fn test_partial_state_update_keeps_other_fields() {
        let mut context = StoryContext::new();
        context.update_current_state(Some("мельница".into()), Some("ночь".into()), None);
        context.update_current_state(None, None, Some("найти брата".into()));

        let state = context.current_state();
        assert_eq!(state.location.as_deref(), Some("мельница"));
        assert_eq!(state.scene.as_deref(), Some("ночь"));
        assert_eq!(state.goal.as_deref(), Some("найти брата"));
    }

    #[test]
    fn test_timeline_trim_keeps_latest_entries() {
        let mut context = StoryContext::new();
        for i in 0..5 {
            context.add_event(&format!("Событие {}", i), vec![], None);
        }

        context.trim_timeline(5, 2);
        assert_eq!(context.timeline().len(), 5);

        context.add_event("Событие 5", vec![], None);
        context.trim_timeline(5, 2);
        let descriptions: Vec<_> = context.timeline().iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Событие 4", "Событие 5"]);
    }

    #[test]
    fn test_display_formats_characters_and_timeline() {
        let mut context = StoryContext::new();
        context.add_character("Анна", Some("женщина".into()), Some("27".into()), Some("травница".into()));
        context.add_character_trait("Анна", "смелая");
        context.add_character("Игорь", None, None, None);
        context.add_relationship("Анна", "Игорь", "сестра");
        context.add_event("Анна нашла карту", vec!["Анна".into()], Some("чердак".into()));
        context.add_event("Игорь исчез", vec![], None);

        let display = context.display();
        assert_eq!(display.characters.len(), 2);
        assert_eq!(
            display.characters[0],
            "Анна (женщина, 27)\n  травница\n  Черты: смелая\n  Отношения: Игорь: сестра"
        );
        assert_eq!(display.characters[1], "Игорь");
        assert_eq!(
            display.timeline,
            vec!["• Анна нашла карту (Место: чердак)", "• Игорь исчез"]
        );
    }
}
