//! Structured scene answers and their technical classification

use serde::{Deserialize, Serialize};

/// Speaker name used by answers that the engine fabricates on failure
pub const SYSTEM_SPEAKER: &str = "Система";

/// Matched at the start of a word, so "terror" is not an error
const ERROR_WORDS: &[&str] = &["ошибк", "error"];
const TECHNICAL_MOODS: &[&str] = &["error", "technical", "техническое"];
const CONNECTION_FAILURES: &[&str] = &["не удалось подключиться", "could not connect", "failed to connect"];
const RETRY_OFFERS: &[&str] = &["попробовать снова", "try again"];

/// Player choices that ask for a retry rather than advance the plot
const RETRY_CHOICES: &[&str] = &[
    "попробовать снова",
    "повторить",
    "перезапустить",
    "try again",
    "retry",
    "restart",
];

/// A scene as returned by the text model in structured mode
///
/// The start-of-story answer fills `character_description` and
/// `initial_situation`; continuation answers fill `dialog`, `emotion` and
/// `choices`. Missing fields deserialize as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneResponse {
    pub scene_description: String,
    pub character_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub character_description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub initial_situation: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dialog: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub emotion: String,
    pub mood: String,
    pub time_of_day: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<SceneChoice>,
}

/// One branching option offered to the player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "ChoiceRepr")]
pub struct SceneChoice {
    pub text: String,
    pub consequence: String,
}

// Models sometimes answer with bare strings instead of objects
#[derive(Deserialize)]
#[serde(untagged)]
enum ChoiceRepr {
    Text(String),
    Full {
        text: String,
        #[serde(default)]
        consequence: String,
    },
}

impl From<ChoiceRepr> for SceneChoice {
    fn from(repr: ChoiceRepr) -> Self {
        match repr {
            ChoiceRepr::Text(text) => Self {
                text,
                consequence: String::new(),
            },
            ChoiceRepr::Full { text, consequence } => Self { text, consequence },
        }
    }
}

impl SceneResponse {
    /// The canned answer shown while the engine recovers from a failure
    pub fn technical_fallback() -> Self {
        Self {
            scene_description: "Произошла ошибка при генерации".to_string(),
            character_name: SYSTEM_SPEAKER.to_string(),
            dialog: "Пожалуйста, подождите...".to_string(),
            emotion: "neutral".to_string(),
            mood: "technical".to_string(),
            time_of_day: "не указано".to_string(),
            choices: vec![SceneChoice {
                text: "Продолжить".to_string(),
                consequence: "Повторная попытка генерации".to_string(),
            }],
            ..Default::default()
        }
    }

    /// Whether this answer reports a system failure rather than story content
    pub fn is_technical(&self) -> bool {
        let scene = self.scene_description.to_lowercase();
        let mood = self.mood.to_lowercase();
        let dialog = self.dialog.to_lowercase();
        let choices = self
            .choices
            .iter()
            .map(|c| format!("{} {}", c.text, c.consequence).to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        self.character_name == SYSTEM_SPEAKER
            || contains_word_start(&scene, ERROR_WORDS)
            || contains_any(&mood, TECHNICAL_MOODS)
            || contains_any(&dialog, CONNECTION_FAILURES)
            || contains_any(&choices, RETRY_OFFERS)
    }
}

/// Whether a player's choice only asks to retry a failed generation
pub fn is_retry_choice(choice: &str) -> bool {
    contains_any(&choice.to_lowercase(), RETRY_CHOICES)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn contains_word_start(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| {
        haystack.match_indices(needle).any(|(at, _)| {
            haystack[..at]
                .chars()
                .next_back()
                .map_or(true, |previous| !previous.is_alphanumeric())
        })
    })
}
