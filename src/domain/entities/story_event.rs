//! Story events - entries of a session's event log
//!
//! The log is what prompts are built from: every scene the model wrote, every
//! line of dialog, every choice the player made.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryEventKind {
    Scene,
    Dialog,
    Choice,
    Character,
    CharacterDescription,
    InitialSituation,
}

impl StoryEventKind {
    /// Label used when the event is quoted back to the model
    pub fn prompt_label(&self) -> Option<&'static str> {
        match self {
            Self::Scene => Some("Scene"),
            Self::Dialog => Some("Dialog"),
            Self::Choice => Some("Player choice"),
            Self::Character | Self::CharacterDescription | Self::InitialSituation => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Dialog => "dialog",
            Self::Choice => "choice",
            Self::Character => "character",
            Self::CharacterDescription => "character_description",
            Self::InitialSituation => "initial_situation",
        }
    }
}

impl std::fmt::Display for StoryEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the event log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryEvent {
    pub kind: StoryEventKind,
    pub content: String,
    /// Log length at the time the event was appended
    pub index: usize,
    pub recorded_at: DateTime<Utc>,
}

impl StoryEvent {
    pub fn new(kind: StoryEventKind, content: impl Into<String>, index: usize) -> Self {
        Self {
            kind,
            content: content.into(),
            index,
            recorded_at: Utc::now(),
        }
    }

    /// `"<label>: <content>"`, or `None` for kinds that are not quoted in prompts
    pub fn prompt_line(&self) -> Option<String> {
        self.kind
            .prompt_label()
            .map(|label| format!("{}: {}", label, self.content))
    }
}
