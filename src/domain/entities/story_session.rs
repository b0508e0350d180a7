//! Story session state
//!
//! One session per connected reader. It owns the event log prompts are built
//! from, the phrases already used (for repetition checks), the error flag and
//! the chapter/choice counters. While the error flag is set the log is
//! frozen, so a technical failure never leaks into later prompts.

use crate::domain::entities::story_context::StoryContext;
use crate::domain::entities::story_event::{StoryEvent, StoryEventKind};
use crate::domain::services::RepetitionDetector;
use crate::domain::value_objects::{is_retry_choice, SessionId};

/// Prompt text used before anything has happened
pub const STORY_BEGINNING: &str = "The story is just beginning.";

#[derive(Debug, Clone)]
pub struct StorySession {
    id: SessionId,
    events: Vec<StoryEvent>,
    repetition: RepetitionDetector,
    error_state: bool,
    chapter: u32,
    choices: Vec<String>,
    choices_per_chapter: usize,
    context: StoryContext,
}

impl StorySession {
    pub fn new(similarity_threshold: f64, choices_per_chapter: usize) -> Self {
        Self {
            id: SessionId::new(),
            events: Vec::new(),
            repetition: RepetitionDetector::new(similarity_threshold),
            error_state: false,
            chapter: 1,
            choices: Vec::new(),
            choices_per_chapter: choices_per_chapter.max(1),
            context: StoryContext::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Start over: empty log, no used phrases, chapter one, error cleared
    pub fn reset(&mut self) {
        self.events.clear();
        self.repetition.clear();
        self.error_state = false;
        self.chapter = 1;
        self.choices.clear();
        self.context = StoryContext::new();
    }

    /// Append an event unless the session is in error state
    ///
    /// Returns whether the event was appended.
    pub fn add_to_context(&mut self, kind: StoryEventKind, content: &str) -> bool {
        if self.error_state {
            tracing::debug!(
                "Skipping event addition due to error state: {} - {}",
                kind,
                preview(content)
            );
            return false;
        }

        let event = StoryEvent::new(kind, content, self.events.len());
        self.events.push(event);
        tracing::debug!("Added event to context: {} - {}", kind, preview(content));
        true
    }

    /// Record a player choice
    ///
    /// Every choice counts towards chapters; only non-retry choices enter the
    /// event log.
    pub fn record_choice(&mut self, choice: &str) {
        self.choices.push(choice.to_string());
        if self.choices.len() % self.choices_per_chapter == 0 {
            self.chapter += 1;
            tracing::info!("Session {} entered chapter {}", self.id, self.chapter);
        }

        if !is_retry_choice(choice) {
            self.add_to_context(StoryEventKind::Choice, choice);
        }
    }

    /// Truncate the log to the `trim_size` most recent events once it exceeds `max_size`.
    /// The context timeline is held to the same limits.
    pub fn trim_history(&mut self, max_size: usize, trim_size: usize) {
        if self.events.len() > max_size {
            tracing::info!("Trimming history from {} to {}", self.events.len(), trim_size);
            let excess = self.events.len() - trim_size;
            self.events.drain(0..excess);
        }
        self.context.trim_timeline(max_size, trim_size);
    }

    pub fn mark_error(&mut self) {
        self.error_state = true;
    }

    pub fn clear_error(&mut self) {
        self.error_state = false;
    }

    pub fn is_error_state(&self) -> bool {
        self.error_state
    }

    /// Check generated text against earlier phrases, remembering it if new
    pub fn is_repetitive(&mut self, text: &str) -> bool {
        self.repetition.is_repetitive(text)
    }

    pub fn events(&self) -> &[StoryEvent] {
        &self.events
    }

    /// The last `count` events in log order
    pub fn recent_events(&self, count: usize) -> &[StoryEvent] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    /// Prompt lines for the last `count` scene, dialog and choice events
    pub fn format_recent_events(&self, count: usize) -> String {
        let lines: Vec<String> = self
            .recent_events(count)
            .iter()
            .filter_map(StoryEvent::prompt_line)
            .collect();

        if lines.is_empty() {
            STORY_BEGINNING.to_string()
        } else {
            lines.join("\n")
        }
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    /// The last `count` choices, oldest first
    pub fn recent_choices(&self, count: usize) -> &[String] {
        let start = self.choices.len().saturating_sub(count);
        &self.choices[start..]
    }

    pub fn context(&self) -> &StoryContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut StoryContext {
        &mut self.context
    }
}

fn preview(content: &str) -> String {
    let mut short: String = content.chars().take(50).collect();
    if content.chars().count() > 50 {
        short.push_str("...");
    }
    short
}
