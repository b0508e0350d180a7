//! Narrator Service - streaming book mode
//!
//! The model writes free prose followed by a `[CHOICES]` block. Prose is
//! forwarded sentence by sentence as it streams in; the choices are parsed
//! once the stream has closed.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;

use crate::application::ports::outbound::{GenerateRequest, LlmError, TextGenPort};
use crate::application::services::llm::prompt_builder::{
    build_segment_system_prompt, build_segment_user_prompt,
};
use crate::application::services::llm::{split_sentences, ChunkerTail, SentenceChunker};
use crate::domain::entities::{StoryEventKind, StorySession};
use crate::domain::value_objects::Tunables;

/// Incremental output of a segment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentUpdate {
    /// Newly completed text; `done` marks the last fragment
    Text { content: String, done: bool },
    /// The stream has closed
    Finished {
        full_text: String,
        choices: Vec<String>,
    },
}

/// A finished segment
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub full_text: String,
    pub choices: Vec<String>,
    /// The model failed and the pause text was shown instead
    pub failed: bool,
}

pub struct NarratorService {
    llm: Arc<dyn TextGenPort>,
    tunables: Arc<Tunables>,
}

impl NarratorService {
    pub fn new(llm: Arc<dyn TextGenPort>, tunables: Arc<Tunables>) -> Self {
        Self { llm, tunables }
    }

    /// Generate one segment, reporting progress through `on_update`
    ///
    /// `choice == None` starts a new story. Repetitive sentences are dropped
    /// from the output. The last `Text` update always has `done` set and is
    /// followed by exactly one `Finished`.
    pub async fn stream_segment<F>(
        &self,
        session: &mut StorySession,
        choice: Option<&str>,
        mut on_update: F,
    ) -> Segment
    where
        F: FnMut(SegmentUpdate) + Send,
    {
        let story = &self.tunables.story;

        match choice {
            Some(choice) => session.record_choice(choice),
            None => session.reset(),
        }

        let recent_events = session.format_recent_events(self.tunables.context.max_context_length);
        let user_prompt = build_segment_user_prompt(
            session.chapter(),
            session.recent_choices(story.recent_choices),
            &recent_events,
            choice,
        );
        let request = GenerateRequest::new(user_prompt, self.tunables.generation.clone())
            .with_system(build_segment_system_prompt(&story.language, story.choices_per_segment));

        let mut shown = String::new();
        let tail = match self.run_stream(session, request, &mut shown, &mut on_update).await {
            Ok(tail) => tail,
            Err(e) => {
                tracing::error!("Segment generation failed for session {}: {}", session.id(), e);
                return self.fail(session, on_update);
            }
        };

        let rest = if tail.rest.trim().is_empty() || session.is_repetitive(&tail.rest) {
            String::new()
        } else {
            tail.rest
        };
        shown.push_str(&rest);

        let full_text = shown.trim().to_string();
        if full_text.is_empty() {
            tracing::warn!("Model produced no usable text for session {}", session.id());
            return self.fail(session, on_update);
        }

        let mut choices = tail.choices;
        if choices.is_empty() {
            tracing::debug!("No choices in model output, using fallback choices");
            choices = story.fallback_choices.clone();
        }
        choices.truncate(story.choices_per_segment.max(1));

        session.clear_error();
        on_update(SegmentUpdate::Text {
            content: rest,
            done: true,
        });
        on_update(SegmentUpdate::Finished {
            full_text: full_text.clone(),
            choices: choices.clone(),
        });

        Segment {
            full_text,
            choices,
            failed: false,
        }
    }

    /// Record a finished segment in the event log
    pub fn complete_segment(&self, session: &mut StorySession, segment: &Segment) {
        if segment.failed {
            return;
        }
        session.add_to_context(StoryEventKind::Scene, &segment.full_text);
        let history = &self.tunables.history;
        session.trim_history(history.max_history_size, history.trim_size);
    }

    async fn run_stream<F>(
        &self,
        session: &mut StorySession,
        request: GenerateRequest,
        shown: &mut String,
        on_update: &mut F,
    ) -> Result<ChunkerTail, LlmError>
    where
        F: FnMut(SegmentUpdate) + Send,
    {
        let mut stream = self.llm.generate_stream(request).await?;
        let mut chunker = SentenceChunker::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(released) = chunker.push(&chunk.text) {
                let mut fresh = String::new();
                for sentence in split_sentences(&released) {
                    if sentence.trim().is_empty() {
                        fresh.push_str(sentence);
                    } else if session.is_repetitive(sentence) {
                        tracing::debug!("Suppressing repetitive sentence: {}", sentence.trim());
                    } else {
                        fresh.push_str(sentence);
                    }
                }
                if !fresh.trim().is_empty() {
                    shown.push_str(&fresh);
                    on_update(SegmentUpdate::Text {
                        content: fresh,
                        done: false,
                    });
                }
            }
            if chunk.done {
                break;
            }
        }

        Ok(chunker.finish())
    }

    fn fail<F>(&self, session: &mut StorySession, mut on_update: F) -> Segment
    where
        F: FnMut(SegmentUpdate),
    {
        session.mark_error();
        let story = &self.tunables.story;
        let full_text = story.pause_text.clone();
        let choices = story.fallback_choices.clone();

        on_update(SegmentUpdate::Text {
            content: full_text.clone(),
            done: true,
        });
        on_update(SegmentUpdate::Finished {
            full_text: full_text.clone(),
            choices: choices.clone(),
        });

        Segment {
            full_text,
            choices,
            failed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::ScriptedLlm;

    fn service(llm: ScriptedLlm) -> (NarratorService, Arc<ScriptedLlm>) {
        let llm = Arc::new(llm);
        let service = NarratorService::new(llm.clone(), Arc::new(Tunables::default()));
        (service, llm)
    }

    async fn run(
        service: &NarratorService,
        session: &mut StorySession,
        choice: Option<&str>,
    ) -> (Segment, Vec<SegmentUpdate>) {
        let mut updates = Vec::new();
        let segment = service
            .stream_segment(session, choice, |update| updates.push(update))
            .await;
        (segment, updates)
    }

    #[tokio::test]
    async fn test_streams_sentences_then_choices() {
        let (service, _) = service(ScriptedLlm::new().stream(&[
            "Ночь опустилась ",
            "на город. Анна ",
            "шла домой",
            "\n[CHOICES]\n1. Свернуть в переулок\n2. Идти дальше\n",
        ]));
        let mut session = StorySession::new(0.7, 3);

        let (segment, updates) = run(&service, &mut session, None).await;

        assert_eq!(
            updates,
            vec![
                SegmentUpdate::Text {
                    content: "Ночь опустилась на город.".into(),
                    done: false
                },
                SegmentUpdate::Text {
                    content: " Анна шла домой".into(),
                    done: true
                },
                SegmentUpdate::Finished {
                    full_text: "Ночь опустилась на город. Анна шла домой".into(),
                    choices: vec!["Свернуть в переулок".into(), "Идти дальше".into()],
                },
            ]
        );
        assert!(!segment.failed);
        assert!(!session.is_error_state());
    }

    #[tokio::test]
    async fn test_missing_choices_fall_back() {
        let (service, _) = service(ScriptedLlm::new().stream(&["Дождь стих."]));
        let mut session = StorySession::new(0.7, 3);

        let (segment, updates) = run(&service, &mut session, None).await;

        assert_eq!(segment.choices, Tunables::default().story.fallback_choices);
        assert_eq!(
            updates[1],
            SegmentUpdate::Text {
                content: String::new(),
                done: true
            }
        );
    }

    #[tokio::test]
    async fn test_broken_stream_marks_error_and_shows_pause() {
        let (service, _) = service(ScriptedLlm::new().broken_stream(&["Начало. "]));
        let mut session = StorySession::new(0.7, 3);

        let (segment, updates) = run(&service, &mut session, Some("Идти")).await;

        assert!(segment.failed);
        assert!(session.is_error_state());
        assert_eq!(segment.full_text, Tunables::default().story.pause_text);
        assert!(matches!(
            updates.last(),
            Some(SegmentUpdate::Finished { .. })
        ));
        let done_count = updates
            .iter()
            .filter(|u| matches!(u, SegmentUpdate::Text { done: true, .. }))
            .count();
        assert_eq!(done_count, 1);
    }

    #[tokio::test]
    async fn test_repetitive_sentences_are_dropped() {
        let (service, _) = service(
            ScriptedLlm::new()
                .stream(&["Старый дом молчал. [CHOICES]\nВойти"])
                .stream(&["Старый дом молчал. Скрипнула дверь. [CHOICES]\nВойти"]),
        );
        let mut session = StorySession::new(0.7, 3);

        run(&service, &mut session, None).await;
        let (segment, _) = run(&service, &mut session, Some("Войти")).await;

        assert_eq!(segment.full_text, "Скрипнула дверь.");
    }

    #[tokio::test]
    async fn test_prompt_carries_chapter_and_recent_choices() {
        let (service, llm) = service(
            ScriptedLlm::new()
                .stream(&["Начало. [CHOICES]\nА"])
                .stream(&["Дальше. [CHOICES]\nБ"]),
        );
        let mut session = StorySession::new(0.7, 3);

        let (first, _) = run(&service, &mut session, None).await;
        service.complete_segment(&mut session, &first);
        run(&service, &mut session, Some("Пойти к реке")).await;

        let request = &llm.requests()[1];
        assert!(request.prompt.contains("CURRENT CHAPTER: 1"));
        assert!(request.prompt.contains("- Пойти к реке"));
        assert!(request.prompt.contains("Scene: Начало."));
        assert!(request.system.as_deref().unwrap_or_default().contains("[CHOICES]"));
    }

    #[tokio::test]
    async fn test_complete_segment_records_scene() {
        let (service, _) = service(ScriptedLlm::new());
        let mut session = StorySession::new(0.7, 3);
        let segment = Segment {
            full_text: "Светало.".into(),
            choices: vec![],
            failed: false,
        };

        service.complete_segment(&mut session, &segment);
        service.complete_segment(
            &mut session,
            &Segment {
                failed: true,
                ..segment.clone()
            },
        );

        assert_eq!(session.events().len(), 1);
        assert_eq!(session.events()[0].kind, StoryEventKind::Scene);
    }
}
