//! Application services - Use case implementations
//!
//! Each service depends only on the outbound ports, so the infrastructure
//! adapters (Ollama, ComfyUI) can be swapped for mocks in tests.

pub mod context_service;
pub mod illustration_service;
pub mod llm;
pub mod narrator_service;
pub mod story_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use context_service::ContextService;
pub use illustration_service::{GenerationStatus, IllustrationService, ProgressCallback};
pub use narrator_service::{NarratorService, SegmentUpdate};
pub use story_service::StoryService;
