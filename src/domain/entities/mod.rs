//! Domain entities - Core story objects with identity

mod story_context;
mod story_event;
mod story_session;

pub use story_context::{ContextDisplay, CurrentState, StoryContext};
pub use story_event::StoryEventKind;
pub use story_session::StorySession;
