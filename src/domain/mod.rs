//! Domain layer - Story state and pure narrative rules
//!
//! This layer contains:
//! - Entities: StorySession, StoryEvent, StoryContext
//! - Value Objects: identifiers, scene answers, tunable settings
//! - Domain Services: repetition detection

pub mod entities;
pub mod services;
pub mod value_objects;
