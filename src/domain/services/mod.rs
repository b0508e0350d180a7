//! Domain services - Pure operations over story text

mod repetition;

pub use repetition::RepetitionDetector;
