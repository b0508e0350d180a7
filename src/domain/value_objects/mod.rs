//! Value objects - Immutable objects defined by their attributes

mod ids;
mod scene;
mod settings;

pub use ids::*;
pub use scene::{is_retry_choice, SceneResponse};
pub use settings::{ConnectionParams, GenerationParams, ImageParams, Tunables};
