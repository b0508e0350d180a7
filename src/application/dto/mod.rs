//! Data Transfer Objects - wire formats of the external servers

mod workflow;

pub use workflow::{JobGraph, SAVE_IMAGE_NODE};
