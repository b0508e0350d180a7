//! Job graph for story illustrations
//!
//! The image server executes a node graph. Ours is fixed: load checkpoint,
//! encode positive and negative prompts, sample an empty latent, decode, save.
//! Node ids are strings because that is how the server keys them.

use serde_json::{json, Value};

use crate::domain::value_objects::ImageParams;

pub const SAMPLER_NODE: &str = "3";
pub const CHECKPOINT_NODE: &str = "4";
pub const LATENT_NODE: &str = "5";
pub const POSITIVE_PROMPT_NODE: &str = "6";
pub const NEGATIVE_PROMPT_NODE: &str = "7";
pub const VAE_DECODE_NODE: &str = "8";
pub const SAVE_IMAGE_NODE: &str = "9";

/// Parameters of one illustration job
#[derive(Debug, Clone, PartialEq)]
pub struct JobGraph {
    pub prompt: String,
    pub seed: u64,
    pub width: u32,
    pub height: u32,
}

impl JobGraph {
    /// Build the job for `prompt`
    ///
    /// A missing seed is drawn at random. Width and height are clamped to
    /// `settings.max_dimension` to keep GPU memory use bounded.
    pub fn story_illustration(
        settings: &ImageParams,
        prompt: impl Into<String>,
        seed: Option<u64>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            seed: seed.unwrap_or_else(rand::random::<u64>),
            width: width.min(settings.max_dimension),
            height: height.min(settings.max_dimension),
        }
    }

    /// Render the node graph in the server's wire format
    pub fn to_graph(&self, settings: &ImageParams) -> Value {
        json!({
            SAMPLER_NODE: {
                "inputs": {
                    "seed": self.seed,
                    "steps": settings.steps,
                    "cfg": settings.cfg,
                    "sampler_name": settings.sampler_name,
                    "scheduler": settings.scheduler,
                    "denoise": 1,
                    "model": [CHECKPOINT_NODE, 0],
                    "positive": [POSITIVE_PROMPT_NODE, 0],
                    "negative": [NEGATIVE_PROMPT_NODE, 0],
                    "latent_image": [LATENT_NODE, 0]
                },
                "class_type": "KSampler",
                "_meta": { "title": "KSampler" }
            },
            CHECKPOINT_NODE: {
                "inputs": { "ckpt_name": settings.checkpoint },
                "class_type": "CheckpointLoaderSimple",
                "_meta": { "title": "Load Checkpoint" }
            },
            LATENT_NODE: {
                "inputs": {
                    "width": self.width,
                    "height": self.height,
                    "batch_size": 1
                },
                "class_type": "EmptyLatentImage",
                "_meta": { "title": "Empty Latent Image" }
            },
            POSITIVE_PROMPT_NODE: {
                "inputs": {
                    "text": self.prompt,
                    "clip": [CHECKPOINT_NODE, 1]
                },
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "CLIP Text Encode (Prompt)" }
            },
            NEGATIVE_PROMPT_NODE: {
                "inputs": {
                    "text": settings.negative_prompt,
                    "clip": [CHECKPOINT_NODE, 1]
                },
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "CLIP Text Encode (Negative Prompt)" }
            },
            VAE_DECODE_NODE: {
                "inputs": {
                    "samples": [SAMPLER_NODE, 0],
                    "vae": [CHECKPOINT_NODE, 2]
                },
                "class_type": "VAEDecode",
                "_meta": { "title": "VAE Decode" }
            },
            SAVE_IMAGE_NODE: {
                "inputs": {
                    "filename_prefix": settings.filename_prefix,
                    "images": [VAE_DECODE_NODE, 0]
                },
                "class_type": "SaveImage",
                "_meta": { "title": "Save Image" }
            }
        })
    }
}
