//! Infrastructure layer - External adapters and implementations
//!
//! This layer contains:
//! - Ollama: streamed story text, translation and context analysis
//! - ComfyUI: illustration jobs and their progress feed
//! - WebSocket: the reader's book session
//! - HTTP: status routes
//! - Config: Application configuration
//! - State: Shared application state

pub mod comfyui;
pub mod config;
pub mod http;
pub mod ollama;
pub mod state;
pub mod websocket;
