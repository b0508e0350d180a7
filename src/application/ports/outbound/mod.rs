//! Outbound ports - Interfaces that the application requires from external systems

mod image_port;
mod llm_port;

pub use image_port::{
    GeneratedImage, HistoryResponse, ImageGenError, ImageGenPort, MemoryStats, ProgressEvent,
    ProgressStream,
};
#[cfg(test)]
pub use image_port::{NodeOutput, PromptHistory};
pub use llm_port::{
    ConnectionStatus, GenerateRequest, GenerateResponse, LlmError, TextGenPort, TokenChunk,
    TokenStream,
};
