//! Prompt construction and output handling for the text model

pub mod prompt_builder;
pub mod response_parser;
pub mod sentence_chunker;

pub use response_parser::parse_json_object;
pub use sentence_chunker::{split_sentences, ChunkerTail, SentenceChunker};
