//! Extraction of JSON objects from model output
//!
//! Models wrap their JSON in prose or code fences often enough that a plain
//! `serde_json::from_str` is not sufficient.

use serde::de::DeserializeOwned;

/// Parse `raw` as `T`, falling back to its outermost `{...}` substring
pub fn parse_json_object<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let candidate = outermost_object(trimmed)?;
    match serde_json::from_str(candidate) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Failed to parse JSON from model output: {}", e);
            None
        }
    }
}

/// The substring from the first `{` to the last `}`
pub fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
