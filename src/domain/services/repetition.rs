//! Phrase-level repetition detection
//!
//! A phrase is one `.`-separated fragment of generated text. Two phrases are
//! considered the same when the overlap of their lowercase word sets
//! (`|A ∩ B| / |A ∪ B|`) reaches the configured threshold.

use std::collections::HashSet;

/// Remembers every phrase the story has used so far
#[derive(Debug, Clone)]
pub struct RepetitionDetector {
    used_phrases: HashSet<String>,
    threshold: f64,
}

impl RepetitionDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            used_phrases: HashSet::new(),
            threshold,
        }
    }

    /// Check `text` against the used phrases
    ///
    /// Returns `true` if any phrase of `text` was used before or is similar
    /// to a used phrase. Otherwise records all phrases of `text` as used and
    /// returns `false`.
    pub fn is_repetitive(&mut self, text: &str) -> bool {
        let phrases = split_phrases(text);

        for phrase in &phrases {
            if self.used_phrases.contains(phrase) {
                return true;
            }
            if self
                .used_phrases
                .iter()
                .any(|used| similarity(phrase, used) >= self.threshold)
            {
                return true;
            }
        }

        self.used_phrases.extend(phrases);
        false
    }

    /// Whether two phrases share enough words to count as duplicates
    pub fn are_similar(&self, first: &str, second: &str) -> bool {
        similarity(first, second) >= self.threshold
    }

    pub fn used_count(&self) -> usize {
        self.used_phrases.len()
    }

    pub fn clear(&mut self) {
        self.used_phrases.clear();
    }
}

/// Split text into trimmed, non-empty `.`-separated phrases
pub fn split_phrases(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Word-set overlap ratio; `0.0` when both phrases have no words
pub fn similarity(first: &str, second: &str) -> f64 {
    let words_a = word_set(first);
    let words_b = word_set(second);

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    let common = words_a.intersection(&words_b).count();
    common as f64 / union as f64
}

fn word_set(phrase: &str) -> HashSet<String> {
    phrase.split_whitespace().map(str::to_lowercase).collect()
}
