//! Sentence chunking for streamed story text
//!
//! Token fragments arrive at arbitrary boundaries. The chunker buffers them
//! and releases text only up to the last completed sentence, so the reader
//! never sees half a word. Everything after the choices marker is held back
//! and parsed into choices once the stream ends.

use super::prompt_builder::CHOICES_MARKER;

const TERMINATORS: &[char] = &['.', '!', '?', '…'];
const CLOSERS: &[char] = &['"', '\'', '»', '”', '’', ')', ']'];
const LIST_MARKERS: &[char] = &['-', '*', '•', '–', '—'];

/// What is left once the stream has ended
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkerTail {
    /// Prose that was never released because no terminator followed it
    pub rest: String,
    /// Choices parsed from the block after the marker
    pub choices: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SentenceChunker {
    prose: String,
    released: usize,
    choices_block: Option<String>,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment; returns the newly completed sentences, if any
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if let Some(block) = &mut self.choices_block {
            block.push_str(fragment);
            return None;
        }

        self.prose.push_str(fragment);
        if let Some(at) = self.prose.find(CHOICES_MARKER) {
            let block = self.prose[at + CHOICES_MARKER.len()..].to_string();
            self.prose.truncate(at);
            self.choices_block = Some(block);
        }

        let pending = &self.prose[self.released..];
        let end = last_sentence_end(pending)?;
        let chunk = pending[..end].to_string();
        self.released += end;
        Some(chunk)
    }

    pub fn finish(self) -> ChunkerTail {
        let rest = self.prose[self.released..].trim_end().to_string();
        let choices = self
            .choices_block
            .as_deref()
            .map(parse_choices)
            .unwrap_or_default();
        ChunkerTail { rest, choices }
    }
}

/// Byte offset just past the last sentence terminator (and any closing quotes)
fn last_sentence_end(text: &str) -> Option<usize> {
    sentence_ends(text).last().copied()
}

fn sentence_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !TERMINATORS.contains(&c) {
            continue;
        }
        let mut boundary = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                boundary = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        ends.push(boundary);
    }

    ends
}

/// Split released text into sentences, keeping leading whitespace with each
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for end in sentence_ends(text) {
        sentences.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// One choice per non-empty line, list numbering and bullets removed
pub fn parse_choices(block: &str) -> Vec<String> {
    block
        .lines()
        .map(clean_choice_line)
        .filter(|line| !line.is_empty())
        .collect()
}

fn clean_choice_line(line: &str) -> String {
    let mut line = line.trim();

    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let after = &line[digits..];
        if let Some(stripped) = after.strip_prefix(&['.', ')'][..]) {
            line = stripped;
        }
    }
    line = line.trim().trim_start_matches(LIST_MARKERS).trim();
    line = line.trim_matches('*').trim();
    line = line
        .trim_matches(|c| c == '"' || c == '«' || c == '»')
        .trim();

    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_only_completed_sentences() {
        let mut chunker = SentenceChunker::new();

        assert_eq!(chunker.push("Ночь была "), None);
        assert_eq!(chunker.push("тёмной. Ветер"), Some("Ночь была тёмной.".to_string()));
        assert_eq!(chunker.push(" выл"), None);
        assert_eq!(
            chunker.push(" за окном! Кто"),
            Some(" Ветер выл за окном!".to_string())
        );

        let tail = chunker.finish();
        assert_eq!(tail.rest, " Кто");
        assert!(tail.choices.is_empty());
    }

    #[test]
    fn test_closing_quotes_stay_with_sentence() {
        let mut chunker = SentenceChunker::new();
        assert_eq!(
            chunker.push("«Кто здесь?» — спросила"),
            Some("«Кто здесь?»".to_string())
        );
        assert_eq!(chunker.push(" она…"), Some(" — спросила она…".to_string()));
    }

    #[test]
    fn test_marker_split_across_fragments() {
        let mut chunker = SentenceChunker::new();
        assert_eq!(chunker.push("Дверь открылась. [CHO"), Some("Дверь открылась.".to_string()));
        assert_eq!(chunker.push("ICES]\n1. Войти"), None);
        assert_eq!(chunker.push("\n2. Убежать.\n"), None);

        let tail = chunker.finish();
        assert_eq!(tail.rest, "");
        assert_eq!(tail.choices, vec!["Войти", "Убежать."]);
    }

    #[test]
    fn test_unterminated_prose_before_marker_is_rest() {
        let mut chunker = SentenceChunker::new();
        assert_eq!(chunker.push("Он ждал\n[CHOICES]\n- Ждать"), None);

        let tail = chunker.finish();
        assert_eq!(tail.rest, "Он ждал");
        assert_eq!(tail.choices, vec!["Ждать"]);
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("Тихо. Кто там?! Никого"),
            vec!["Тихо.", " Кто там?!", " Никого"]
        );
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn test_parse_choices_strips_markers() {
        let block = "\n1) **Открыть сундук**\n2. \"Позвать на помощь\"\n• Уйти\n\n* «Спрятаться»\n";
        assert_eq!(
            parse_choices(block),
            vec!["Открыть сундук", "Позвать на помощь", "Уйти", "Спрятаться"]
        );
    }

    #[test]
    fn test_numbers_inside_choice_are_kept() {
        assert_eq!(parse_choices("3 двери налево"), vec!["3 двери налево"]);
    }
}
