//! Paragraph-then-sentence text chunking.
//!
//! [`Chunker`] splits raw text into retrieval-friendly segments of at most
//! `max_chars` grapheme clusters:
//!
//! 1. paragraphs (blank-line delimited) that already fit are kept whole
//! 2. longer paragraphs are split on `.`, `!` and `?`, and the sentence
//!    fragments are packed greedily, each flushed chunk ending in `.`
//! 3. a single sentence that still does not fit is packed word by word
//!
//! A word longer than `max_chars` is emitted whole rather than cut.

use unicode_segmentation::UnicodeSegmentation;

/// Default chunk bound for ingested documents.
pub const DEFAULT_MAX_CHARS: usize = 800;

/// Chunk bound used for text extracted from uploaded files.
pub const UPLOAD_MAX_CHARS: usize = 500;

/// Splits text into bounded chunks.
///
/// # Example
///
/// ```rust,ignore
/// use buddy_rag::Chunker;
///
/// let pieces = Chunker::new(800).chunk(&statement_text);
/// assert!(!pieces.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl Chunker {
    /// Create a chunker with the given bound, measured in grapheme clusters.
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// The configured bound.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into chunks.
    ///
    /// Never returns an empty `Vec`. When splitting produces nothing (empty
    /// or whitespace-only input, punctuation-only input) the result is the
    /// first `max_chars` graphemes of the raw input, so `""` yields `[""]`.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();

        for paragraph in paragraphs(text) {
            if grapheme_len(&paragraph) <= self.max_chars {
                chunks.push(paragraph);
            } else {
                self.split_paragraph(&paragraph, &mut chunks);
            }
        }

        if chunks.is_empty() {
            chunks.push(text.graphemes(true).take(self.max_chars).collect());
        }
        chunks
    }

    fn split_paragraph(&self, paragraph: &str, out: &mut Vec<String>) {
        let fragments = paragraph
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty());

        let mut buf = String::new();
        for fragment in fragments {
            // Room for the trailing '.' appended on flush.
            if grapheme_len(fragment) >= self.max_chars {
                flush_sentence(&mut buf, out);
                self.split_words(fragment, out);
                continue;
            }

            if buf.is_empty() {
                buf.push_str(fragment);
                continue;
            }

            let candidate_len = grapheme_len(&buf) + 2 + grapheme_len(fragment);
            if candidate_len < self.max_chars {
                buf.push_str(". ");
                buf.push_str(fragment);
            } else {
                flush_sentence(&mut buf, out);
                buf.push_str(fragment);
            }
        }
        flush_sentence(&mut buf, out);
    }

    fn split_words(&self, fragment: &str, out: &mut Vec<String>) {
        let mut buf = String::new();
        for word in fragment.split_whitespace() {
            if buf.is_empty() {
                buf.push_str(word);
            } else if grapheme_len(&buf) + 1 + grapheme_len(word) <= self.max_chars {
                buf.push(' ');
                buf.push_str(word);
            } else {
                out.push(std::mem::take(&mut buf));
                buf.push_str(word);
            }
        }
        if !buf.is_empty() {
            out.push(buf);
        }
    }
}

/// Split `text` into chunks of at most `max_chars` graphemes.
///
/// Shorthand for `Chunker::new(max_chars).chunk(text)`.
pub fn chunk(text: &str, max_chars: usize) -> Vec<String> {
    Chunker::new(max_chars).chunk(text)
}

/// Length of `text` in extended grapheme clusters.
pub fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

fn flush_sentence(buf: &mut String, out: &mut Vec<String>) {
    if !buf.is_empty() {
        buf.push('.');
        out.push(std::mem::take(buf));
    }
}

/// Blank-line delimited paragraphs, trimmed, empty ones dropped.
fn paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs.retain(|p| !p.is_empty());
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_single_empty_chunk() {
        assert_eq!(chunk("", 800), vec![String::new()]);
    }

    #[test]
    fn whitespace_only_input_falls_back_to_raw_prefix() {
        assert_eq!(chunk("   \n\n  ", 4), vec!["   \n".to_string()]);
    }

    #[test]
    fn short_paragraphs_are_kept_whole() {
        let text = "Goal: Emergency Fund.\n\nExpense: Food at Trader Joe's.";
        assert_eq!(
            chunk(text, 800),
            vec!["Goal: Emergency Fund.".to_string(), "Expense: Food at Trader Joe's.".to_string()]
        );
    }

    #[test]
    fn lines_without_blank_separator_stay_in_one_paragraph() {
        let text = "line one\nline two";
        assert_eq!(chunk(text, 800), vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn long_paragraph_splits_on_sentences() {
        let sentence = "This sentence is exactly fifty characters long now";
        let paragraph = std::iter::repeat_n(sentence, 48).collect::<Vec<_>>().join(". ");
        assert!(grapheme_len(&paragraph) >= 2400);

        let chunks = chunk(&paragraph, 800);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(grapheme_len(c) <= 800, "chunk too long: {}", grapheme_len(c));
            assert!(c.ends_with('.'));
        }
    }

    #[test]
    fn overlong_sentence_is_packed_by_words() {
        let sentence = "word ".repeat(50);
        let chunks = chunk(sentence.trim(), 24);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| grapheme_len(c) <= 24));
    }

    #[test]
    fn overlong_token_is_emitted_whole() {
        let token = "x".repeat(30);
        let text = format!("short. {token}");
        let chunks = chunk(&text, 10);
        assert!(chunks.contains(&token));
    }

    #[test]
    fn graphemes_are_not_split() {
        // Each family emoji is one grapheme made of several code points.
        let family = "👨‍👩‍👧";
        let text = family.repeat(5);
        let chunks = chunk(&text, 800);
        assert_eq!(chunks, vec![text.clone()]);

        let words = vec![family.repeat(2); 4].join(" ");
        let packed = chunk(&words, 5);
        assert_eq!(packed.len(), 2);
        for c in &packed {
            assert!(grapheme_len(c) <= 5);
            assert!(c.replace(family, "").trim().is_empty());
        }
    }
}
