//! Paragraph-aware chunking of job postings into overlapping passages.
//!
//! Postings are split on blank lines and paragraphs are packed greedily into
//! passages of at most `chunk_size` characters. A paragraph that is longer
//! than `chunk_size` on its own is hard-split at fixed character offsets.
//! Every passage after the first then carries the last `overlap` characters
//! of the passage before it, so evidence that straddles a boundary is still
//! retrievable.
//!
//! All sizes are counted in characters, not bytes.

use serde::{Deserialize, Serialize};

use crate::text_util::{normalize, tail_chars};

/// Default maximum passage size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 900;

/// Default overlap between adjacent passages in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Separator used when packing several paragraphs into one passage.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Chunking parameters used by the indexer.
///
/// # Examples
///
/// ```
/// use jobmatch::chunking::{ChunkingConfig, DEFAULT_CHUNK_SIZE};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum passage size in characters (before the overlap prefix).
    pub chunk_size: usize,
    /// Characters carried over from the previous passage.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split text into overlapping, paragraph-aware passages.
///
/// The input is normalized first. Returns an empty vector for empty input.
///
/// # Examples
///
/// ```
/// use jobmatch::chunking::chunk_text;
///
/// // Short text stays in one passage
/// let chunks = chunk_text("Rust developer\n\nBerlin", 900, 150);
/// assert_eq!(chunks, vec!["Rust developer\n\nBerlin".to_string()]);
///
/// // Long paragraphs are hard-split
/// let text = "x".repeat(2000);
/// assert!(chunk_text(&text, 900, 150).len() >= 3);
///
/// assert!(chunk_text("", 900, 150).is_empty());
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = normalize(text);
    if text.is_empty() {
        return Vec::new();
    }

    let base = pack_paragraphs(&text, chunk_size, overlap);
    apply_overlap(base, overlap)
}

/// Greedily pack paragraphs into passages without the overlap prefix.
fn pack_paragraphs(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for paragraph in text
        .split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let para_chars = paragraph.chars().count();

        if buf_chars + para_chars + 2 <= chunk_size {
            if !buf.is_empty() {
                buf.push_str(PARAGRAPH_SEPARATOR);
                buf_chars += 2;
            }
            buf.push_str(paragraph);
            buf_chars += para_chars;
            continue;
        }

        flush(&mut chunks, &mut buf);
        buf_chars = 0;

        if para_chars <= chunk_size {
            buf.push_str(paragraph);
            buf_chars = para_chars;
        } else {
            hard_split(paragraph, chunk_size, overlap, &mut chunks);
        }
    }

    flush(&mut chunks, &mut buf);
    chunks
}

fn flush(chunks: &mut Vec<String>, buf: &mut String) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    buf.clear();
}

/// Split an oversized paragraph into fixed windows of `chunk_size`
/// characters, stepping back `overlap` characters between windows.
///
/// The window start always advances by at least one character.
fn hard_split(
    paragraph: &str,
    chunk_size: usize,
    overlap: usize,
    chunks: &mut Vec<String>,
) {
    // char index -> byte index, with a trailing sentinel for the end
    let char_to_byte: Vec<usize> = paragraph
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(paragraph.len()))
        .collect();
    let char_count = char_to_byte.len() - 1;

    let mut start = 0usize;
    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        let piece = paragraph[char_to_byte[start]..char_to_byte[end]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
}

/// Prefix every passage after the first with the tail of the previous
/// output passage (which already carries its own prefix).
fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut out: Vec<String> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let joined = match out.last() {
            Some(prev) => {
                let tail = tail_chars(prev, overlap);
                format!("{tail}\n{chunk}").trim().to_string()
            }
            None => chunk,
        };
        if !joined.is_empty() {
            out.push(joined);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text(" \n\n \t ", 100, 10).is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 900, 150);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn paragraphs_are_packed_until_full() {
        // 10 + 2 + 10 = 22 fits in 25, the third paragraph does not
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc";
        let chunks = chunk_text(text, 25, 0);
        assert_eq!(chunks, vec!["aaaaaaaaaa\n\nbbbbbbbbbb", "cccccccccc"]);
    }

    #[test]
    fn packing_accounts_for_separator_on_first_paragraph() {
        // 9 + 2 > 10, so even the first paragraph is flushed immediately
        let chunks = chunk_text("aaaaaaaaa\n\nb", 10, 0);
        assert_eq!(chunks, vec!["aaaaaaaaa", "b"]);
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = "abcdefghij".repeat(3); // 30 chars, one paragraph
        let chunks = chunk_text(&text, 10, 0);
        assert_eq!(chunks, vec!["abcdefghij"; 3]);
    }

    #[test]
    fn hard_split_steps_back_by_overlap() {
        let text = "0123456789abcdefghij"; // 20 chars
        let mut pieces = Vec::new();
        hard_split(text, 10, 4, &mut pieces);
        assert_eq!(
            pieces,
            vec![
                "0123456789",
                "6789abcdef",
                "cdefghij",
                "ghij",
                "hij",
                "ij",
                "j"
            ]
        );
    }

    #[test]
    fn overlap_prefixes_tail_of_previous_output_chunk() {
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc";
        let chunks = chunk_text(text, 12, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "aaaaaaaaaa");
        assert_eq!(chunks[1], "aaa\nbbbbbbbbbb");
        // tail of the *prefixed* second chunk
        assert_eq!(chunks[2], "bbb\ncccccccccc");
    }

    #[test]
    fn overlap_longer_than_previous_chunk_takes_all_of_it() {
        let chunks = chunk_text("ab\n\ncdefghijkl", 10, 50);
        assert_eq!(chunks, vec!["ab", "ab\ncdefghijkl"]);
    }

    #[test]
    fn overlap_not_smaller_than_size_terminates() {
        let text = "x".repeat(50);
        let chunks = chunk_text(&text, 5, 5);
        assert!(!chunks.is_empty());
        let chunks = chunk_text(&text, 5, 100);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn handles_multibyte_characters() {
        let text = "Größenwahn über München ✓ ".repeat(40);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // 50 base chars + 10 prefix chars + newline
            assert!(chunk.chars().count() <= 61);
        }
    }

    #[test]
    fn default_config_matches_constants() {
        let config = ChunkingConfig::default();
        assert_eq!(config.chunk_size, 900);
        assert_eq!(config.overlap, 150);
    }

    fn words_text() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop::collection::vec("[a-zA-Z0-9]{1,8}", 1..30)
                .prop_map(|words| words.join(" ")),
            0..12,
        )
        .prop_map(|paragraphs| paragraphs.join("\n\n"))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn every_word_lands_in_some_chunk(
            text in words_text(),
            chunk_size in 20usize..200,
            overlap in 10usize..40,
        ) {
            let chunks = chunk_text(&text, chunk_size, overlap);
            for word in normalize(&text).split_whitespace() {
                prop_assert!(
                    chunks.iter().any(|c| c.contains(word)),
                    "word {word:?} missing from chunks"
                );
            }
        }

        #[test]
        fn chunking_terminates_for_any_overlap(
            text in "[a-z \n]{0,300}",
            chunk_size in 1usize..50,
            overlap in 0usize..100,
        ) {
            let chunks = chunk_text(&text, chunk_size, overlap);
            prop_assert!(chunks.iter().all(|c| !c.is_empty()));
        }

        #[test]
        fn base_chunks_respect_size(
            text in words_text(),
            chunk_size in 10usize..200,
        ) {
            for chunk in chunk_text(&text, chunk_size, 0) {
                prop_assert!(chunk.chars().count() <= chunk_size);
            }
        }
    }
}
