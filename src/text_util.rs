use std::sync::LazyLock;

use regex::Regex;

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

static LINE_ENDINGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n|\r").expect("valid regex"));

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Canonicalize whitespace in extracted document text.
///
/// Non-breaking spaces become plain spaces, runs of spaces and tabs collapse
/// to one space, line endings become `\n`, three or more newlines collapse
/// to a single blank line, and the result is trimmed.
///
/// # Examples
///
/// ```
/// use jobmatch::text_util::normalize;
///
/// assert_eq!(normalize("  Rust\u{a0}\tengineer\r\n\r\n\r\nBerlin "), "Rust engineer\n\nBerlin");
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = text.replace('\u{a0}', " ");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = LINE_ENDINGS.replace_all(&text, "\n");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Return at most `max_chars` leading characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Return at most `max_chars` trailing characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => text,
    }
}
