use std::sync::LazyLock;

use regex::Regex;

use crate::text_util::{normalize, truncate_chars};

/// Substrings marking resume lines worth keeping in a compact query.
const SECTION_HINTS: &[&str] = &[
    "skills",
    "technical skills",
    "kompetenzen",
    "kenntnisse",
    "experience",
    "professional experience",
    "berufserfahrung",
    "projects",
    "projekte",
    "education",
    "ausbildung",
    "zertifikate",
    "certifications",
];

/// Lines at most this long count as dense skill lines.
const MAX_DENSE_LINE_CHARS: usize = 160;

/// Below this many characters the kept lines are replaced by the opening
/// lines of the resume.
const MIN_KEPT_CHARS: usize = 400;

const FALLBACK_LINES: usize = 30;

pub const DEFAULT_MAX_QUERY_CHARS: usize = 1800;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

fn is_signal_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if SECTION_HINTS.iter().any(|h| lower.contains(h)) {
        return true;
    }
    line.chars().count() <= MAX_DENSE_LINE_CHARS
        && (line.contains(',') || line.contains('-'))
}

/// Build a compact retrieval query from a resume.
///
/// Keeps section lines (skills, experience, projects, education and their
/// German names) and short comma or hyphen separated lines. If that leaves
/// too little text, the first lines of the resume are used instead.
///
/// # Examples
///
/// ```
/// use jobmatch::resume_query::extract_resume_query;
///
/// let query = extract_resume_query("Jane Doe\nSkills: Python, Docker", 1800);
/// assert_eq!(query, "Jane Doe Skills: Python, Docker");
/// ```
pub fn extract_resume_query(resume: &str, max_chars: usize) -> String {
    let text = normalize(resume);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut kept: Vec<&str> =
        lines.iter().copied().filter(|l| is_signal_line(l)).collect();
    if kept.join(" ").chars().count() < MIN_KEPT_CHARS {
        kept = lines.iter().copied().take(FALLBACK_LINES).collect();
    }

    let joined = kept.join(" ");
    let query = WHITESPACE_RUN.replace_all(&joined, " ");
    truncate_chars(query.trim(), max_chars).to_string()
}
