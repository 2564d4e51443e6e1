//! Grounded keyword extraction from retrieved job evidence, and the
//! deterministic coverage score of those keywords against a resume.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Candidate keyword tokens: a letter followed by 1 to 25 letters, digits
/// or `+ # . - /`, so `C++`, `CI/CD` and `Node.js` survive intact.
static KEYWORD_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z0-9+#./\-]{1,25}").expect("valid regex")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Posting boilerplate that is never a useful keyword. Matched
/// case-sensitively.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "Job",
    "Title",
    "Location",
    "Employment",
    "Type",
    "Company",
    "Description",
    "Responsibilities",
    "Requirements",
    "Nice",
    "Have",
    "Salary",
    "Keywords",
    "Germany",
    "Remote",
];

pub const DEFAULT_MAX_KEYWORDS: usize = 80;

const MIN_KEYWORD_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordConfig {
    pub stop_words: Vec<String>,
    pub max_keywords: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            stop_words: DEFAULT_STOP_WORDS
                .iter()
                .map(|w| w.to_string())
                .collect(),
            max_keywords: DEFAULT_MAX_KEYWORDS,
        }
    }
}

/// Extract keywords from evidence text.
///
/// Tokens keep the casing of their first occurrence; later occurrences that
/// differ only by case are dropped. At most `config.max_keywords` are
/// returned.
///
/// # Examples
///
/// ```
/// use jobmatch::keywords::{KeywordConfig, extract_keywords};
///
/// let kws = extract_keywords(
///     "Job Title: Engineer. Python, docker, Docker and CI/CD",
///     &KeywordConfig::default(),
/// );
/// assert_eq!(kws, vec!["Engineer.", "Python", "docker", "and", "CI/CD"]);
/// ```
pub fn extract_keywords(evidence: &str, config: &KeywordConfig) -> Vec<String> {
    let stop: HashSet<&str> =
        config.stop_words.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    KEYWORD_TOKEN
        .find_iter(evidence)
        .map(|m| m.as_str())
        .filter(|token| !stop.contains(token))
        .filter(|token| token.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|token| seen.insert(token.to_lowercase()))
        .take(config.max_keywords)
        .map(str::to_string)
        .collect()
}

fn fold_for_coverage(text: &str) -> String {
    WHITESPACE_RUN
        .replace_all(&text.to_lowercase(), " ")
        .into_owned()
}

/// Percentage of `keywords` found in `resume`, rounded to two decimals.
///
/// Both sides are lowercased with whitespace runs collapsed to one space
/// before a substring test. An empty keyword list scores `0.0`.
///
/// # Examples
///
/// ```
/// use jobmatch::keywords::keyword_coverage;
///
/// let kws = vec!["Python".to_string(), "Docker".to_string(), "Go".to_string()];
/// assert_eq!(keyword_coverage("python and DOCKER", &kws), 66.67);
/// assert_eq!(keyword_coverage("anything", &[]), 0.0);
/// ```
pub fn keyword_coverage(resume: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }

    let resume = fold_for_coverage(resume);
    let hits = keywords
        .iter()
        .filter(|kw| resume.contains(&fold_for_coverage(kw)))
        .count();

    // Half-way values round to even, so 3.125 reports as 3.12.
    let percent = hits as f64 / keywords.len() as f64 * 100.0;
    (percent * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn keeps_special_characters_in_tokens() {
        let kws = extract_keywords(
            "Skills: C++, C#, Node.js, CI/CD, k8s-operator",
            &KeywordConfig::default(),
        );
        assert_eq!(
            kws,
            kw(&["Skills", "C++", "C#", "Node.js", "CI/CD", "k8s-operator"])
        );
    }

    #[test]
    fn stop_words_are_case_sensitive() {
        let kws = extract_keywords(
            "Remote Germany remote Location",
            &KeywordConfig::default(),
        );
        assert_eq!(kws, kw(&["remote"]));
    }

    #[test]
    fn single_letters_are_dropped() {
        let kws = extract_keywords("a R b Go", &KeywordConfig::default());
        assert_eq!(kws, kw(&["Go"]));
    }

    #[test]
    fn dedupe_keeps_first_casing() {
        let kws =
            extract_keywords("python PYTHON Python", &KeywordConfig::default());
        assert_eq!(kws, kw(&["python"]));
    }

    #[test]
    fn cap_is_applied_after_dedupe() {
        let text: String =
            (0..100).map(|i| format!("tool{i} tool{i} ")).collect();
        let config = KeywordConfig {
            max_keywords: 5,
            ..KeywordConfig::default()
        };
        let kws = extract_keywords(&text, &config);
        assert_eq!(kws, kw(&["tool0", "tool1", "tool2", "tool3", "tool4"]));
        assert_eq!(
            extract_keywords(&text, &KeywordConfig::default()).len(),
            80
        );
    }

    #[test]
    fn long_tokens_are_split() {
        let long = "a".repeat(40);
        let kws = extract_keywords(&long, &KeywordConfig::default());
        // 26 characters, then the 14 character remainder
        assert_eq!(kws.len(), 2);
        assert_eq!(kws[0].len(), 26);
        assert_eq!(kws[1].len(), 14);
    }

    #[test]
    fn coverage_rounds_half_to_even() {
        let kws: Vec<String> = (0..32).map(|i| format!("skill{i:02}")).collect();
        assert_eq!(keyword_coverage("skill00", &kws), 3.12);
        assert_eq!(keyword_coverage("skill00 skill01 skill02", &kws), 9.38);
    }

    #[test]
    fn coverage_counts_substring_hits() {
        let kws = kw(&["Python", "Docker", "Kubernetes", "Terraform"]);
        assert_eq!(
            keyword_coverage("Python, Docker, Kubernetes experience", &kws),
            75.0
        );
    }

    #[test]
    fn coverage_collapses_whitespace() {
        let kws = kw(&["machine  learning"]);
        assert_eq!(keyword_coverage("Machine\n\tLearning", &kws), 100.0);
    }

    #[test]
    fn coverage_rounds_to_two_decimals() {
        let kws = kw(&["a1", "b2", "c3"]);
        assert_eq!(keyword_coverage("a1", &kws), 33.33);
    }

    #[test]
    fn coverage_of_empty_resume_is_zero() {
        assert_eq!(keyword_coverage("", &kw(&["Python"])), 0.0);
    }

    proptest! {
        #[test]
        fn coverage_is_a_percentage(
            resume in ".{0,200}",
            keywords in prop::collection::vec("[a-zA-Z]{1,10}", 0..20),
        ) {
            let score = keyword_coverage(&resume, &keywords);
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn coverage_ignores_case(
            resume in "[a-zA-Z ]{0,200}",
            keywords in prop::collection::vec("[a-zA-Z]{1,10}", 1..20),
        ) {
            prop_assert_eq!(
                keyword_coverage(&resume, &keywords),
                keyword_coverage(&resume.to_uppercase(), &keywords)
            );
        }

        #[test]
        fn empty_keyword_list_scores_zero(resume in ".{0,200}") {
            prop_assert_eq!(keyword_coverage(&resume, &[]), 0.0);
        }

        #[test]
        fn keywords_are_unique_ignoring_case(text in "[a-zA-Z ,.]{0,300}") {
            let kws = extract_keywords(&text, &KeywordConfig::default());
            let lowered: HashSet<String> =
                kws.iter().map(|k| k.to_lowercase()).collect();
            prop_assert_eq!(lowered.len(), kws.len());
            prop_assert!(kws.len() <= DEFAULT_MAX_KEYWORDS);
        }
    }
}
