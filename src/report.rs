//! Parsing and repair of the generation model's match report.
//!
//! Model output is untrusted text. [`reconcile`] turns any response into a
//! [`MatchReport`] with an entry for every retrieved job: the JSON object
//! is cut out of surrounding chatter, missing job identifiers are filled in
//! from retrieval, missing entries are padded with placeholders, and the
//! retrieval provenance is attached.

use std::fmt::Write;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{prompt::format_percent, retriever::JobResult, text_util::truncate_chars};

/// Summary used when the model output contains no usable JSON object.
pub const PARSE_FAILED_SUMMARY: &str =
    "Model did not return valid JSON. See raw_output.";

/// Sole `why_match` bullet of a padded entry.
pub const INSUFFICIENT_OUTPUT: &str =
    "Model returned insufficient structured output for this job.";

/// Characters of the raw response kept on a parse failure.
pub const RAW_OUTPUT_LIMIT: usize = 4000;

const MAX_SCORE: f64 = 100.0;

/// Retrieval facts attached to every report besides the jobs themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub keyword_coverage_percent: f64,
    pub retrieved_job_keywords: Vec<String>,
    pub location_filter: String,
}

fn job_files(jobs: &[JobResult]) -> Vec<String> {
    jobs.iter().map(|j| j.job_file.clone()).collect()
}

/// Assessment of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMatch {
    #[serde(default, deserialize_with = "lenient_string")]
    pub job_file: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub job_title: String,
    /// Always within 0-100.
    #[serde(default, deserialize_with = "lenient_score")]
    pub match_score: f64,
    #[serde(default, deserialize_with = "lenient_list")]
    pub why_match: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub skill_gaps: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub missing_keywords: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tailored_cv_suggestions: Vec<String>,
    /// Fields the model added beyond the schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobMatch {
    /// Placeholder for a job the model did not assess.
    pub fn placeholder(job: &JobResult) -> Self {
        Self {
            job_file: job.job_file.clone(),
            job_title: job.job_title.clone(),
            match_score: 0.0,
            why_match: vec![INSUFFICIENT_OUTPUT.to_string()],
            skill_gaps: Vec::new(),
            missing_keywords: Vec::new(),
            tailored_cv_suggestions: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// The reconciled match report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    #[serde(default, deserialize_with = "lenient_string")]
    pub overall_summary: String,
    #[serde(default)]
    pub best_job_matches: Vec<JobMatch>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub keyword_coverage_percent: f64,
    #[serde(default, deserialize_with = "lenient_list")]
    pub retrieved_job_keywords: Vec<String>,
    #[serde(default, deserialize_with = "lenient_jobs")]
    pub retrieved_jobs: Vec<JobResult>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub retrieved_job_files: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location_filter: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_optional_string"
    )]
    pub raw_output: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchReport {
    /// True when the model output could not be parsed at all.
    pub fn parse_failed(&self) -> bool {
        self.raw_output.is_some() && self.overall_summary == PARSE_FAILED_SUMMARY
    }

    /// Typed stub used when repair itself cannot produce a report.
    fn stub(raw: &str, jobs: &[JobResult], provenance: &Provenance) -> Self {
        Self {
            overall_summary: PARSE_FAILED_SUMMARY.to_string(),
            best_job_matches: jobs.iter().map(JobMatch::placeholder).collect(),
            keyword_coverage_percent: provenance.keyword_coverage_percent,
            retrieved_job_keywords: provenance.retrieved_job_keywords.clone(),
            retrieved_jobs: jobs.to_vec(),
            retrieved_job_files: job_files(jobs),
            location_filter: provenance.location_filter.clone(),
            raw_output: Some(truncate_chars(raw, RAW_OUTPUT_LIMIT).to_string()),
            extra: Map::new(),
        }
    }

    /// Retrieved job backing the given match, if any.
    pub fn job_for(&self, job_match: &JobMatch) -> Option<&JobResult> {
        self.retrieved_jobs
            .iter()
            .find(|j| j.job_file == job_match.job_file)
    }
}

/// Cut the outermost JSON object out of model output.
///
/// When a `{` precedes a later `}`, the text between the first `{` and the
/// last `}` is parsed; otherwise the whole trimmed text is. Returns `None`
/// unless the result is a JSON object.
///
/// # Examples
///
/// ```
/// use jobmatch::report::extract_json;
///
/// let obj = extract_json("Sure! {\"overall_summary\": \"ok\"} Hope it helps").unwrap();
/// assert_eq!(obj["overall_summary"], "ok");
///
/// assert!(extract_json("no json here").is_none());
/// assert!(extract_json("[1, 2]").is_none());
/// ```
pub fn extract_json(raw: &str) -> Option<Map<String, Value>> {
    let text = raw.trim();
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    };

    match serde_json::from_str(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn stub_object(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "overall_summary".into(),
        Value::String(PARSE_FAILED_SUMMARY.into()),
    );
    map.insert("best_job_matches".into(), Value::Array(Vec::new()));
    map.insert(
        "raw_output".into(),
        Value::String(truncate_chars(raw, RAW_OUTPUT_LIMIT).into()),
    );
    map
}

/// Insert `key` only when the model did not supply it.
fn set_default<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: T) {
    if map.contains_key(key) {
        return;
    }
    if let Ok(v) = serde_json::to_value(value) {
        map.insert(key.to_string(), v);
    }
}

fn backfill(entry: &mut Map<String, Value>, key: &str, value: &str) {
    if matches!(entry.get(key), None | Some(Value::Null)) {
        entry.insert(key.to_string(), Value::String(value.to_string()));
    }
}

/// Turn raw model output into a complete report for `jobs`.
///
/// Never fails. The result holds one entry per retrieved job, in order,
/// plus any extra entries the model produced. Values the model supplied
/// are never overwritten; provenance fields of an odd shape are coerced.
pub fn reconcile(
    raw: &str,
    jobs: &[JobResult],
    provenance: &Provenance,
) -> MatchReport {
    let mut data = extract_json(raw).unwrap_or_else(|| {
        warn!("model output is not a JSON object");
        stub_object(raw)
    });

    set_default(
        &mut data,
        "keyword_coverage_percent",
        provenance.keyword_coverage_percent,
    );
    set_default(
        &mut data,
        "retrieved_job_keywords",
        provenance.retrieved_job_keywords.clone(),
    );
    set_default(&mut data, "retrieved_jobs", jobs.to_vec());
    set_default(&mut data, "retrieved_job_files", job_files(jobs));
    set_default(
        &mut data,
        "location_filter",
        provenance.location_filter.clone(),
    );

    let mut entries = match data.remove("best_job_matches") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    for (i, item) in entries.iter_mut().enumerate() {
        if !item.is_object() {
            *item = Value::Object(Map::new());
        }
        if let (Some(job), Value::Object(entry)) = (jobs.get(i), item) {
            backfill(entry, "job_file", &job.job_file);
            backfill(entry, "job_title", &job.job_title);
        }
    }

    if entries.len() < jobs.len() {
        warn!(
            expected = jobs.len(),
            got = entries.len(),
            "padding match report with placeholders"
        );
        for job in &jobs[entries.len()..] {
            if let Ok(v) = serde_json::to_value(JobMatch::placeholder(job)) {
                entries.push(v);
            }
        }
    }
    data.insert("best_job_matches".into(), Value::Array(entries));

    match serde_json::from_value::<MatchReport>(Value::Object(data)) {
        Ok(report) if report.best_job_matches.len() >= jobs.len() => report,
        Ok(_) | Err(_) => MatchReport::stub(raw, jobs, provenance),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_optional_string<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let score = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .unwrap_or_default(),
        _ => 0.0,
    };
    Ok(if score.is_finite() {
        score.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    })
}

fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    fn item(v: Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().filter_map(item).collect(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => item(other).into_iter().collect(),
    })
}

/// Keeps the entries that parse as retrieved jobs and drops the rest.
fn lenient_jobs<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<JobResult>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Evidence characters shown per passage in text output.
const EVIDENCE_PREVIEW_CHARS: usize = 240;

fn bullets(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "   {heading}:");
    for item in items {
        let _ = writeln!(out, "     - {item}");
    }
}

/// Render a report as human-readable cards, one per job.
pub fn render_text(report: &MatchReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}\n", report.overall_summary.trim());
    let _ = writeln!(
        out,
        "Keyword coverage: {}% ({} keywords, filter: {})",
        format_percent(report.keyword_coverage_percent),
        report.retrieved_job_keywords.len(),
        report.location_filter
    );

    for (i, m) in report.best_job_matches.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n{:>2}. {} [{}]  score {:.0}/100",
            i + 1,
            m.job_title,
            m.job_file,
            m.match_score.clamp(0.0, MAX_SCORE)
        );
        bullets(&mut out, "Why it matches", &m.why_match);
        bullets(&mut out, "Skill gaps", &m.skill_gaps);
        if !m.missing_keywords.is_empty() {
            let _ = writeln!(
                out,
                "   Missing keywords: {}",
                m.missing_keywords.join(", ")
            );
        }
        bullets(&mut out, "CV suggestions", &m.tailored_cv_suggestions);

        if let Some(job) = report.job_for(m) {
            let _ = writeln!(out, "   Location: {}", job.location);
            for evidence in &job.evidence {
                let preview = truncate_chars(&evidence.text, EVIDENCE_PREVIEW_CHARS)
                    .replace('\n', " ");
                let _ = writeln!(
                    out,
                    "   Evidence (similarity {:.3}): {preview}",
                    evidence.score
                );
            }
        }
    }

    if let Some(raw) = &report.raw_output {
        let _ = writeln!(out, "\nRaw model output:\n{raw}");
    }

    out
}
