use crate::retriever::JobResult;

const JOB_SEPARATOR: &str = "\n\n---\n\n";

/// Render a percentage the way it is shown to the model: at least one
/// decimal place, at most two.
pub fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        let two = format!("{value:.2}");
        two.strip_suffix('0').map(str::to_string).unwrap_or(two)
    }
}

fn evidence_block(job: &JobResult) -> String {
    let evidence = job
        .evidence
        .iter()
        .map(|e| format!("- Evidence (score={:.3}):\n{}", e.score, e.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "JOB FILE: {}\nJOB TITLE: {}\nLOCATION: {}\nTOP RETRIEVED EVIDENCE:\n{}",
        job.job_file, job.job_title, job.location, evidence
    )
}

/// Build the matching prompt for the generation model.
///
/// The prompt pins the number of `best_job_matches` entries to the number
/// of retrieved jobs and spells out the JSON schema expected back.
pub fn build_prompt(
    resume: &str,
    jobs: &[JobResult],
    keywords: &[String],
    coverage: f64,
) -> String {
    let context = jobs
        .iter()
        .map(evidence_block)
        .collect::<Vec<_>>()
        .join(JOB_SEPARATOR);
    let keyword_line = keywords.join(", ");
    let n_jobs = jobs.len();
    let coverage = format_percent(coverage);

    let prompt = format!(
        r#"You are an expert German job-market recruiter and ATS specialist.

TASK:
Given a candidate resume and retrieved German job description evidence, produce a structured matching report.

RULES:
- Use ONLY the provided resume + job evidence.
- Be realistic: do not invent experience.
- Output MUST be valid JSON only (no markdown, no commentary).
- Score is 0..100. Provide short, specific bullets.
- Use JOB KEYWORDS list as the primary source for "missing_keywords". Do not invent unrelated tools.
- Consider KEYWORD COVERAGE in your score (higher coverage generally means better match).
- You MUST return exactly {n_jobs} items in best_job_matches (one per JOB FILE in the evidence).
- Do NOT omit any job. If a job is weak, assign a low match_score and explain briefly.

JOB KEYWORDS (extracted from retrieved evidence):
{keyword_line}

KEYWORD COVERAGE (job keywords found in resume):
{coverage}%

RESUME:
{resume}

RETRIEVED JOB EVIDENCE:
{context}

OUTPUT JSON SCHEMA:
{{
  "overall_summary": "string",
  "best_job_matches": [
    {{
      "job_file": "string",
      "job_title": "string",
      "match_score": number,
      "why_match": ["bullet", "..."],
      "skill_gaps": ["bullet", "..."],
      "missing_keywords": ["keyword", "..."],
      "tailored_cv_suggestions": ["bullet", "..."]
    }}
  ]
}}"#
    );
    prompt.trim().to_string()
}
