//! End-to-end resume matching: retrieval, keyword grounding, generation and
//! report repair.

use tracing::{info, warn};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    keywords::{KeywordConfig, extract_keywords, keyword_coverage},
    llm::{GenerationRequest, Generator},
    prompt::build_prompt,
    report::{MatchReport, Provenance, reconcile},
    resume_query::{DEFAULT_MAX_QUERY_CHARS, extract_resume_query},
    retriever::{JobResult, LocationFilter, Retriever},
};

pub const DEFAULT_LLM_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_TOP_JOBS: usize = 5;
pub const GENERATION_TEMPERATURE: f32 = 0.2;

/// One matching run.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub resume: String,
    pub top_jobs: usize,
    pub location_filter: LocationFilter,
    pub llm_model: String,
    /// Retrieve with a condensed query built from the resume's skill and
    /// experience lines instead of the full text.
    pub compact_query: bool,
}

impl MatchRequest {
    pub fn new(resume: impl Into<String>) -> Self {
        Self {
            resume: resume.into(),
            top_jobs: DEFAULT_TOP_JOBS,
            location_filter: LocationFilter::default(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            compact_query: false,
        }
    }

    fn retrieval_query(&self) -> String {
        if self.compact_query {
            extract_resume_query(&self.resume, DEFAULT_MAX_QUERY_CHARS)
        } else {
            self.resume.clone()
        }
    }
}

/// Retrieval half of a match: everything computed before generation.
#[derive(Debug, Clone)]
pub struct PreparedMatch {
    pub jobs: Vec<JobResult>,
    pub keywords: Vec<String>,
    pub coverage: f64,
    pub prompt: String,
}

/// Retrieve jobs for the resume, ground keywords in their evidence and
/// build the prompt. This is the only step that needs the embedder.
pub fn prepare_match<E>(
    request: &MatchRequest,
    retriever: &Retriever,
    embedder: &mut E,
    keyword_config: &KeywordConfig,
) -> Result<PreparedMatch>
where
    E: Embedder + ?Sized,
{
    if request.resume.trim().is_empty() {
        return Err(Error::EmptyResume);
    }

    let jobs = retriever.search_jobs(
        embedder,
        &request.retrieval_query(),
        request.top_jobs,
        &request.location_filter,
    )?;
    info!(
        jobs = jobs.len(),
        filter = %request.location_filter,
        "retrieved candidate jobs"
    );

    let evidence_text = jobs
        .iter()
        .flat_map(|job| job.evidence.iter().map(|e| e.text.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    let keywords = extract_keywords(&evidence_text, keyword_config);
    let coverage = keyword_coverage(&request.resume, &keywords);
    info!(keywords = keywords.len(), coverage, "scored keyword coverage");

    let prompt = build_prompt(&request.resume, &jobs, &keywords, coverage);
    Ok(PreparedMatch {
        jobs,
        keywords,
        coverage,
        prompt,
    })
}

impl PreparedMatch {
    /// Ask the model for an assessment and repair it into a full report.
    pub fn generate<G>(self, request: &MatchRequest, generator: &G) -> Result<MatchReport>
    where
        G: Generator + ?Sized,
    {
        let raw = generator.generate(&GenerationRequest {
            model: request.llm_model.clone(),
            prompt: self.prompt,
            temperature: GENERATION_TEMPERATURE,
        })?;

        let provenance = Provenance {
            keyword_coverage_percent: self.coverage,
            retrieved_job_keywords: self.keywords,
            location_filter: request.location_filter.label().to_string(),
        };
        let report = reconcile(&raw, &self.jobs, &provenance);
        if report.parse_failed() {
            warn!("model output could not be parsed; returning placeholder report");
        }

        Ok(report)
    }
}

/// Match a resume against the indexed postings.
///
/// Keywords and coverage are computed from the retrieved evidence and the
/// full resume, so the report is grounded even when the model output is
/// unusable. Fails on an empty resume, an index/model mismatch, or a
/// generation error.
pub fn match_resume<E, G>(
    request: &MatchRequest,
    retriever: &Retriever,
    embedder: &mut E,
    generator: &G,
    keyword_config: &KeywordConfig,
) -> Result<MatchReport>
where
    E: Embedder + ?Sized,
    G: Generator + ?Sized,
{
    prepare_match(request, retriever, embedder, keyword_config)?.generate(request, generator)
}
