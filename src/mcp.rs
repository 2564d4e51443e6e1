use std::sync::{Arc, Mutex};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    data_dir::DataDir,
    embedding::Embedder,
    error,
    keywords::KeywordConfig,
    llm::{Generator, OllamaClient},
    matcher::{DEFAULT_TOP_JOBS, MatchRequest, prepare_match},
    model_manager::ModelManager,
    report::render_text,
    retriever::{JobResult, LocationFilter, Retriever},
    settings::Settings,
};

/// Builds a generation client per request, on a blocking thread.
type GeneratorFactory =
    Box<dyn Fn() -> error::Result<Box<dyn Generator>> + Send + Sync>;

struct JobmatchState {
    /// The index is loaded once; a load failure is kept and reported by
    /// every tool call.
    retriever: Result<Retriever, String>,
    embedder: Mutex<Box<dyn Embedder + Send>>,
    generator: GeneratorFactory,
    llm_model: String,
    keyword_config: KeywordConfig,
}

impl JobmatchState {
    fn retriever(&self) -> Result<&Retriever, String> {
        self.retriever.as_ref().map_err(Clone::clone)
    }
}

#[derive(Clone)]
pub struct JobmatchMcpServer {
    state: Arc<JobmatchState>,
    tool_router: ToolRouter<Self>,
}

impl JobmatchMcpServer {
    fn new(state: JobmatchState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }

    /// Run `work` against the shared state on the blocking pool.
    async fn blocking<T, F>(&self, work: F) -> Result<T, rmcp::ErrorData>
    where
        T: Send + 'static,
        F: FnOnce(&JobmatchState) -> T + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || work(&state))
            .await
            .map_err(|e| mcp_error("tool task failed", e))
    }
}

#[tool_router(router = tool_router)]
impl JobmatchMcpServer {
    /// Retrieve the job postings closest to a query, grouped per job.
    #[tool(
        name = "jobmatch_search",
        description = "Find indexed job postings semantically similar to a query (skills, role, resume excerpt). Returns per-job evidence passages with similarity scores. Does not call the language model."
    )]
    pub async fn jobmatch_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let filter = location_filter(params.location.as_deref());
        let top_jobs = params.top_jobs.unwrap_or(DEFAULT_TOP_JOBS);
        let query = params.query;

        let (query, filter, outcome) = self
            .blocking(move |state| {
                let outcome = search_jobs(state, &query, top_jobs, &filter);
                (query, filter, outcome)
            })
            .await?;

        let jobs = match outcome? {
            Ok(jobs) => jobs,
            Err(message) => return Ok(tool_failure(message)),
        };

        let summary = format_search_summary(&jobs, &query);
        let structured = serde_json::to_value(SearchResponse {
            query,
            location_filter: filter.label().to_string(),
            job_count: jobs.len(),
            jobs,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Produce a full match report for a resume.
    #[tool(
        name = "jobmatch_match",
        description = "Match resume text against the indexed job postings. Returns a JSON report with an overall summary, one scored assessment per retrieved job, grounded job keywords and keyword coverage."
    )]
    pub async fn jobmatch_match(
        &self,
        params: Parameters<MatchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;

        let outcome = self
            .blocking(move |state| {
                let request = MatchRequest {
                    resume: params.resume,
                    top_jobs: params.top_jobs.unwrap_or(DEFAULT_TOP_JOBS),
                    location_filter: location_filter(params.location.as_deref()),
                    llm_model: params
                        .model
                        .unwrap_or_else(|| state.llm_model.clone()),
                    compact_query: params.compact_query.unwrap_or(false),
                };
                run_match(state, &request)
            })
            .await?;

        let report = match outcome? {
            Ok(report) => report,
            Err(message) => return Ok(tool_failure(message)),
        };

        let structured = serde_json::to_value(&report)
            .map_err(|e| mcp_error("failed to serialize match report", e))?;

        let mut result = CallToolResult::success(vec![Content::text(render_text(&report))]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for JobmatchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("jobmatch", env!("CARGO_PKG_VERSION"))
                    .with_title("jobmatch MCP"),
            )
            .with_instructions(
                "Use jobmatch_search to explore indexed job postings and jobmatch_match to assess a resume against them. Location defaults to \"Berlin + Remote\".",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Free-text query.
    pub query: String,
    /// Maximum number of jobs (default: 5).
    pub top_jobs: Option<usize>,
    /// "Berlin", "Berlin + Remote" (default), or anything else for all
    /// locations.
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchParams {
    /// Full resume text.
    pub resume: String,
    /// Number of jobs to assess (default: 5).
    pub top_jobs: Option<usize>,
    /// "Berlin", "Berlin + Remote" (default), or anything else for all
    /// locations.
    pub location: Option<String>,
    /// Ollama model to use instead of the configured one.
    pub model: Option<String>,
    /// Retrieve with the resume's skill and experience lines only.
    pub compact_query: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    location_filter: String,
    job_count: usize,
    jobs: Vec<JobResult>,
}

fn location_filter(label: Option<&str>) -> LocationFilter {
    label.map(LocationFilter::parse).unwrap_or_default()
}

type Outcome<T> = Result<Result<T, String>, rmcp::ErrorData>;

fn search_jobs(
    state: &JobmatchState,
    query: &str,
    top_jobs: usize,
    filter: &LocationFilter,
) -> Outcome<Vec<JobResult>> {
    let retriever = match state.retriever() {
        Ok(r) => r,
        Err(message) => return Ok(Err(message)),
    };
    let mut embedder = state.embedder.lock().map_err(|_| {
        rmcp::ErrorData::internal_error("model lock poisoned", None)
    })?;

    Ok(retriever
        .search_jobs(&mut **embedder, query, top_jobs, filter)
        .map_err(|e| e.to_string()))
}

fn run_match(
    state: &JobmatchState,
    request: &MatchRequest,
) -> Outcome<crate::report::MatchReport> {
    let retriever = match state.retriever() {
        Ok(r) => r,
        Err(message) => return Ok(Err(message)),
    };
    let generator = match (state.generator)() {
        Ok(g) => g,
        Err(e) => return Ok(Err(e.to_string())),
    };
    let prepared = {
        let mut embedder = state.embedder.lock().map_err(|_| {
            rmcp::ErrorData::internal_error("model lock poisoned", None)
        })?;
        prepare_match(request, retriever, &mut **embedder, &state.keyword_config)
    };

    // The embedder lock is released before generation.
    Ok(prepared
        .and_then(|prepared| prepared.generate(request, generator.as_ref()))
        .map_err(|e| {
            warn!(error = %e, "match failed");
            e.to_string()
        }))
}

fn format_search_summary(jobs: &[JobResult], query: &str) -> String {
    if jobs.is_empty() {
        return format!("No jobs found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(jobs.len() + 1);
    let suffix = if jobs.len() == 1 { "" } else { "s" };
    lines.push(format!("Found {} job{} for \"{query}\":", jobs.len(), suffix));

    for job in jobs {
        lines.push(format!(
            "{:.3} {} {} ({})",
            job.best_score, job.job_file, job.job_title, job.location
        ));
    }

    lines.join("\n")
}

/// A failed tool call the client should see, as opposed to a protocol
/// error.
fn tool_failure(message: String) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message)])
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(data_dir: DataDir, settings: Settings) -> error::Result<()> {
    let retriever = Retriever::open(&data_dir.index()).map_err(|e| {
        warn!(error = %e, "job index unavailable; tools will report it");
        e.to_string()
    });
    let model_id = match &retriever {
        Ok(r) => settings.query_model(r.model_id()).to_string(),
        Err(_) => settings.indexing_model().to_string(),
    };
    if let Ok(r) = &retriever {
        info!(chunks = r.len(), model = %model_id, "loaded job index");
    }

    let ollama_url = settings.ollama_url.clone();
    let timeout = settings.generation_timeout;
    let state = JobmatchState {
        retriever,
        embedder: Mutex::new(Box::new(ModelManager::with_model_id(model_id))),
        generator: Box::new(move || -> error::Result<Box<dyn Generator>> {
            Ok(Box::new(OllamaClient::new(&ollama_url, timeout)?))
        }),
        llm_model: settings.llm_model,
        keyword_config: KeywordConfig::default(),
    };

    let server = JobmatchMcpServer::new(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
