//! Text generation through a locally hosted Ollama server.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Generation requests fail after this many seconds by default.
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One non-streaming generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
}

/// A text generation backend.
pub trait Generator {
    /// Generate a completion for `request`. Returns the raw response text.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
}

/// Blocking client for the Ollama HTTP API.
///
/// Must not be used from inside an async runtime; wrap calls in
/// `spawn_blocking` there.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::Config(format!("could not build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn upstream(&self, e: impl std::fmt::Display) -> Error {
        Error::Upstream(format!("{e} (expected Ollama at {})", self.base_url))
    }

    /// True if the server answers its model listing within two seconds.
    pub fn is_reachable(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .is_ok_and(|r| r.status().is_success())
    }
}

impl Generator for OllamaClient {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };

        info!(model = %request.model, prompt_chars = request.prompt.len(), "requesting generation");
        let reply: GenerateReply = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.upstream(e))?
            .json()
            .map_err(|e| self.upstream(e))?;

        debug!(response_chars = reply.response.len(), "generation finished");
        Ok(reply.response)
    }
}
