//! Runtime settings resolved from flags, environment, stored configuration
//! and defaults, in that order.

use std::{fmt, str::FromStr, time::Duration};

use serde::Serialize;

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
    llm::{DEFAULT_OLLAMA_URL, DEFAULT_TIMEOUT_SECS},
    matcher::DEFAULT_LLM_MODEL,
    model_manager::DEFAULT_MODEL_ID,
};

/// A persisted setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    LlmModel,
    OllamaUrl,
    EmbeddingModel,
    GenerationTimeoutSecs,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::LlmModel,
        SettingKey::OllamaUrl,
        SettingKey::EmbeddingModel,
        SettingKey::GenerationTimeoutSecs,
    ];

    /// Key in the settings table.
    pub fn name(self) -> &'static str {
        match self {
            Self::LlmModel => "llm_model",
            Self::OllamaUrl => "ollama_url",
            Self::EmbeddingModel => "embedding_model",
            Self::GenerationTimeoutSecs => "generation_timeout_secs",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Self::LlmModel => "JOBMATCH_LLM_MODEL",
            Self::OllamaUrl => "JOBMATCH_OLLAMA_URL",
            Self::EmbeddingModel => "JOBMATCH_EMBEDDING_MODEL",
            Self::GenerationTimeoutSecs => "JOBMATCH_TIMEOUT_SECS",
        }
    }

    /// Reject values that would fail later at use.
    pub fn validate(self, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::Config(format!("{self} must not be empty")));
        }
        match self {
            Self::OllamaUrl
                if !(value.starts_with("http://")
                    || value.starts_with("https://")) =>
            {
                Err(Error::Config(format!(
                    "{self} must start with http:// or https://, got '{value}'"
                )))
            }
            Self::GenerationTimeoutSecs => parse_timeout(value).map(|_| ()),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::NotFound {
                kind: "setting",
                name: s.to_string(),
            })
    }
}

fn parse_timeout(value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(Error::Config(format!(
            "generation timeout must be a positive number of seconds, got '{value}'"
        ))),
    }
}

/// Values given on the command line, which win over everything else.
#[derive(Debug, Clone, Default)]
pub struct SettingOverrides {
    pub llm_model: Option<String>,
    pub ollama_url: Option<String>,
    pub embedding_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub llm_model: String,
    pub ollama_url: String,
    /// Explicitly configured embedding model. When unset, indexing uses
    /// [`DEFAULT_MODEL_ID`] and queries use the model the index records.
    pub embedding_model: Option<String>,
    #[serde(rename = "generation_timeout_secs", serialize_with = "as_secs")]
    pub generation_timeout: Duration,
}

fn as_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl Settings {
    pub fn resolve(overrides: &SettingOverrides, db: &ConfigDb) -> Result<Self> {
        Self::resolve_with(overrides, db, |var| std::env::var(var).ok())
    }

    /// Like [`Settings::resolve`], reading environment variables through
    /// `env`.
    pub fn resolve_with(
        overrides: &SettingOverrides,
        db: &ConfigDb,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |key: SettingKey, flag: Option<String>| -> Result<Option<String>> {
            if let Some(value) = flag {
                return Ok(Some(value));
            }
            if let Some(value) = env(key.env_var()).filter(|v| !v.trim().is_empty()) {
                return Ok(Some(value));
            }
            db.get_setting(key.name())
        };

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => match lookup(SettingKey::GenerationTimeoutSecs, None)? {
                Some(value) => parse_timeout(&value)?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };

        Ok(Self {
            llm_model: lookup(SettingKey::LlmModel, overrides.llm_model.clone())?
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            ollama_url: lookup(SettingKey::OllamaUrl, overrides.ollama_url.clone())?
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            embedding_model: lookup(
                SettingKey::EmbeddingModel,
                overrides.embedding_model.clone(),
            )?,
            generation_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Embedding model for building a new index.
    pub fn indexing_model(&self) -> &str {
        self.embedding_model.as_deref().unwrap_or(DEFAULT_MODEL_ID)
    }

    /// Embedding model for querying an index built with `indexed`.
    pub fn query_model<'a>(&'a self, indexed: &'a str) -> &'a str {
        self.embedding_model.as_deref().unwrap_or(indexed)
    }
}
