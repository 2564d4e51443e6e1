//! jobmatch - match resumes against a local index of job postings.
//!
//! Job postings are chunked, embedded with a
//! [ColBERT](https://github.com/stanford-futuredata/ColBERT) model and
//! stored in a flat inner-product index. A resume is matched by retrieving
//! the closest postings, extracting keywords grounded in the retrieved
//! evidence, and asking a local [Ollama](https://ollama.com) model for a
//! structured report, which is repaired so every retrieved job is covered.
//!
//! # Quick start
//!
//! ```no_run
//! use jobmatch::{ConfigDb, DataDir, ModelManager, Retriever};
//! use jobmatch::keywords::KeywordConfig;
//! use jobmatch::llm::OllamaClient;
//! use jobmatch::matcher::{MatchRequest, match_resume};
//! use jobmatch::settings::{SettingOverrides, Settings};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
//! let settings = Settings::resolve(&SettingOverrides::default(), &config_db).unwrap();
//!
//! let retriever = Retriever::open(&data_dir.index()).unwrap();
//! let mut model = ModelManager::with_model_id(retriever.model_id().to_string());
//! let client =
//!     OllamaClient::new(&settings.ollama_url, settings.generation_timeout).unwrap();
//!
//! let request = MatchRequest::new("Python, Docker, Kubernetes experience in Berlin");
//! let report = match_resume(
//!     &request,
//!     &retriever,
//!     &mut model,
//!     &client,
//!     &KeywordConfig::default(),
//! )
//! .unwrap();
//! for m in &report.best_job_matches {
//!     println!("{} ({:.0}/100)", m.job_title, m.match_score);
//! }
//! ```

pub mod chunk_store;
pub mod chunking;
pub mod cli;
pub mod config_db;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod keywords;
pub mod llm;
pub mod loader;
pub mod matcher;
pub mod mcp;
pub mod model_manager;
pub mod prompt;
pub mod report;
pub mod resume_query;
pub mod retriever;
pub mod settings;
pub mod text_util;
pub mod vector_index;
pub mod walker;

#[cfg(test)]
mod testing;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use model_manager::ModelManager;
pub use retriever::Retriever;
