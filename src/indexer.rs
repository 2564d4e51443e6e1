use std::path::Path;

use globset::GlobMatcher;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    chunk_store::{BuiltIndex, ChunkRecord, IndexPaths},
    chunking::{ChunkingConfig, chunk_text},
    embedding::{Embedder, embed_passages},
    error::{Error, Result},
    loader::load_document,
    text_util::truncate_chars,
    vector_index::VectorIndex,
    walker::{DiscoveredFile, discover_files},
};

/// Location recorded when a posting has no `Location:` line.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Only this many non-empty lines are scanned for a title line.
const TITLE_SCAN_LINES: usize = 20;

/// Maximum length of a title taken from the first line.
const MAX_TITLE_CHARS: usize = 120;

const TITLE_PREFIXES: &[&str] = &["job title:", "titel:"];
const LOCATION_PREFIX: &str = "location:";

/// A job posting loaded from disk.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub job_file: String,
    pub stem: String,
    pub text: String,
}

/// Counts reported after an indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub discovered: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub embedding_model: String,
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Extract a title from posting text.
///
/// Looks for a `Job Title:` or `Titel:` line among the first non-empty
/// lines, then falls back to the first line, then to `stem`. A title line
/// with nothing after the colon also falls back to `stem`.
pub fn extract_title(text: &str, stem: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    for line in lines.iter().take(TITLE_SCAN_LINES) {
        if TITLE_PREFIXES
            .iter()
            .any(|p| starts_with_ignore_case(line, p))
        {
            let value = line.split_once(':').map_or("", |(_, v)| v.trim());
            return if value.is_empty() {
                stem.to_string()
            } else {
                value.to_string()
            };
        }
    }

    match lines.first() {
        Some(first) => truncate_chars(first, MAX_TITLE_CHARS).to_string(),
        None => stem.to_string(),
    }
}

/// Extract the value of the first `Location:` line, or [`UNKNOWN_LOCATION`].
pub fn extract_location(text: &str) -> String {
    text.lines()
        .find(|line| starts_with_ignore_case(line, LOCATION_PREFIX))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

/// Load discovered files in parallel.
///
/// Unreadable and empty files are skipped with a warning. Output keeps the
/// order of `files`.
pub fn load_documents(files: &[DiscoveredFile]) -> Vec<SourceDocument> {
    files
        .par_iter()
        .filter_map(|file| {
            let job_file = file.job_file();
            match load_document(&file.absolute_path) {
                Ok(text) if text.is_empty() => {
                    warn!(file = %job_file, "skipping empty job posting");
                    None
                }
                Ok(text) => Some(SourceDocument {
                    stem: file.stem(),
                    job_file,
                    text,
                }),
                Err(e) => {
                    warn!(file = %job_file, error = %e, "skipping unreadable job posting");
                    None
                }
            }
        })
        .collect()
}

/// Chunk and embed documents into an index.
///
/// Chunk ids are assigned in document-then-chunk order and match vector
/// rows. Fails with [`Error::EmptyCorpus`] when no document yields a chunk.
pub fn build_index<E: Embedder + ?Sized>(
    corpus: &Path,
    documents: &[SourceDocument],
    embedder: &mut E,
    chunking: &ChunkingConfig,
) -> Result<BuiltIndex> {
    let mut records = Vec::new();

    for doc in documents {
        let title = extract_title(&doc.text, &doc.stem);
        let location = extract_location(&doc.text);
        let chunks = chunk_text(&doc.text, chunking.chunk_size, chunking.overlap);
        debug!(file = %doc.job_file, chunks = chunks.len(), "chunked posting");

        for text in chunks {
            records.push(ChunkRecord {
                chunk_id: records.len(),
                job_file: doc.job_file.clone(),
                job_title: title.clone(),
                location: location.clone(),
                text,
            });
        }
    }

    if records.is_empty() {
        return Err(Error::EmptyCorpus {
            path: corpus.to_path_buf(),
        });
    }

    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    info!(chunks = texts.len(), model = embedder.model_id(), "embedding chunks");
    let vectors = embed_passages(embedder, &texts)?;

    let dimension = vectors.first().map_or(0, Vec::len);
    let mut index = VectorIndex::new(dimension);
    index.add(&vectors)?;

    let built = BuiltIndex {
        index,
        records,
        model_id: embedder.model_id().to_string(),
    };
    built.validate()?;
    Ok(built)
}

/// Discover, load, chunk, embed and persist every posting under `jobs_dir`.
pub fn index_jobs<E: Embedder + ?Sized>(
    jobs_dir: &Path,
    filter: Option<&GlobMatcher>,
    embedder: &mut E,
    chunking: &ChunkingConfig,
    paths: &IndexPaths,
) -> Result<IndexSummary> {
    let files = discover_files(jobs_dir, filter)?;
    info!(files = files.len(), dir = %jobs_dir.display(), "discovered job postings");

    let documents = load_documents(&files);
    let built = build_index(jobs_dir, &documents, embedder, chunking)?;
    paths.save(&built)?;

    Ok(IndexSummary {
        discovered: files.len(),
        indexed: documents.len(),
        skipped: files.len() - documents.len(),
        chunks: built.records.len(),
        embedding_model: built.model_id,
    })
}
