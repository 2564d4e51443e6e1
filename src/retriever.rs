use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    chunk_store::{BuiltIndex, ChunkRecord, IndexPaths},
    embedding::{Embedder, embed_query},
    error::{Error, Result},
    vector_index::VectorIndex,
};

/// Evidence entries kept per job, earliest retrieved first.
pub const MAX_EVIDENCE_PER_JOB: usize = 3;

/// Raw chunks retrieved before grouping, never fewer than this.
pub const MIN_RETRIEVAL_BREADTH: usize = 40;

/// Raw chunks retrieved per requested job.
pub const RETRIEVAL_BREADTH_PER_JOB: usize = 12;

/// Number of raw chunks to retrieve when `top_jobs` jobs are wanted.
///
/// Postings usually contribute several chunks each, so retrieval is
/// widened to keep enough distinct jobs after grouping.
pub fn retrieval_breadth(top_jobs: usize) -> usize {
    MIN_RETRIEVAL_BREADTH.max(top_jobs.saturating_mul(RETRIEVAL_BREADTH_PER_JOB))
}

/// A chunk returned for a query, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    #[serde(flatten)]
    pub record: ChunkRecord,
    pub score: f32,
}

/// One retained evidence passage of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub text: String,
    pub score: f32,
}

/// Retrieval result for one job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_file: String,
    pub job_title: String,
    pub location: String,
    /// Score of the first chunk retrieved for this job.
    #[serde(rename = "score")]
    pub best_score: f32,
    #[serde(rename = "chunks")]
    pub evidence: Vec<Evidence>,
}

/// Which job locations survive grouping.
///
/// The two named filters match their labels exactly; any other label keeps
/// every location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LocationFilter {
    Berlin,
    #[default]
    BerlinOrRemote,
    Any(String),
}

impl LocationFilter {
    pub const BERLIN: &'static str = "Berlin";
    pub const BERLIN_OR_REMOTE: &'static str = "Berlin + Remote";

    pub fn parse(label: &str) -> Self {
        match label {
            Self::BERLIN => Self::Berlin,
            Self::BERLIN_OR_REMOTE => Self::BerlinOrRemote,
            other => Self::Any(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Berlin => Self::BERLIN,
            Self::BerlinOrRemote => Self::BERLIN_OR_REMOTE,
            Self::Any(label) => label,
        }
    }

    pub fn accepts(&self, location: &str) -> bool {
        let location = location.to_lowercase();
        match self {
            Self::Berlin => location.contains("berlin"),
            Self::BerlinOrRemote => {
                location.contains("berlin") || location.contains("remote")
            }
            Self::Any(_) => true,
        }
    }
}

impl fmt::Display for LocationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for LocationFilter {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Fold retrieved chunks into per-job results.
///
/// Chunks are visited in retrieval order. A job's score is the score of its
/// first visited chunk, and it keeps at most [`MAX_EVIDENCE_PER_JOB`]
/// evidence entries. Results are sorted by score, descending (ties keep
/// first-seen order), and truncated to `top_jobs`.
pub fn group_by_job(
    chunks: &[RetrievedChunk],
    top_jobs: usize,
    filter: &LocationFilter,
) -> Vec<JobResult> {
    let mut jobs: Vec<JobResult> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for chunk in chunks {
        let record = &chunk.record;
        if !filter.accepts(&record.location) {
            continue;
        }

        let pos = *positions.entry(record.job_file.as_str()).or_insert_with(|| {
            jobs.push(JobResult {
                job_file: record.job_file.clone(),
                job_title: record.job_title.clone(),
                location: record.location.clone(),
                best_score: chunk.score,
                evidence: Vec::new(),
            });
            jobs.len() - 1
        });

        let job = &mut jobs[pos];
        if job.evidence.len() < MAX_EVIDENCE_PER_JOB {
            job.evidence.push(Evidence {
                text: record.text.clone(),
                score: chunk.score,
            });
        }
    }

    jobs.sort_by(|a, b| {
        b.best_score
            .partial_cmp(&a.best_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    jobs.truncate(top_jobs);
    jobs
}

/// Read-only view of a persisted job index.
///
/// Safe to share across threads once opened.
#[derive(Debug)]
pub struct Retriever {
    index: VectorIndex,
    records: Vec<ChunkRecord>,
    model_id: String,
}

impl Retriever {
    pub fn open(paths: &IndexPaths) -> Result<Self> {
        Self::from_built(paths.load()?)
    }

    pub fn from_built(built: BuiltIndex) -> Result<Self> {
        built.validate()?;
        Ok(Self {
            index: built.index,
            records: built.records,
            model_id: built.model_id,
        })
    }

    /// Embedding model the index was built with.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fail unless `embedder` produces vectors in the index's space.
    pub fn ensure_model<E: Embedder + ?Sized>(&self, embedder: &E) -> Result<()> {
        if embedder.model_id() != self.model_id {
            return Err(Error::ModelMismatch {
                indexed: self.model_id.clone(),
                configured: embedder.model_id().to_string(),
            });
        }
        Ok(())
    }

    /// Retrieve the `k` chunks most similar to `query`, best first.
    pub fn search<E: Embedder + ?Sized>(
        &self,
        embedder: &mut E,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        self.ensure_model(&*embedder)?;
        let query_vector = embed_query(embedder, query)?;
        let neighbors = self.index.search(&query_vector, k)?;

        let chunks: Vec<RetrievedChunk> = neighbors
            .into_iter()
            .filter(|n| n.id >= 0)
            .filter_map(|n| {
                self.records.get(n.id as usize).map(|record| RetrievedChunk {
                    record: record.clone(),
                    score: n.score,
                })
            })
            .collect();

        debug!(k, hits = chunks.len(), "retrieved chunks");
        Ok(chunks)
    }

    /// Retrieve with the breadth rule and group into at most `top_jobs` jobs.
    pub fn search_jobs<E: Embedder + ?Sized>(
        &self,
        embedder: &mut E,
        query: &str,
        top_jobs: usize,
        filter: &LocationFilter,
    ) -> Result<Vec<JobResult>> {
        let chunks = self.search(embedder, query, retrieval_breadth(top_jobs))?;
        Ok(group_by_job(&chunks, top_jobs, filter))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        chunking::ChunkingConfig,
        indexer::{SourceDocument, build_index},
        testing::HashEmbedder,
    };

    fn chunk(job_file: &str, location: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            record: ChunkRecord {
                chunk_id: 0,
                job_file: job_file.to_string(),
                job_title: format!("{job_file} title"),
                location: location.to_string(),
                text: text.to_string(),
            },
            score,
        }
    }

    fn retriever_over(docs: &[(&str, &str)]) -> Retriever {
        let docs: Vec<SourceDocument> = docs
            .iter()
            .map(|(file, text)| SourceDocument {
                job_file: file.to_string(),
                stem: file.to_string(),
                text: text.to_string(),
            })
            .collect();
        let built = build_index(
            std::path::Path::new("jobs"),
            &docs,
            &mut HashEmbedder::default(),
            &ChunkingConfig::default(),
        )
        .unwrap();
        Retriever::from_built(built).unwrap()
    }

    #[test]
    fn breadth_has_a_floor() {
        assert_eq!(retrieval_breadth(1), 40);
        assert_eq!(retrieval_breadth(3), 40);
        assert_eq!(retrieval_breadth(4), 48);
        assert_eq!(retrieval_breadth(10), 120);
    }

    #[test]
    fn filter_labels_round_trip() {
        assert_eq!(LocationFilter::parse("Berlin"), LocationFilter::Berlin);
        assert_eq!(
            LocationFilter::parse("Berlin + Remote"),
            LocationFilter::BerlinOrRemote
        );
        let all = LocationFilter::parse("All");
        assert_eq!(all.label(), "All");
        assert!(all.accepts("Munich"));
        // labels are matched exactly
        assert_eq!(LocationFilter::parse("berlin").label(), "berlin");
        assert!(LocationFilter::parse("berlin").accepts("Hamburg"));
    }

    #[test]
    fn filter_matches_case_insensitively() {
        assert!(LocationFilter::Berlin.accepts("BERLIN, Germany"));
        assert!(!LocationFilter::Berlin.accepts("Remote (EU)"));
        assert!(LocationFilter::BerlinOrRemote.accepts("Remote (EU)"));
        assert!(!LocationFilter::BerlinOrRemote.accepts("Munich"));
    }

    #[test]
    fn best_score_is_first_seen_not_max() {
        let chunks = vec![
            chunk("a.txt", "Berlin", "a1", 0.5),
            chunk("b.txt", "Berlin", "b1", 0.4),
            chunk("a.txt", "Berlin", "a2", 0.9),
        ];
        let jobs = group_by_job(&chunks, 5, &LocationFilter::Berlin);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job_file, "a.txt");
        assert_eq!(jobs[0].best_score, 0.5);
        assert_eq!(jobs[0].evidence.len(), 2);
    }

    #[test]
    fn evidence_is_capped_keeping_earliest() {
        let chunks: Vec<_> = (0..5)
            .map(|i| chunk("a.txt", "Berlin", &format!("e{i}"), 0.9 - i as f32 * 0.1))
            .collect();
        let jobs = group_by_job(&chunks, 5, &LocationFilter::Berlin);
        let texts: Vec<&str> =
            jobs[0].evidence.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["e0", "e1", "e2"]);
    }

    #[test]
    fn filtered_chunks_do_not_create_jobs() {
        let chunks = vec![
            chunk("munich.txt", "Munich", "m", 0.99),
            chunk("remote.txt", "Remote", "r", 0.8),
            chunk("berlin.txt", "Berlin", "b", 0.7),
        ];
        let files = |filter: &LocationFilter| -> Vec<String> {
            group_by_job(&chunks, 10, filter)
                .into_iter()
                .map(|j| j.job_file)
                .collect()
        };
        assert_eq!(files(&LocationFilter::Berlin), vec!["berlin.txt"]);
        assert_eq!(
            files(&LocationFilter::BerlinOrRemote),
            vec!["remote.txt", "berlin.txt"]
        );
        assert_eq!(files(&LocationFilter::parse("All")).len(), 3);
    }

    #[test]
    fn results_are_sorted_and_truncated() {
        let chunks = vec![
            chunk("low.txt", "Berlin", "l", 0.1),
            chunk("high.txt", "Berlin", "h", 0.9),
            chunk("mid.txt", "Berlin", "m", 0.5),
        ];
        let jobs = group_by_job(&chunks, 2, &LocationFilter::Berlin);
        let files: Vec<&str> = jobs.iter().map(|j| j.job_file.as_str()).collect();
        assert_eq!(files, vec!["high.txt", "mid.txt"]);
    }

    #[test]
    fn job_result_serializes_with_short_names() {
        let jobs = group_by_job(
            &[chunk("a.txt", "Berlin", "text", 0.25)],
            1,
            &LocationFilter::Berlin,
        );
        let json = serde_json::to_value(&jobs[0]).unwrap();
        assert_eq!(json["score"], 0.25);
        assert_eq!(json["chunks"][0]["text"], "text");
        assert_eq!(json["job_title"], "a.txt title");
    }

    #[test]
    fn search_ranks_matching_posting_first() {
        let retriever = retriever_over(&[
            ("python.txt", "Location: Berlin\n\nPython Django developer"),
            ("chef.txt", "Location: Berlin\n\nPastry chef for bakery"),
        ]);
        let mut embedder = HashEmbedder::default();
        let hits = retriever.search(&mut embedder, "python django", 5).unwrap();

        // only two rows exist, missing slots are dropped
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.job_file, "python.txt");
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(embedder.seen(), vec!["query: python django"]);
    }

    #[test]
    fn search_rejects_other_embedding_model() {
        let retriever = retriever_over(&[("a.txt", "Rust")]);
        let mut other = HashEmbedder::with_model_id("other/model");
        let err = retriever.search(&mut other, "rust", 5).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }));
        assert!(other.seen().is_empty());
    }

    #[test]
    fn search_jobs_groups_hits() {
        let retriever = retriever_over(&[
            ("a.txt", "Location: Berlin\n\nPython"),
            ("b.txt", "Location: Munich\n\nPython"),
        ]);
        let jobs = retriever
            .search_jobs(
                &mut HashEmbedder::default(),
                "python",
                5,
                &LocationFilter::Berlin,
            )
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_file, "a.txt");
        assert_eq!(jobs[0].location, "Berlin");
    }

    fn arb_chunks() -> impl Strategy<Value = Vec<RetrievedChunk>> {
        let locations = prop::sample::select(vec![
            "Berlin",
            "Berlin, Germany",
            "Remote",
            "Munich",
            "Hamburg (hybrid)",
            "Unknown",
        ]);
        prop::collection::vec(
            (0usize..8, locations, -1.0f32..1.0),
            0..60,
        )
        .prop_map(|items| {
            items
                .into_iter()
                .map(|(job, location, score)| {
                    chunk(&format!("job{job}.txt"), location, "evidence", score)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn berlin_filter_yields_only_berlin(chunks in arb_chunks(), top in 1usize..10) {
            for job in group_by_job(&chunks, top, &LocationFilter::Berlin) {
                prop_assert!(job.location.to_lowercase().contains("berlin"));
            }
        }

        #[test]
        fn grouping_respects_caps(chunks in arb_chunks(), top in 0usize..10) {
            let jobs = group_by_job(&chunks, top, &LocationFilter::parse("All"));
            prop_assert!(jobs.len() <= top);
            for job in &jobs {
                prop_assert!(!job.evidence.is_empty());
                prop_assert!(job.evidence.len() <= MAX_EVIDENCE_PER_JOB);
            }
            for pair in jobs.windows(2) {
                prop_assert!(pair[0].best_score >= pair[1].best_score);
            }
        }
    }
}
