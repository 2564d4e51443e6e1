use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error(
        "job index not found at {}; run `jobmatch index <jobs-dir>` to build it",
        path.display()
    )]
    IndexMissing { path: PathBuf },

    #[error("job index is corrupt: {0}; rebuild it with `jobmatch index`")]
    IndexCorrupt(String),

    #[error(
        "index was built with embedding model '{indexed}' but '{configured}' \
         is configured; rebuild the index or use --embedding-model {indexed}"
    )]
    ModelMismatch { indexed: String, configured: String },

    #[error("no indexable job postings found in {}", path.display())]
    EmptyCorpus { path: PathBuf },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation service unavailable: {0}")]
    Upstream(String),

    #[error("could not read {}: {reason}", path.display())]
    Ingestion { path: PathBuf, reason: String },

    #[error("no resume provided: the resume text is empty")]
    EmptyResume,
}
