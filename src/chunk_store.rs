//! Persistence for the job index: the vector file, the chunk metadata and
//! the embedding model identifier. The three files form one unit and are
//! always replaced together.

use std::{
    fs,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    vector_index::VectorIndex,
};

const INDEX_FILE: &str = "jobs.index";
const META_FILE: &str = "jobs_meta.jsonl";
const MODEL_FILE: &str = "embed_model.txt";
const TMP_SUFFIX: &str = "tmp";

/// Metadata for one indexed chunk. `chunk_id` equals the chunk's row in the
/// vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: usize,
    pub job_file: String,
    pub job_title: String,
    pub location: String,
    pub text: String,
}

/// A freshly built or loaded index with its metadata.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: VectorIndex,
    pub records: Vec<ChunkRecord>,
    pub model_id: String,
}

impl BuiltIndex {
    /// Check that vector rows and metadata records line up one to one.
    pub fn validate(&self) -> Result<()> {
        if self.index.len() != self.records.len() {
            return Err(Error::IndexCorrupt(format!(
                "vector index has {} rows but metadata has {} records",
                self.index.len(),
                self.records.len()
            )));
        }
        if let Some((row, record)) = self
            .records
            .iter()
            .enumerate()
            .find(|(row, r)| r.chunk_id != *row)
        {
            return Err(Error::IndexCorrupt(format!(
                "metadata line {row} carries chunk_id {}",
                record.chunk_id
            )));
        }
        Ok(())
    }
}

/// Locations of the index artifacts inside one directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    dir: PathBuf,
}

impl IndexPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_file(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn meta_file(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn model_file(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    /// True when all three artifacts are present.
    pub fn exists(&self) -> bool {
        self.index_file().is_file()
            && self.meta_file().is_file()
            && self.model_file().is_file()
    }

    /// Write all artifacts to temporary files, then rename them into place.
    ///
    /// Readers never observe a half-written file, although a crash between
    /// the renames can leave a mix of old and new artifacts; the row-count
    /// check on load catches that.
    pub fn save(&self, built: &BuiltIndex) -> Result<()> {
        built.validate()?;
        fs::create_dir_all(&self.dir)
            .map_err(|_| Error::DataDir(self.dir.clone()))?;

        let targets = [self.index_file(), self.meta_file(), self.model_file()];
        let temps: Vec<PathBuf> = targets.iter().map(|t| tmp_path(t)).collect();

        built.index.write(&temps[0])?;
        write_records(&temps[1], &built.records)?;
        fs::write(&temps[2], format!("{}\n", built.model_id))?;

        for (tmp, target) in temps.iter().zip(&targets) {
            fs::rename(tmp, target)?;
        }

        info!(
            rows = built.records.len(),
            dir = %self.dir.display(),
            "saved job index"
        );
        Ok(())
    }

    /// Load and cross-check all artifacts.
    pub fn load(&self) -> Result<BuiltIndex> {
        for path in [self.index_file(), self.meta_file(), self.model_file()] {
            if !path.is_file() {
                return Err(Error::IndexMissing { path });
            }
        }

        let index = VectorIndex::read(&self.index_file())?;
        let records = read_records(&self.meta_file())?;
        let model_id = self.read_model_id()?;

        let built = BuiltIndex {
            index,
            records,
            model_id,
        };
        built.validate()?;

        debug!(rows = built.records.len(), model = %built.model_id, "loaded job index");
        Ok(built)
    }

    /// Read only the recorded embedding model identifier.
    pub fn read_model_id(&self) -> Result<String> {
        let path = self.model_file();
        let contents = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::IndexMissing { path: path.clone() }
            } else {
                Error::Io(e)
            }
        })?;
        let model_id = contents.trim();
        if model_id.is_empty() {
            return Err(Error::IndexCorrupt(format!(
                "{} does not name an embedding model",
                path.display()
            )));
        }
        Ok(model_id.to_string())
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(TMP_SUFFIX);
    target.with_file_name(name)
}

/// Write one JSON object per line, in record order.
pub fn write_records(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    let mut out = BufWriter::new(fs::File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Read records written by [`write_records`]. Blank lines are ignored.
pub fn read_records(path: &Path) -> Result<Vec<ChunkRecord>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            Error::IndexCorrupt(format!(
                "{} line {}: {e}",
                path.display(),
                line_no + 1
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}
