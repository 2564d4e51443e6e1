use std::path::{Path, PathBuf};

use crate::{
    chunk_store::IndexPaths,
    error::{Error, Result},
};

pub const DATA_DIR_ENV: &str = "JOBMATCH_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The JOBMATCH_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/jobmatch/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("jobmatch")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// Location of the job index. The directory is created on save.
    pub fn index(&self) -> IndexPaths {
        IndexPaths::new(self.root.join("index"))
    }
}
