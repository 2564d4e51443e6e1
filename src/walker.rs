use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};

use crate::error::{Error, Result};

/// A discovered job posting file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the jobs directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
}

impl DiscoveredFile {
    /// Identifier stored as `job_file` in the index metadata.
    pub fn job_file(&self) -> String {
        self.relative_path.to_string_lossy().replace('\\', "/")
    }

    /// File name without extension, used as the fallback title.
    pub fn stem(&self) -> String {
        self.relative_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.job_file())
    }
}

/// Compile an optional glob pattern used to narrow discovery.
pub fn compile_filter(pattern: Option<&str>) -> Result<Option<GlobMatcher>> {
    pattern
        .map(|p| {
            Glob::new(p)
                .map(|g| g.compile_matcher())
                .map_err(|e| {
                    Error::Config(format!("invalid glob pattern: {e}"))
                })
        })
        .transpose()
}

/// Recursively walk a directory and discover job posting files.
///
/// Skips hidden files/directories (names starting with `.`). Every other
/// regular file is returned whatever its extension, since the loader reads
/// unknown formats as text. When `filter` is given it is matched against
/// the path relative to `root`.
pub fn discover_files(
    root: &Path,
    filter: Option<&GlobMatcher>,
) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize().map_err(|e| Error::Ingestion {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;

    if let Some(filter) = filter {
        results.retain(|f| filter.is_match(&f.relative_path));
    }
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &entry.path(), results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = entry.path().canonicalize() else {
                continue; // broken symlink
            };
            // Directory links back into the tree would loop.
            if resolved.starts_with(root) && resolved.is_dir() {
                continue;
            }
            if resolved.is_file() {
                results.push(make_discovered(root, &entry.path(), &resolved));
            }
        } else if file_type.is_file() {
            let abs = entry.path().canonicalize()?;
            results.push(make_discovered(root, &entry.path(), &abs));
        }
    }

    Ok(())
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
    }
}
