//! Finds buildable example projects and counts CI job declarations.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::ExbuildError;

/// One discovered example project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Position in the sorted item list.
    pub id: usize,
    /// Name of the example directory.
    pub name: String,
    /// The example directory itself.
    pub dir: PathBuf,
    /// The build definition that marked `dir` as an example.
    pub build_file: PathBuf,
}

/// Walks `root` for files named `build_file`, skipping any whose path
/// relative to `root` passes through a directory in `excluded_dirs`.
///
/// The result is sorted by path and numbered in that order, so every job
/// instance sees the same item ids.
pub fn discover_items(
    root: &Path,
    build_file: &str,
    excluded_dirs: &[String],
) -> Result<Vec<Item>, ExbuildError> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != build_file {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let excluded = relative
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|c| excluded_dirs.iter().any(|d| c.as_os_str() == d.as_str()));
        if excluded {
            debug!(path = %entry.path().display(), "skipping excluded build file");
            continue;
        }
        found.push(entry.into_path());
    }

    found.sort();

    let items = found
        .into_iter()
        .enumerate()
        .filter_map(|(id, build_file)| {
            let dir = build_file.parent()?.to_path_buf();
            let name = dir.file_name()?.to_string_lossy().into_owned();
            Some(Item {
                id,
                name,
                dir,
                build_file,
            })
        })
        .collect();

    Ok(items)
}

/// Counts lines declaring `<label>_<digits>:` at the start of a line.
pub fn count_jobs(ci_config: &str, label: &str) -> usize {
    ci_config
        .lines()
        .filter(|line| {
            let Some(rest) = line.strip_prefix(label).and_then(|r| r.strip_prefix('_')) else {
                return false;
            };
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            digits > 0 && rest[digits..].starts_with(':')
        })
        .count()
}

/// Reads the CI configuration at `path` and counts jobs sharing `label`.
pub fn count_jobs_in_file(path: &Path, label: &str) -> Result<usize, ExbuildError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ExbuildError::Config(format!(
            "cannot read CI configuration {}: {e}",
            path.display()
        ))
    })?;
    Ok(count_jobs(&contents, label))
}
