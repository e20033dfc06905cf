use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Errors returned from removing one path during a tree teardown.
#[derive(Debug, Error)]
#[error("cannot remove {path}: {source}")]
pub struct RemoveError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Every path under `root` (inclusive) as found on disk, longest first.
///
/// A descendant's path string is strictly longer than its ancestor's, so this
/// ordering visits every child before its parent. Ties between siblings are
/// broken lexically to keep the order deterministic.
pub fn removal_order(root: &Path) -> Vec<(PathBuf, bool)> {
    let mut paths: Vec<(PathBuf, bool)> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| {
            let is_dir = e.file_type().is_dir();
            (e.into_path(), is_dir)
        })
        .collect();
    paths.sort_by(|(a, _), (b, _)| {
        let (a, b) = (a.as_os_str(), b.as_os_str());
        b.len().cmp(&a.len()).then_with(|| a.cmp(b))
    });
    paths
}

/// Remove `root` and everything below it, children before parents.
///
/// Individual failures do not stop the walk; they are returned so the caller
/// can report them.
pub fn remove_tree(root: &Path) -> Vec<RemoveError> {
    let mut failures = Vec::new();
    for (path, is_dir) in removal_order(root) {
        let res = if is_dir {
            fs::remove_dir(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(source) = res {
            failures.push(RemoveError { path, source });
        }
    }
    failures
}
