//! Loaders for the line-oriented fixture files.
//!
//! Every fixture shares the same outer shape: one declaration per line,
//! blank lines and `#` comments ignored, anything unrecognised rejected with
//! the file name and 1-based line number. The grammar-specific parsers live
//! in the submodules and in `fs_op::fixture` / `runner::scenario`.

pub mod acl;
pub mod passwd;

use std::fs;
use std::path::Path;

use crate::errors::{HarnessError, HarnessResult};

/// A fixture line with its 1-based line number, already trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLine {
    pub number: usize,
    pub text: String,
}

/// Return `true` for lines carrying no declaration.
///
/// A comment is `#` followed by whitespace or the end of the line; text glued
/// directly onto the marker (`#foo`) is not a comment.
pub fn is_comment(line: &str) -> bool {
    let line = line.trim();
    match line.strip_prefix('#') {
        None => line.is_empty(),
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
    }
}

/// Read `path` and return its non-comment lines, trimmed and numbered.
pub fn read_lines(path: &Path) -> HarnessResult<Vec<FixtureLine>> {
    let content = fs::read_to_string(path).map_err(|e| {
        HarnessError::Configuration(format!("cannot read fixture {}: {}", path.display(), e))
    })?;
    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, l)| !is_comment(l))
        .map(|(i, l)| FixtureLine {
            number: i + 1,
            text: l.trim().to_string(),
        })
        .collect())
}
