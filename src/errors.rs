use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading fixtures, preparing the run and executing
/// scenarios.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A fixture line matched none of its grammar's forms.
    #[error("{}:{line} parse error: {reason}", file.display())]
    FixtureParse {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    /// The harness cannot run with the given fixtures or environment.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A step's outcome did not match its declared expectation.
    #[error("{scenario} -- Test #{step} failed ({line})")]
    StepFailed {
        scenario: String,
        step: usize,
        line: String,
    },

    /// The privileged identity could not be re-established after a step.
    #[error("failed to restore privileged identity: {0}")]
    PrivilegeRestore(String),

    /// The operator interrupted the run.
    #[error("run interrupted")]
    Interrupted,

    /// Wrapper for underlying IO errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn parse(file: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        HarnessError::FixtureParse {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Errors after which no further scenario may run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::PrivilegeRestore(_) | HarnessError::Interrupted)
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
