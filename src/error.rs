//! Pipeline error taxonomy.
//!
//! Only archive- or folder-level structural failures are fatal to a run;
//! everything file-scoped is recovered by the orchestrator and recorded in
//! the result summary instead of propagating.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the ingestion pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Archive or folder path does not exist. Fatal to the run.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file is not a well-formed ZIP archive. Fatal to the run.
    #[error("not a valid ZIP archive: {0}")]
    InvalidArchive(String),

    /// Malformed binary or JSON content. Recovered at the file level.
    #[error("parse error: {0}")]
    Parse(String),

    /// No calendar date could be derived for a record. Recovered per record.
    #[error("could not determine record date: {0}")]
    DateUndeterminable(String),

    /// Database write failed outside the expected duplicate path. The
    /// offending file's transaction is rolled back so a retry is possible.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that abort a whole import/sync run rather than a
    /// single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidArchive(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::NotFound(PathBuf::from("/missing.zip")).is_fatal());
        assert!(Error::InvalidArchive("bad header".into()).is_fatal());
        assert!(!Error::Parse("truncated".into()).is_fatal());
        assert!(!Error::DateUndeterminable("no fields".into()).is_fatal());
    }

    #[test]
    fn display_includes_detail() {
        let err = Error::Parse("unexpected EOF".into());
        assert_eq!(err.to_string(), "parse error: unexpected EOF");
    }
}
