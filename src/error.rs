//! Error types for the lexis library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`LexisError`] enum. The variants follow the failure taxonomy of the
//! engine:
//!
//! - [`LexisError::MalformedQuery`] is raised while planning, never while a
//!   query is executing.
//! - [`LexisError::SegmentCorruption`] is raised when a segment fails header or
//!   checksum validation; the index excludes such segments from snapshots.
//! - [`LexisError::Io`] failures during flush and merge are retried by
//!   [`crate::util::retry`] when [`LexisError::is_transient`] says so.
//! - [`LexisError::ResourceExhausted`] is reported when a budget cannot be met
//!   even after a forced flush.
//!
//! # Examples
//!
//! ```
//! use lexis::error::{LexisError, Result};
//!
//! fn plan_something() -> Result<()> {
//!     Err(LexisError::malformed_query("unbalanced parenthesis"))
//! }
//!
//! let err = plan_something().unwrap_err();
//! assert_eq!(err.to_string(), "Malformed query: unbalanced parenthesis");
//! ```

use std::io;

use thiserror::Error;

/// The main error type for lexis operations.
#[derive(Error, Debug)]
pub enum LexisError {
    /// I/O errors (file operations, renames, syncs).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The query tree or query string could not be planned.
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// A segment failed validation when it was opened.
    #[error("Segment {segment} is corrupt: {reason}")]
    SegmentCorruption { segment: String, reason: String },

    /// A memory or size budget could not be honoured.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Text analysis errors (tokenization, filtering).
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// The configured text encoding is not known.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Storage backend errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index lifecycle errors (manifest, segment set).
    #[error("Index error: {0}")]
    Index(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation was cancelled or timed out.
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with LexisError.
pub type Result<T> = std::result::Result<T, LexisError>;

impl LexisError {
    /// Create a new malformed query error.
    pub fn malformed_query<S: Into<String>>(msg: S) -> Self {
        LexisError::MalformedQuery(msg.into())
    }

    /// Create a new segment corruption error.
    pub fn corruption<S: Into<String>, R: Into<String>>(segment: S, reason: R) -> Self {
        LexisError::SegmentCorruption {
            segment: segment.into(),
            reason: reason.into(),
        }
    }

    /// Create a new resource exhaustion error.
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        LexisError::ResourceExhausted(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        LexisError::Analysis(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        LexisError::Storage(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        LexisError::Index(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        LexisError::Config(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        LexisError::OperationCancelled(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LexisError::Other(msg.into())
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Only I/O errors are transient, and not those that will fail the same
    /// way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            LexisError::Io(err) => !matches!(
                err.kind(),
                io::ErrorKind::NotFound
                    | io::ErrorKind::PermissionDenied
                    | io::ErrorKind::InvalidData
                    | io::ErrorKind::InvalidInput
                    | io::ErrorKind::AlreadyExists
            ),
            _ => false,
        }
    }

    /// Whether this error reports a corrupt segment.
    pub fn is_corruption(&self) -> bool {
        matches!(self, LexisError::SegmentCorruption { .. })
    }

    /// Whether this error reports a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LexisError::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = LexisError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = LexisError::malformed_query("dangling NOT");
        assert_eq!(error.to_string(), "Malformed query: dangling NOT");

        let error = LexisError::corruption("seg_1", "bad magic");
        assert_eq!(error.to_string(), "Segment seg_1 is corrupt: bad magic");
        assert!(error.is_corruption());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let lexis_error = LexisError::from(io_error);

        match lexis_error {
            LexisError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_transient_classification() {
        let interrupted = LexisError::from(io::Error::new(io::ErrorKind::Interrupted, "eintr"));
        assert!(interrupted.is_transient());

        let missing = LexisError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!missing.is_transient());

        assert!(!LexisError::malformed_query("x").is_transient());
    }
}
