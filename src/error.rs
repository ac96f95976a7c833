//! Unified error handling for the geolife-ingest library.
//!
//! The ingestion pipeline is a best-effort single pass that fails closed:
//! every variant here is fatal for the run. The one non-error outcome in the
//! pipeline (an oversized trajectory file) is not modeled here at all — see
//! [`crate::trajectory::ParseOutcome`].

use std::fmt;
use std::path::Path;

/// Unified error type for ingestion and analytics operations.
#[derive(Debug, Clone)]
pub enum IngestError {
    /// A dataset path could not be read.
    Io { path: String, message: String },
    /// A record or timestamp did not match the dataset format. This signals
    /// a corrupt dataset, so it aborts the whole run, not just one file.
    Format { message: String },
    /// The storage backend failed.
    Store { message: String },
}

impl IngestError {
    /// Build an `Io` error from a path and its underlying cause.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.display().to_string(),
            message: source.to_string(),
        }
    }

    /// Build a `Format` error with the given message.
    pub fn format(message: impl Into<String>) -> Self {
        IngestError::Format {
            message: message.into(),
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Io { path, message } => {
                write!(f, "I/O error reading '{}': {}", path, message)
            }
            IngestError::Format { message } => {
                write!(f, "Format error: {}", message)
            }
            IngestError::Store { message } => {
                write!(f, "Store error: {}", message)
            }
        }
    }
}

impl std::error::Error for IngestError {}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        IngestError::Store {
            message: err.to_string(),
        }
    }
}

/// Result type alias for ingestion and analytics operations.
pub type Result<T> = std::result::Result<T, IngestError>;
