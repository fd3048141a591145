//! Error types for the Secflow converter.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::SampleType;

/// Main error type for conversion runs.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Input failed structural validation for its claimed type
    #[error("{} is not a valid {expected} file: {reason}", path.display())]
    Format {
        path: PathBuf,
        expected: SampleType,
        reason: String,
    },

    /// Assembled output failed post-assembly validation
    #[error("output sanity check failed: {0}")]
    Sanity(String),

    /// Passive DNS repository could not be read or written
    #[error("passive DNS repository {}: {reason}", path.display())]
    Repository { path: PathBuf, reason: String },

    /// Capture reader failure after validation succeeded
    #[error("capture read error: {0}")]
    Capture(String),

    /// Configuration file or value is invalid
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(
        path: impl Into<PathBuf>,
        expected: SampleType,
        reason: impl Into<String>,
    ) -> Self {
        Self::Format {
            path: path.into(),
            expected,
            reason: reason.into(),
        }
    }

    /// True for input that was rejected before any conversion work started.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
