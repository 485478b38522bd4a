//! Error types for the staging store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while placing files in the staging areas.
///
/// All of these are filesystem-level problems; the caller may retry.
#[derive(Debug, Error)]
pub enum StagingError {
    /// A staging area could not be created.
    #[error("Failed to create staging directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a staged payload failed.
    #[error("Failed to write staged file {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The inbound payload stream itself failed.
    #[error("Upload stream failed: {0}")]
    StreamFailed(#[source] std::io::Error),

    /// The payload exceeded the configured size ceiling.
    #[error("Payload exceeds the {limit_bytes} byte limit")]
    PayloadTooLarge { limit_bytes: u64 },

    /// Renaming scratch output into place failed.
    #[error("Failed to move {source_path} to {destination}")]
    CommitFailed {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagingError {
    pub(crate) fn write_failed(path: PathBuf, source: std::io::Error) -> Self {
        Self::WriteFailed { path, source }
    }

    /// Whether the failure came from the size ceiling rather than the disk.
    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::PayloadTooLarge { .. })
    }
}
