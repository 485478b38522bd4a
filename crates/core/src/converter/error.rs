//! Error types for the converter module.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::staging::StagingError;

/// Classification every failure is reduced to at the job boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input format or parameters; no engine was invoked.
    Validation,
    /// Staging or filesystem problem; the caller may retry.
    Io,
    /// The engine rejected the content or is unavailable.
    Engine,
    /// The engine reported success but no artifact could be located.
    ArtifactNotFound,
    /// Connectivity pre-check failed before any download started.
    Network,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Io => "io",
            Self::Engine => "engine",
            Self::ArtifactNotFound => "artifact_not_found",
            Self::Network => "network",
        }
    }

    /// Whether the caller can expect a retry to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Network)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while validating or executing a conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No converter is registered under this name.
    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },

    /// Inputs or parameters were rejected.
    #[error("{reason}")]
    Validation { reason: String },

    /// The engine binary or library is not available.
    #[error("{engine} is not installed or could not be loaded from {path}")]
    EngineMissing { engine: String, path: PathBuf },

    /// The engine ran and failed. `detail` is the engine's own diagnostic.
    #[error("{detail}")]
    Engine { engine: String, detail: String },

    /// The engine exceeded its wall-clock limit and was killed.
    #[error("{engine} timed out after {timeout_secs} seconds")]
    Timeout { engine: String, timeout_secs: u64 },

    /// Execution finished but the expected artifact is missing.
    #[error("Output file not found: {detail}")]
    ArtifactNotFound { detail: String },

    /// Connectivity pre-check failed.
    #[error("{detail}")]
    Network { detail: String },

    /// Staging store failure.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// I/O error while preparing or reading files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn engine(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            detail: detail.into(),
        }
    }

    pub fn engine_missing(engine: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::EngineMissing {
            engine: engine.into(),
            path: path.into(),
        }
    }

    pub fn artifact_not_found(detail: impl Into<String>) -> Self {
        Self::ArtifactNotFound {
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    /// Maps this error onto the job-level taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownOperation { .. } | Self::Validation { .. } => ErrorKind::Validation,
            Self::EngineMissing { .. } | Self::Engine { .. } | Self::Timeout { .. } => {
                ErrorKind::Engine
            }
            Self::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            Self::Network { .. } => ErrorKind::Network,
            Self::Staging(_) | Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_unknown_operation(&self) -> bool {
        matches!(self, Self::UnknownOperation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ConvertError::validation("bad").kind(), ErrorKind::Validation);
        assert_eq!(
            ConvertError::UnknownOperation { name: "x".into() }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(ConvertError::engine("ffmpeg", "boom").kind(), ErrorKind::Engine);
        assert_eq!(
            ConvertError::engine_missing("tesseract", "tesseract").kind(),
            ErrorKind::Engine
        );
        assert_eq!(
            ConvertError::Timeout { engine: "qpdf".into(), timeout_secs: 1 }.kind(),
            ErrorKind::Engine
        );
        assert_eq!(
            ConvertError::artifact_not_found("gone").kind(),
            ErrorKind::ArtifactNotFound
        );
        assert_eq!(ConvertError::network("dns").kind(), ErrorKind::Network);
        assert_eq!(
            ConvertError::Io(std::io::Error::other("disk")).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            ConvertError::Staging(StagingError::PayloadTooLarge { limit_bytes: 1 }).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn test_engine_detail_is_verbatim() {
        let stderr = "[mp4 @ 0x1] Invalid data found when processing input";
        let err = ConvertError::engine("ffmpeg", stderr);
        assert_eq!(err.to_string(), stderr);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Io.is_retryable());
        assert!(ErrorKind::Network.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Engine.is_retryable());
    }
}
