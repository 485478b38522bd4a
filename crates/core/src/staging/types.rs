//! Types for the staging store.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::job::JobId;

use super::error::StagingError;

/// Role of a staged file inside its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Input,
    Output,
}

/// A path-addressable file owned by exactly one job.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub job_id: JobId,
    pub role: FileRole,
    /// Location on disk (`<job_id>-<seq>_<name>`).
    pub path: PathBuf,
    /// Client-facing name without the job token.
    pub original_name: String,
    pub size_bytes: u64,
}

impl StagedFile {
    /// Lower-cased extension of the client-facing name.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.original_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Client-facing name without its extension.
    pub fn stem(&self) -> String {
        Path::new(&self.original_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.original_name.clone())
    }
}

/// A reserved, not yet populated, output location.
///
/// Converters write into [`OutputSlot::scratch_path`]; the executor then
/// commits the scratch file to the final path with a rename, so a reader of
/// the final path never observes a partially written artifact.
#[derive(Debug, Clone)]
pub struct OutputSlot {
    job_id: JobId,
    token: String,
    file_name: String,
    path: PathBuf,
    scratch: PathBuf,
}

impl OutputSlot {
    pub(crate) fn new(job_id: JobId, token: String, file_name: String, dir: &Path) -> Self {
        let stored = format!("{}_{}", token, file_name);
        let path = dir.join(&stored);
        let scratch = dir.join(format!("{}.partial", stored));
        Self {
            job_id,
            token,
            file_name,
            path,
            scratch,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Unique token (`<job_id>-<seq>`) prefixing every file of this slot.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Name the artifact is delivered under.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Final path, populated only by [`OutputSlot::commit`].
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path converters write into.
    pub fn scratch_path(&self) -> &Path {
        &self.scratch
    }

    /// Directory the slot lives in.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Creates a private working directory next to the slot.
    ///
    /// Engines that insist on choosing their own output names (office
    /// suites, OCR, downloaders) write here. The directory carries the slot
    /// token, so releasing the job removes it.
    pub async fn work_dir(&self) -> Result<PathBuf, StagingError> {
        let dir = self.dir().join(format!("{}_work", self.token));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StagingError::DirectoryCreationFailed {
                path: dir.clone(),
                source: e,
            })?;
        Ok(dir)
    }

    /// Atomically moves the scratch file to the final path.
    pub async fn commit(self) -> Result<StagedFile, StagingError> {
        tokio::fs::rename(&self.scratch, &self.path)
            .await
            .map_err(|e| StagingError::CommitFailed {
                source_path: self.scratch.clone(),
                destination: self.path.clone(),
                source: e,
            })?;

        let size_bytes = tokio::fs::metadata(&self.path).await?.len();
        Ok(StagedFile {
            job_id: self.job_id,
            role: FileRole::Output,
            path: self.path,
            original_name: self.file_name,
            size_bytes,
        })
    }

    /// Removes anything written for this slot. Missing files are ignored.
    pub async fn discard(&self) {
        for path in [&self.scratch, &self.path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to discard output");
                }
            }
        }
    }
}

/// Outcome of a [`release`](super::StagingStore::release) call.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReleaseReport {
    /// Entries removed.
    pub removed: usize,
    /// Entries that could not be removed.
    pub failed: usize,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
