//! Types for the job module.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::converter::{Converter, ErrorKind, Operation};
use crate::staging::{StagedFile, StagingStore};

/// Identifier of one conversion request.
///
/// Every staged file of a job carries this id in its name, which is what
/// [`StagingStore::release`] scans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Staged,
    Executing,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Staged => "staged",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result label of a job, as recorded in metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Succeeded,
    Failed(ErrorKind),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed(kind) => kind.as_str(),
        }
    }
}

/// A failed job, reduced to what the caller may see.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct JobFailure {
    pub job_id: JobId,
    pub kind: ErrorKind,
    pub message: String,
    /// Set when the requested operation name was not recognised.
    pub unknown_operation: bool,
}

impl JobFailure {
    pub fn new(job_id: JobId, error: &crate::converter::ConvertError) -> Self {
        Self {
            job_id,
            kind: error.kind(),
            message: error.to_string(),
            unknown_operation: error.is_unknown_operation(),
        }
    }
}

/// Spawns a background release of a job's files when dropped while armed.
///
/// Covers jobs abandoned mid-flight, for example when the HTTP client goes
/// away between staging and execution.
#[derive(Debug)]
pub(crate) struct ReleaseGuard {
    store: Arc<StagingStore>,
    job_id: JobId,
    armed: bool,
}

impl ReleaseGuard {
    pub(crate) fn new(store: Arc<StagingStore>, job_id: JobId) -> Self {
        Self {
            store,
            job_id,
            armed: false,
        }
    }

    pub(crate) fn arm(&mut self) {
        self.armed = true;
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    /// Moves responsibility for the job's files to a new guard.
    pub(crate) fn hand_off(&mut self) -> Self {
        let next = Self {
            store: self.store.clone(),
            job_id: self.job_id,
            armed: self.armed,
        };
        self.armed = false;
        next
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let job_id = self.job_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let report = store.release(&job_id).await;
                    tracing::debug!(
                        job_id = %job_id,
                        removed = report.removed,
                        failed = report.failed,
                        "Released abandoned job"
                    );
                });
            }
            Err(_) => {
                tracing::warn!(job_id = %job_id, "No runtime to release abandoned job, leaving it to the janitor");
            }
        }
    }
}

/// A request in flight: the resolved converter and its staged inputs.
///
/// Created by [`JobExecutor::begin`](super::JobExecutor::begin) and consumed
/// by [`JobExecutor::run`](super::JobExecutor::run). Dropping a job before it
/// runs releases whatever it staged.
pub struct Job {
    pub(crate) id: JobId,
    pub(crate) converter: Arc<dyn Converter>,
    pub(crate) inputs: Vec<StagedFile>,
    pub(crate) state: JobState,
    pub(crate) failure: Option<JobFailure>,
    pub(crate) next_seq: u32,
    pub(crate) guard: ReleaseGuard,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn operation(&self) -> Operation {
        self.converter.descriptor().operation
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn inputs(&self) -> &[StagedFile] {
        &self.inputs
    }

    pub fn outcome(&self) -> Outcome {
        match (&self.state, &self.failure) {
            (JobState::Succeeded, _) => Outcome::Succeeded,
            (JobState::Failed, Some(failure)) => Outcome::Failed(failure.kind),
            (JobState::Failed, None) => Outcome::Failed(ErrorKind::Engine),
            _ => Outcome::Pending,
        }
    }

    pub(crate) fn next_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("operation", &self.operation())
            .field("state", &self.state)
            .field("inputs", &self.inputs.len())
            .finish()
    }
}

/// A successful job whose artifact has not been delivered yet.
///
/// Dropping it without calling
/// [`JobExecutor::deliver`](super::JobExecutor::deliver) still releases the
/// job's files.
#[derive(Debug)]
pub struct CompletedJob {
    pub job_id: JobId,
    pub operation: Operation,
    pub output: StagedFile,
    /// Name the artifact is delivered under.
    pub file_name: String,
    pub content_type: String,
    pub extra: BTreeMap<String, String>,
    pub(crate) guard: ReleaseGuard,
}

/// An artifact ready to be sent to the client.
///
/// The job's files are already released. On Unix the open handle keeps the
/// unlinked artifact readable until it is dropped.
#[derive(Debug)]
pub struct Delivery {
    pub job_id: JobId,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub extra: BTreeMap<String, String>,
    pub file: tokio::fs::File,
}

/// Snapshot of executor activity.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStatus {
    pub active_jobs: usize,
    pub max_concurrent: usize,
    pub total_succeeded: u64,
    pub total_failed: u64,
}
