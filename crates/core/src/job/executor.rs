//! Job executor implementation.

use bytes::Bytes;
use futures::Stream;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::converter::{ConvertError, Converter, ConverterRegistry, Params};
use crate::metrics;
use crate::staging::{sanitize_file_name, OutputSlot, StagedFile, StagingStore};

use super::types::{
    CompletedJob, Delivery, ExecutorStatus, Job, JobFailure, JobId, JobState, Outcome,
    ReleaseGuard,
};

/// Tracks executor totals.
#[derive(Default)]
struct ExecutorStats {
    active: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Decrements the active counters when an execution ends, however it ends.
struct InFlight<'a>(&'a ExecutorStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a ExecutorStats) -> Self {
        stats.active.fetch_add(1, Ordering::Relaxed);
        metrics::JOBS_IN_FLIGHT.inc();
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
        metrics::JOBS_IN_FLIGHT.dec();
    }
}

/// Drives jobs through `Created -> Staged -> Executing -> {Succeeded, Failed}`.
///
/// The executor owns no per-job state; concurrent jobs share only the
/// registry, the staging store and the concurrency permits.
pub struct JobExecutor {
    registry: Arc<ConverterRegistry>,
    store: Arc<StagingStore>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    job_timeout: Duration,
    max_files: usize,
    stats: ExecutorStats,
}

impl JobExecutor {
    pub fn new(config: &Config, registry: Arc<ConverterRegistry>, store: Arc<StagingStore>) -> Self {
        let max_concurrent = config.jobs.max_concurrent_jobs.max(1);
        Self {
            registry,
            store,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            job_timeout: Duration::from_secs(config.jobs.job_timeout_secs),
            max_files: config.storage.max_files_per_job,
            stats: ExecutorStats::default(),
        }
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<StagingStore> {
        &self.store
    }

    pub fn status(&self) -> ExecutorStatus {
        ExecutorStatus {
            active_jobs: self.stats.active.load(Ordering::Relaxed),
            max_concurrent: self.max_concurrent,
            total_succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            total_failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Resolves `operation` and opens a job in the `Created` state.
    pub fn begin(&self, operation: &str) -> Result<Job, JobFailure> {
        let id = JobId::new();
        let converter = self
            .registry
            .lookup(operation)
            .map_err(|e| JobFailure::new(id, &e))?;

        debug!(job_id = %id, operation = %operation, "Job created");
        Ok(Job {
            id,
            converter,
            inputs: Vec::new(),
            state: JobState::Created,
            failure: None,
            next_seq: 0,
            guard: ReleaseGuard::new(self.store.clone(), id),
        })
    }

    /// Streams one inbound payload into the job.
    ///
    /// On failure the job is marked failed and everything it staged so far
    /// is released; a later [`JobExecutor::run`] reports the same failure.
    pub async fn stage<S>(
        &self,
        job: &mut Job,
        name: &str,
        payload: S,
    ) -> Result<StagedFile, JobFailure>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>>,
    {
        if let Some(failure) = &job.failure {
            return Err(failure.clone());
        }

        let staged = if job.inputs.len() >= self.max_files {
            Err(ConvertError::validation(format!(
                "Too many files: at most {} per request",
                self.max_files
            )))
        } else {
            let seq = job.next_seq();
            job.guard.arm();
            self.store
                .stage_input(&job.id, seq, name, payload)
                .await
                .map_err(ConvertError::from)
        };

        match staged {
            Ok(file) => {
                job.state = JobState::Staged;
                job.inputs.push(file.clone());
                Ok(file)
            }
            Err(e) => {
                warn!(job_id = %job.id, file_name = %name, error = %e, "Staging failed");
                let failure = JobFailure::new(job.id, &e);
                job.state = JobState::Failed;
                job.failure = Some(failure.clone());
                self.store.release(&job.id).await;
                job.guard.disarm();
                Err(failure)
            }
        }
    }

    /// Validates and executes a staged job.
    ///
    /// On success the artifact is committed and inputs stay staged until
    /// [`JobExecutor::deliver`]. On any failure every file of the job is
    /// released before the error is returned.
    #[instrument(skip_all, fields(job_id = %job.id, operation = %job.operation()))]
    pub async fn run(&self, mut job: Job, params: &Params) -> Result<CompletedJob, JobFailure> {
        if let Some(failure) = job.failure.take() {
            job.state = JobState::Failed;
            return Err(failure);
        }

        let operation = job.operation();
        let started = Instant::now();
        let result = self.run_inner(&mut job, params).await;
        let elapsed = started.elapsed();

        match result {
            Ok(completed) => {
                job.state = JobState::Succeeded;
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                metrics::JOBS_TOTAL
                    .with_label_values(&[operation.as_str(), job.outcome().as_str()])
                    .inc();
                metrics::JOB_DURATION
                    .with_label_values(&[operation.as_str()])
                    .observe(elapsed.as_secs_f64());
                info!(
                    output = %completed.file_name,
                    size_bytes = completed.output.size_bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Job succeeded"
                );
                Ok(completed)
            }
            Err(e) => {
                let failure = JobFailure::new(job.id, &e);
                job.state = JobState::Failed;
                job.failure = Some(failure.clone());

                let report = self.store.release(&job.id).await;
                job.guard.disarm();

                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                let outcome = Outcome::Failed(failure.kind);
                metrics::JOBS_TOTAL
                    .with_label_values(&[operation.as_str(), outcome.as_str()])
                    .inc();
                warn!(
                    kind = %failure.kind,
                    error = %e,
                    released = report.removed,
                    "Job failed"
                );
                Err(failure)
            }
        }
    }

    async fn run_inner(&self, job: &mut Job, params: &Params) -> Result<CompletedJob, ConvertError> {
        let converter = job.converter.clone();
        let descriptor = converter.descriptor();

        if job.state == JobState::Created {
            job.state = JobState::Staged;
        }
        descriptor.check(&job.inputs, params)?;
        converter.validate(&job.inputs, params)?;

        job.state = JobState::Executing;
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConvertError::engine("executor", "Executor is shutting down"))?;
        let _in_flight = InFlight::enter(&self.stats);

        let name = sanitize_file_name(&converter.output_name(&job.inputs, params));
        let seq = job.next_seq();
        let slot = self.store.allocate_output(&job.id, seq, &name);
        job.guard.arm();

        debug!(inputs = job.inputs.len(), output = %slot.file_name(), "Executing");
        let artifact = match self
            .execute_isolated(converter.clone(), job.inputs.clone(), slot.clone(), params.clone())
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                slot.discard().await;
                return Err(e);
            }
        };

        if !tokio::fs::try_exists(slot.scratch_path()).await.unwrap_or(false) {
            slot.discard().await;
            return Err(ConvertError::artifact_not_found(slot.file_name()));
        }

        let output = slot.commit().await?;
        let file_name = artifact
            .file_name
            .map(|n| sanitize_file_name(&n))
            .unwrap_or_else(|| output.original_name.clone());

        Ok(CompletedJob {
            job_id: job.id,
            operation: descriptor.operation,
            output,
            file_name,
            content_type: artifact.content_type,
            extra: artifact.extra,
            guard: job.guard.hand_off(),
        })
    }

    /// Runs `execute` on its own task under the job timeout.
    ///
    /// A panicking converter surfaces as an engine failure instead of
    /// unwinding through the caller.
    async fn execute_isolated(
        &self,
        converter: Arc<dyn Converter>,
        inputs: Vec<StagedFile>,
        slot: OutputSlot,
        params: Params,
    ) -> Result<crate::converter::Artifact, ConvertError> {
        let operation = converter.descriptor().operation;
        let handle =
            tokio::spawn(async move { converter.execute(&inputs, &slot, &params).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.job_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ConvertError::engine(
                operation.as_str(),
                format!("Converter terminated unexpectedly: {}", join_error),
            )),
            Err(_) => {
                abort.abort();
                Err(ConvertError::Timeout {
                    engine: operation.as_str().to_string(),
                    timeout_secs: self.job_timeout.as_secs(),
                })
            }
        }
    }

    /// Opens the artifact for sending and releases the job's files.
    pub async fn deliver(&self, mut completed: CompletedJob) -> Result<Delivery, JobFailure> {
        let job_id = completed.job_id;
        let opened = tokio::fs::File::open(&completed.output.path).await;

        let report = self.store.release(&job_id).await;
        completed.guard.disarm();
        debug!(job_id = %job_id, removed = report.removed, failed = report.failed, "Delivered job");

        let file = opened.map_err(|e| JobFailure::new(job_id, &ConvertError::Io(e)))?;
        Ok(Delivery {
            job_id,
            file_name: std::mem::take(&mut completed.file_name),
            content_type: std::mem::take(&mut completed.content_type),
            size_bytes: completed.output.size_bytes,
            extra: std::mem::take(&mut completed.extra),
            file,
        })
    }

    /// Reads the artifact fully into memory and releases the job's files.
    pub async fn deliver_bytes(&self, completed: CompletedJob) -> Result<(Delivery, Bytes), JobFailure> {
        let job_id = completed.job_id;
        let read = tokio::fs::read(&completed.output.path).await;
        let delivery = self.deliver(completed).await?;
        let bytes = read.map_err(|e| JobFailure::new(job_id, &ConvertError::Io(e)))?;
        Ok((delivery, Bytes::from(bytes)))
    }
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("operations", &self.registry.len())
            .field("max_concurrent", &self.max_concurrent)
            .field("job_timeout", &self.job_timeout)
            .finish()
    }
}
