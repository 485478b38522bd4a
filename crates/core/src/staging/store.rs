//! Filesystem-backed staging store.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::job::JobId;
use crate::metrics;

use super::error::StagingError;
use super::types::{FileRole, OutputSlot, ReleaseReport, StagedFile};

const PARTIAL_SUFFIX: &str = ".partial";
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Two flat directories holding every file a job owns.
///
/// Every stored name starts with a `<job_id>-<seq>` token, which keeps
/// concurrent jobs from ever sharing a path and lets [`StagingStore::release`]
/// find a job's files with a prefix scan.
#[derive(Debug, Clone)]
pub struct StagingStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    max_upload_bytes: u64,
}

impl StagingStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            output_dir: config.output_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Creates both staging areas if they do not exist yet.
    pub async fn ensure_dirs(&self) -> Result<(), StagingError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StagingError::DirectoryCreationFailed {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Streams a payload into the upload area.
    ///
    /// Bytes land in a `.partial` file that is renamed into place only once
    /// the whole stream has been written. On any failure the partial file is
    /// removed before the error is returned.
    pub async fn stage_input<S>(
        &self,
        job_id: &JobId,
        seq: u32,
        suggested_name: &str,
        payload: S,
    ) -> Result<StagedFile, StagingError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>>,
    {
        let name = sanitize_file_name(suggested_name);
        let stored = format!("{}_{}", token(job_id, seq), name);
        let final_path = self.upload_dir.join(&stored);
        let partial = self.upload_dir.join(format!("{}{}", stored, PARTIAL_SUFFIX));

        let written = match self.write_stream(&partial, payload).await {
            Ok(size) => size,
            Err(e) => {
                remove_quietly(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&partial, &final_path).await {
            remove_quietly(&partial).await;
            return Err(StagingError::CommitFailed {
                source_path: partial,
                destination: final_path,
                source: e,
            });
        }

        metrics::STAGED_BYTES.inc_by(written);
        debug!(
            job_id = %job_id,
            path = %final_path.display(),
            size_bytes = written,
            "Staged input"
        );

        Ok(StagedFile {
            job_id: *job_id,
            role: FileRole::Input,
            path: final_path,
            original_name: name,
            size_bytes: written,
        })
    }

    async fn write_stream<S>(&self, path: &Path, payload: S) -> Result<u64, StagingError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>>,
    {
        let file = File::create(path)
            .await
            .map_err(|e| StagingError::write_failed(path.to_path_buf(), e))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let mut payload = std::pin::pin!(payload);
        let mut total = 0u64;

        while let Some(chunk) = payload.next().await {
            let chunk = chunk.map_err(StagingError::StreamFailed)?;
            total += chunk.len() as u64;
            if total > self.max_upload_bytes {
                return Err(StagingError::PayloadTooLarge {
                    limit_bytes: self.max_upload_bytes,
                });
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| StagingError::write_failed(path.to_path_buf(), e))?;
        }

        writer
            .flush()
            .await
            .map_err(|e| StagingError::write_failed(path.to_path_buf(), e))?;
        Ok(total)
    }

    /// Reserves an output location without creating any content.
    pub fn allocate_output(&self, job_id: &JobId, seq: u32, suggested_name: &str) -> OutputSlot {
        OutputSlot::new(
            *job_id,
            token(job_id, seq),
            sanitize_file_name(suggested_name),
            &self.output_dir,
        )
    }

    /// Deletes every entry of both areas belonging to `job_id`.
    ///
    /// Missing files and missing areas are not errors, so calling this more
    /// than once, or after a partial failure, is safe.
    pub async fn release(&self, job_id: &JobId) -> ReleaseReport {
        let prefix = format!("{}-", job_id);
        let mut report = ReleaseReport::default();

        for dir in [&self.upload_dir, &self.output_dir] {
            let mut entries = match fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to scan staging area");
                    report.failed += 1;
                    continue;
                }
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                    continue;
                }
                tally(&mut report, remove_entry(&entry.path()).await, &entry.path());
            }
        }

        if !report.is_clean() {
            metrics::CLEANUP_FAILURES.inc_by(report.failed as u64);
        }
        debug!(job_id = %job_id, removed = report.removed, failed = report.failed, "Released job files");
        report
    }

    /// Deletes entries whose last modification is older than `max_age`.
    pub async fn sweep_expired(&self, max_age: Duration) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        let now = SystemTime::now();

        for dir in [&self.upload_dir, &self.output_dir] {
            let Ok(mut entries) = fs::read_dir(dir).await else {
                continue;
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                let expired = match entry.metadata().await.and_then(|m| m.modified()) {
                    Ok(modified) => now
                        .duration_since(modified)
                        .map(|age| age >= max_age)
                        .unwrap_or(false),
                    Err(_) => false,
                };
                if expired {
                    tally(&mut report, remove_entry(&entry.path()).await, &entry.path());
                }
            }
        }

        if !report.is_clean() {
            metrics::CLEANUP_FAILURES.inc_by(report.failed as u64);
        }
        report
    }

    /// Runs [`StagingStore::sweep_expired`] every `interval` until aborted.
    pub fn spawn_janitor(self: Arc<Self>, retention: Duration, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let report = self.sweep_expired(retention).await;
                if report.removed > 0 || report.failed > 0 {
                    info!(
                        removed = report.removed,
                        failed = report.failed,
                        "Swept expired staging entries"
                    );
                }
            }
        })
    }
}

fn token(job_id: &JobId, seq: u32) -> String {
    format!("{}-{}", job_id, seq)
}

/// Reduces a client-supplied name to a safe last path component.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();
    let trimmed = last.trim();

    match trimmed {
        "" | "." | ".." => "upload".to_string(),
        other => other.to_string(),
    }
}

async fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

fn tally(report: &mut ReleaseReport, result: std::io::Result<()>, path: &Path) {
    match result {
        Ok(()) => report.removed += 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove staged entry");
            report.failed += 1;
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir, max_upload_bytes: u64) -> StagingStore {
        StagingStore::new(&StorageConfig {
            upload_dir: temp.path().join("uploads"),
            output_dir: temp.path().join("outputs"),
            max_upload_bytes,
            ..Default::default()
        })
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok::<_, std::io::Error>(Bytes::from_static(*p)))
                .collect::<Vec<_>>(),
        )
    }

    async fn entry_count(dir: &Path) -> usize {
        let mut entries = fs::read_dir(dir).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\photo.png"), "photo.png");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name("dir/"), "upload");
        assert_eq!(sanitize_file_name("  spaced.txt  "), "spaced.txt");
    }

    #[tokio::test]
    async fn test_stage_input_writes_payload() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 1024);
        store.ensure_dirs().await.unwrap();
        let job_id = JobId::new();

        let staged = store
            .stage_input(&job_id, 0, "notes.txt", chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();

        assert_eq!(staged.role, FileRole::Input);
        assert_eq!(staged.original_name, "notes.txt");
        assert_eq!(staged.size_bytes, 11);
        assert_eq!(fs::read(&staged.path).await.unwrap(), b"hello world");
        let stored = staged.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(stored.starts_with(&format!("{}-0_", job_id)));
        assert!(stored.ends_with("_notes.txt"));
    }

    #[tokio::test]
    async fn test_identical_names_never_collide() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 1024);
        store.ensure_dirs().await.unwrap();
        let first_job = JobId::new();
        let second_job = JobId::new();

        let (a, b) = tokio::join!(
            store.stage_input(&first_job, 0, "same.bin", chunks(&[b"first"])),
            store.stage_input(&second_job, 0, "same.bin", chunks(&[b"second"])),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.path, b.path);
        assert_eq!(fs::read(&a.path).await.unwrap(), b"first");
        assert_eq!(fs::read(&b.path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_payload_over_ceiling_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 8);
        store.ensure_dirs().await.unwrap();

        let err = store
            .stage_input(&JobId::new(), 0, "big.bin", chunks(&[b"0123", b"45678"]))
            .await
            .unwrap_err();

        assert!(err.is_too_large());
        assert_eq!(entry_count(store.upload_dir()).await, 0);
    }

    #[tokio::test]
    async fn test_stream_error_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 1024);
        store.ensure_dirs().await.unwrap();

        let payload = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = store
            .stage_input(&JobId::new(), 0, "cut.bin", payload)
            .await
            .unwrap_err();

        assert!(matches!(err, StagingError::StreamFailed(_)));
        assert_eq!(entry_count(store.upload_dir()).await, 0);
    }

    #[tokio::test]
    async fn test_output_slot_commit_and_discard() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 1024);
        store.ensure_dirs().await.unwrap();
        let job_id = JobId::new();

        let slot = store.allocate_output(&job_id, 1, "result.png");
        assert!(!slot.path().exists());
        assert!(!slot.scratch_path().exists());
        assert_eq!(slot.file_name(), "result.png");

        fs::write(slot.scratch_path(), b"png").await.unwrap();
        let committed = slot.clone().commit().await.unwrap();
        assert_eq!(committed.role, FileRole::Output);
        assert_eq!(committed.size_bytes, 3);
        assert!(!slot.scratch_path().exists());
        assert!(slot.path().exists());

        slot.discard().await;
        assert!(!slot.path().exists());
    }

    #[tokio::test]
    async fn test_release_removes_only_own_entries_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 1024);
        store.ensure_dirs().await.unwrap();
        let doomed = JobId::new();
        let survivor = JobId::new();

        store
            .stage_input(&doomed, 0, "a.txt", chunks(&[b"a"]))
            .await
            .unwrap();
        let kept = store
            .stage_input(&survivor, 0, "a.txt", chunks(&[b"b"]))
            .await
            .unwrap();
        let slot = store.allocate_output(&doomed, 1, "out.txt");
        fs::write(slot.scratch_path(), b"x").await.unwrap();
        let work = store.allocate_output(&doomed, 2, "x").work_dir().await.unwrap();
        fs::write(work.join("inner.tmp"), b"y").await.unwrap();

        let report = store.release(&doomed).await;
        assert_eq!(report.removed, 3);
        assert!(report.is_clean());
        assert!(kept.path.exists());
        assert!(!work.exists());

        let again = store.release(&doomed).await;
        assert_eq!(again.removed, 0);
        assert!(again.is_clean());
    }

    #[tokio::test]
    async fn test_release_without_areas_is_clean() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 1024);

        let report = store.release(&JobId::new()).await;
        assert_eq!(report.removed, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp, 1024);
        store.ensure_dirs().await.unwrap();

        store
            .stage_input(&JobId::new(), 0, "old.txt", chunks(&[b"old"]))
            .await
            .unwrap();

        let fresh = store.sweep_expired(Duration::from_secs(3600)).await;
        assert_eq!(fresh.removed, 0);

        let all = store.sweep_expired(Duration::ZERO).await;
        assert_eq!(all.removed, 1);
        assert_eq!(entry_count(store.upload_dir()).await, 0);
    }
}
