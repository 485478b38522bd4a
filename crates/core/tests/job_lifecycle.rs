//! Job lifecycle integration tests.
//!
//! These tests run real library-backed converters through the executor:
//! - Staging, execution and delivery of file and parameter-only operations
//! - Release of every staged file on success and on each failure path
//! - Isolation of concurrent jobs submitting identical file names

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use convertino_core::{
    converter::{ErrorKind, Params},
    Config, ConverterRegistry, JobExecutor, StagingStore,
};

/// Test helper wiring the full registry to a temp staging area.
struct TestHarness {
    executor: Arc<JobExecutor>,
    store: Arc<StagingStore>,
    _temp_dir: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.storage.upload_dir = temp_dir.path().join("uploads");
        config.storage.output_dir = temp_dir.path().join("outputs");

        let store = Arc::new(StagingStore::new(&config.storage));
        store.ensure_dirs().await.expect("Failed to create staging dirs");
        let registry = Arc::new(ConverterRegistry::new(&config).expect("Failed to build registry"));
        let executor = Arc::new(JobExecutor::new(&config, registry, store.clone()));

        Self {
            executor,
            store,
            _temp_dir: temp_dir,
        }
    }

    fn staged_entries(&self) -> usize {
        let count = |p: &Path| std::fs::read_dir(p).map(|d| d.count()).unwrap_or(0);
        count(self.store.upload_dir()) + count(self.store.output_dir())
    }
}

fn payload(data: &[u8]) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
    futures::stream::iter(vec![Ok(Bytes::copy_from_slice(data))])
}

#[tokio::test]
async fn test_registry_covers_every_operation() {
    let harness = TestHarness::new().await;
    let registry = harness.executor.registry();

    assert_eq!(registry.len(), convertino_core::Operation::ALL.len());
    for operation in convertino_core::Operation::ALL {
        assert!(registry.lookup(operation.as_str()).is_ok(), "{} missing", operation);
    }
}

#[tokio::test]
async fn test_parameter_only_operation() {
    let harness = TestHarness::new().await;

    let job = harness.executor.begin("base64-encode").unwrap();
    let params = Params::new().with("text", "hello");
    let completed = harness.executor.run(job, &params).await.unwrap();
    assert_eq!(completed.file_name, "encoded.txt");
    assert_eq!(completed.content_type, "text/plain");

    let (_, body) = harness.executor.deliver_bytes(completed).await.unwrap();
    assert_eq!(&body[..], b"aGVsbG8=");
    assert_eq!(harness.staged_entries(), 0);
}

#[tokio::test]
async fn test_file_operation_names_output_after_input() {
    let harness = TestHarness::new().await;

    let mut job = harness.executor.begin("json-to-yaml").unwrap();
    harness
        .executor
        .stage(&mut job, "settings.json", payload(br#"{"name":"demo","port":8080}"#))
        .await
        .unwrap();
    let completed = harness.executor.run(job, &Params::new()).await.unwrap();
    assert_eq!(completed.file_name, "settings.yaml");

    let (_, body) = harness.executor.deliver_bytes(completed).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("name: demo"));
    assert!(text.contains("port: 8080"));
    assert_eq!(harness.staged_entries(), 0);
}

#[tokio::test]
async fn test_wrong_extension_is_rejected_before_execution() {
    let harness = TestHarness::new().await;

    let mut job = harness.executor.begin("json-to-yaml").unwrap();
    harness
        .executor
        .stage(&mut job, "settings.txt", payload(b"{}"))
        .await
        .unwrap();
    let failure = harness.executor.run(job, &Params::new()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Validation);
    assert_eq!(harness.staged_entries(), 0);
}

#[tokio::test]
async fn test_execution_failure_releases_inputs() {
    let harness = TestHarness::new().await;

    let mut job = harness.executor.begin("yaml-to-json").unwrap();
    harness
        .executor
        .stage(&mut job, "broken.yaml", payload(b"key: [unclosed"))
        .await
        .unwrap();
    let failure = harness.executor.run(job, &Params::new()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Validation);
    assert_eq!(harness.staged_entries(), 0);
}

#[tokio::test]
async fn test_missing_required_parameter() {
    let harness = TestHarness::new().await;

    let job = harness.executor.begin("url-encode").unwrap();
    let failure = harness.executor.run(job, &Params::new()).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_archive_bundles_inputs() {
    let harness = TestHarness::new().await;

    let mut job = harness.executor.begin("archive-create").unwrap();
    harness.executor.stage(&mut job, "a.txt", payload(b"alpha")).await.unwrap();
    harness.executor.stage(&mut job, "b.txt", payload(b"beta")).await.unwrap();
    let completed = harness.executor.run(job, &Params::new()).await.unwrap();
    assert_eq!(completed.file_name, "archive.zip");

    let (_, body) = harness.executor.deliver_bytes(completed).await.unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(body.to_vec())).unwrap();
    assert_eq!(archive.len(), 2);
    let mut content = String::new();
    archive.by_name("b.txt").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "beta");
    assert_eq!(harness.staged_entries(), 0);
}

#[tokio::test]
async fn test_archive_rejects_duplicate_names() {
    let harness = TestHarness::new().await;

    let mut job = harness.executor.begin("archive-create").unwrap();
    harness.executor.stage(&mut job, "same.txt", payload(b"one")).await.unwrap();
    harness.executor.stage(&mut job, "same.txt", payload(b"two")).await.unwrap();
    let failure = harness.executor.run(job, &Params::new()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Validation);
    assert_eq!(harness.staged_entries(), 0);
}

#[tokio::test]
async fn test_concurrent_jobs_with_identical_names_stay_isolated() {
    let harness = TestHarness::new().await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let executor = harness.executor.clone();
        handles.push(tokio::spawn(async move {
            let document = format!(r#"{{"worker":{}}}"#, i);
            let mut job = executor.begin("json-to-yaml").unwrap();
            executor
                .stage(&mut job, "data.json", payload(document.as_bytes()))
                .await
                .unwrap();
            let completed = executor.run(job, &Params::new()).await.unwrap();
            let (_, body) = executor.deliver_bytes(completed).await.unwrap();
            assert_eq!(String::from_utf8(body.to_vec()).unwrap().trim(), format!("worker: {}", i));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(harness.staged_entries(), 0);
    assert_eq!(harness.executor.status().total_succeeded, 6);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let harness = TestHarness::new().await;

    let mut job = harness.executor.begin("archive-create").unwrap();
    harness.executor.stage(&mut job, "a.txt", payload(b"a")).await.unwrap();
    let job_id = job.id();

    let first = harness.store.release(&job_id).await;
    let second = harness.store.release(&job_id).await;
    assert_eq!(first.removed, 1);
    assert_eq!(second.removed, 0);
    assert!(second.is_clean());
    drop(job);
}
