//! Common test utilities for in-process API testing.
//!
//! This module provides a test fixture that builds the real router over a
//! temp staging area, with either the full converter registry or a single
//! scriptable mock converter.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use convertino_core::{Config, ConverterRegistry, JobExecutor, StagingStore};

/// Re-export fixtures for test convenience
pub use convertino_core::testing::{fixtures, MockBehavior, MockConverter};

const BOUNDARY: &str = "convertino-test-boundary";

/// Test fixture wrapping an in-process router.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_base64() {
///     let fixture = TestFixture::new().await;
///     let form = MultipartForm::new().text("text", "hello");
///     let response = fixture.convert("base64-encode", form).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Temporary directory holding both staging areas
    pub temp_dir: TempDir,
    pub config: Config,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Bytes,
}

impl TestResponse {
    /// Body parsed as JSON, or `Null` when it is not JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestFixture {
    /// Fixture with every real converter registered.
    pub async fn new() -> Self {
        Self::build(|config| ConverterRegistry::new(config).expect("Failed to build registry"), |_| {})
            .await
    }

    /// Fixture whose only operation is served by `mock`.
    pub async fn with_mock(mock: MockConverter) -> Self {
        Self::build(move |_| ConverterRegistry::empty().register(Arc::new(mock)), |_| {}).await
    }

    /// Fixture with a config tweak applied before anything is built.
    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(|config| ConverterRegistry::new(config).expect("Failed to build registry"), tweak)
            .await
    }

    async fn build(
        registry: impl FnOnce(&Config) -> ConverterRegistry,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::config_in(temp_dir.path());
        tweak(&mut config);

        let store = Arc::new(StagingStore::new(&config.storage));
        store.ensure_dirs().await.expect("Failed to create staging dirs");
        let registry = Arc::new(registry(&config));
        let executor = Arc::new(JobExecutor::new(&config, registry, store));

        let state = Arc::new(convertino_server::state::AppState::new(config.clone(), executor));
        let router = convertino_server::api::create_router(state);

        Self {
            router,
            temp_dir,
            config,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// POST a multipart form to `/api/v1/convert/{operation}`.
    pub async fn convert(&self, operation: &str, form: MultipartForm) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/convert/{}", operation))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form.finish()))
            .unwrap();
        self.send(request).await
    }

    /// Send a raw request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            bytes,
        }
    }

    /// Number of entries left in both staging areas.
    pub fn staged_entries(&self) -> usize {
        let count = |p: &Path| std::fs::read_dir(p).map(|d| d.count()).unwrap_or(0);
        count(&self.config.storage.upload_dir) + count(&self.config.storage.output_dir)
    }

    /// Staged entries may be released by a detached task; poll briefly.
    pub async fn wait_until_clean(&self) -> bool {
        for _ in 0..50 {
            if self.staged_entries() == 0 {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        false
    }
}

/// Minimal multipart/form-data body builder.
#[derive(Debug, Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status,
            $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            $response.text()
        );
    };
}
