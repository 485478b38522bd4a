//! End-to-end tests for the conversion API.
//!
//! Requests go through the real router, executor and staging store. Only
//! pure-library converters are exercised here; engine-backed operations are
//! covered by the mock converter.

mod common;

use std::io::Read;

use axum::http::StatusCode;
use common::{fixtures, MockBehavior, MockConverter, MultipartForm, TestFixture};
use convertino_core::Operation;

// =============================================================================
// Metadata endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["jobs"]["active_jobs"], 0);
}

#[tokio::test]
async fn test_operations_lists_every_operation() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/operations").await;
    assert_status!(response, StatusCode::OK);

    let json = response.json();
    let operations = json.as_array().expect("operations array");
    assert_eq!(operations.len(), Operation::ALL.len());
    let merge = operations
        .iter()
        .find(|op| op["operation"] == "pdf-merge")
        .expect("pdf-merge listed");
    assert_eq!(merge["family"], "pdf");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert!(!response.text().contains(&*fixture.temp_dir.path().to_string_lossy()));
    assert_eq!(response.json()["storage"]["max_files_per_job"], 20);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture
        .convert("base64-encode", MultipartForm::new().text("text", "x"))
        .await;

    let response = fixture.get("/metrics").await;
    assert_status!(response, StatusCode::OK);
    let text = response.text();
    assert!(text.contains("convertino_jobs_total"));
    assert!(text.contains("convertino_http_requests_total"));
}

// =============================================================================
// Successful conversions
// =============================================================================

#[tokio::test]
async fn test_parameter_only_conversion() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .convert("base64-encode", MultipartForm::new().text("text", "hello"))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.text(), "aGVsbG8=");
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert!(response
        .header("content-disposition")
        .unwrap()
        .contains("filename=\"encoded.txt\""));
    assert!(response.header("x-job-id").is_some());
    assert!(fixture.wait_until_clean().await);
}

#[tokio::test]
async fn test_file_conversion() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new().file("file", "settings.json", br#"{"name":"demo"}"#);
    let response = fixture.convert("json-to-yaml", form).await;
    assert_status!(response, StatusCode::OK);
    assert!(response.text().contains("name: demo"));
    assert!(response
        .header("content-disposition")
        .unwrap()
        .contains("settings.yaml"));
    assert!(fixture.wait_until_clean().await);
}

#[tokio::test]
async fn test_image_convert_to_jpeg() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new()
        .file("file", "photo.png", &fixtures::png(8, 8, [200, 30, 30]))
        .text("target_format", "jpeg");
    let response = fixture.convert("image-convert", form).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert_eq!(&response.bytes[..3], &[0xFF, 0xD8, 0xFF]);
    assert!(response
        .header("content-disposition")
        .unwrap()
        .contains("photo.jpeg"));
}

#[tokio::test]
async fn test_qr_code() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new().text("data", "https://example.com");
    let response = fixture.convert("qr-code", form).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(&response.bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn test_uuid_generate() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new().text("count", "3").text("version", "4");
    let response = fixture.convert("uuid-generate", form).await;
    assert_status!(response, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["count"], 3);
    assert_eq!(json["uuids"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_archive_create() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new()
        .file("files", "one.txt", b"first")
        .file("files", "two.txt", b"second");
    let response = fixture.convert("archive-create", form).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/zip"));

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(response.bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 2);
    let mut content = String::new();
    archive
        .by_name("one.txt")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "first");
    assert!(fixture.wait_until_clean().await);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_unknown_operation_is_404() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .convert("transmogrify", MultipartForm::new().file("file", "a.txt", b"a"))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let json = response.json();
    assert_eq!(json["kind"], "validation");
    assert!(json["error"].as_str().unwrap().contains("transmogrify"));
    assert_eq!(fixture.staged_entries(), 0);
}

#[tokio::test]
async fn test_wrong_extension_is_400() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new().file("file", "notes.txt", b"{}");
    let response = fixture.convert("json-to-yaml", form).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "validation");
    assert!(response.json()["job_id"].is_string());
    assert!(fixture.wait_until_clean().await);
}

#[tokio::test]
async fn test_invalid_base64_is_400() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new().text("text", "not base64!!");
    let response = fixture.convert("base64-decode", form).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Invalid Base64 string");
}

#[tokio::test]
async fn test_fetch_rejects_non_http_url() {
    let fixture = TestFixture::new().await;

    let form = MultipartForm::new().text("url", "ftp://example.com/video");
    let response = fixture.convert("media-fetch", form).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_and_cleaned() {
    let fixture = TestFixture::with_config(|config| config.storage.max_upload_bytes = 16).await;

    let form = MultipartForm::new().file("files", "big.txt", &[b'x'; 1024]);
    let response = fixture.convert("archive-create", form).await;
    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json()["kind"], "io");
    assert!(fixture.wait_until_clean().await);
}

#[tokio::test]
async fn test_engine_failure_passes_diagnostic_through() {
    let mock = MockConverter::new(Operation::MediaConvert).with_behavior(MockBehavior::FailAfterWriting(
        "Invalid data found when processing input".to_string(),
    ));
    let fixture = TestFixture::with_mock(mock.clone()).await;

    let form = MultipartForm::new().file("file", "clip.mp4", b"not a video");
    let response = fixture.convert("media-convert", form).await;
    assert_status!(response, StatusCode::INTERNAL_SERVER_ERROR);

    let json = response.json();
    assert_eq!(json["kind"], "engine");
    assert_eq!(json["error"], "Invalid data found when processing input");
    assert_eq!(mock.executions(), 1);
    assert!(fixture.wait_until_clean().await);
}

#[tokio::test]
async fn test_missing_artifact_is_reported() {
    let mock = MockConverter::new(Operation::MediaFetch).with_behavior(MockBehavior::WriteNothing);
    let fixture = TestFixture::with_mock(mock).await;

    let form = MultipartForm::new().text("url", "https://example.com/watch?v=1");
    let response = fixture.convert("media-fetch", form).await;
    assert_status!(response, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["kind"], "artifact_not_found");
    assert!(fixture.wait_until_clean().await);
}

#[tokio::test]
async fn test_mock_receives_inputs_in_order_with_params() {
    let mock = MockConverter::new(Operation::PdfMerge);
    let fixture = TestFixture::with_mock(mock.clone()).await;

    let form = MultipartForm::new()
        .file("files", "b.pdf", b"BBB")
        .text("note", "kept")
        .file("files", "a.pdf", b"AAA");
    let response = fixture.convert("pdf-merge", form).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.text(), "BBBAAA");

    let recorded = mock.recorded_executions();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].inputs, vec!["b.pdf".to_string(), "a.pdf".to_string()]);
    assert_eq!(recorded[0].params.get("note"), Some("kept"));
    assert!(fixture.wait_until_clean().await);
}
