//! The conversion endpoint: multipart request in, artifact or error out.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

use convertino_core::{Delivery, Params};

use super::error::ApiError;
use crate::state::AppState;

/// Chunk size used when streaming an artifact back.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// `POST /api/v1/convert/{operation}`
///
/// Every multipart part carrying a file name is staged as an input, in
/// order; every other part is a text parameter. Validation, execution and
/// delivery run on a detached task so the job's files are released even if
/// the client hangs up mid-request.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let executor = state.executor().clone();
    let mut job = executor.begin(&operation)?;
    let mut params = Params::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ApiError::bad_request(format!("Malformed multipart body: {}", e))),
        };
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let stream = field.map_err(std::io::Error::other);
                executor.stage(&mut job, &file_name, stream).await?;
            }
            None => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read field '{}': {}", name, e))
                })?;
                params.insert(name, value);
            }
        }
    }

    debug!(job_id = %job.id(), inputs = job.inputs().len(), params = params.len(), "Request parsed");

    let task = tokio::spawn(async move {
        let completed = executor.run(job, &params).await?;
        executor.deliver(completed).await
    });

    let delivery = match task.await {
        Ok(result) => result?,
        Err(e) => {
            error!(error = %e, "Conversion task aborted");
            return Err(ApiError::internal("Conversion task aborted"));
        }
    };

    Ok(artifact_response(delivery))
}

/// Builds the binary response for a delivered artifact.
fn artifact_response(delivery: Delivery) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&delivery.content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(delivery.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&delivery.file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&delivery.job_id.to_string()) {
        headers.insert(HeaderName::from_static("x-job-id"), value);
    }
    for (key, value) in &delivery.extra {
        let Ok(name) = HeaderName::from_bytes(extra_header_name(key).as_bytes()) else {
            continue;
        };
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }

    let body = Body::from_stream(file_stream(delivery.file));
    (StatusCode::OK, headers, body).into_response()
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

fn extra_header_name(key: &str) -> String {
    match key {
        "replacements" => "x-replacements-made".to_string(),
        other => format!("x-convertino-{}", other.replace('_', "-").to_ascii_lowercase()),
    }
}

fn file_stream(file: tokio::fs::File) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    futures::stream::try_unfold(file, |mut file| async move {
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            return Ok(None);
        }
        buffer.truncate(read);
        Ok(Some((Bytes::from(buffer), file)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
    }

    #[test]
    fn test_content_disposition_escapes_quotes_and_unicode() {
        let value = content_disposition("résumé \"final\".docx");
        assert!(value.starts_with("attachment; filename=\"r_sum_ _final_.docx\""));
        assert!(value.contains("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22final%22.docx"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn test_extra_header_names() {
        assert_eq!(extra_header_name("replacements"), "x-replacements-made");
        assert_eq!(extra_header_name("page_count"), "x-convertino-page-count");
    }
}
