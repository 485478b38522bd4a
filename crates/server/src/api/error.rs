//! Error responses for the conversion API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use convertino_core::{ErrorKind, JobFailure};

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// An error leaving an API handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                kind,
                job_id: None,
            },
        }
    }

    /// Malformed request that never reached the executor.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Engine, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// HTTP status for a failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Io => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Engine | ErrorKind::ArtifactNotFound => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
    }
}

impl From<JobFailure> for ApiError {
    fn from(failure: JobFailure) -> Self {
        let status = if failure.unknown_operation {
            StatusCode::NOT_FOUND
        } else {
            status_for(failure.kind)
        };
        Self {
            status,
            body: ErrorResponse {
                error: failure.message,
                kind: failure.kind,
                job_id: Some(failure.job_id.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convertino_core::{ConvertError, JobId};

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Io), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Engine), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status_for(ErrorKind::ArtifactNotFound),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for(ErrorKind::Network), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_unknown_operation_is_not_found() {
        let error = ConvertError::UnknownOperation {
            name: "nope".to_string(),
        };
        let api_error = ApiError::from(JobFailure::new(JobId::new(), &error));
        assert_eq!(api_error.status(), StatusCode::NOT_FOUND);
        assert_eq!(api_error.body.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_engine_message_is_passed_through() {
        let error = ConvertError::engine("ffmpeg", "Invalid data found when processing input");
        let api_error = ApiError::from(JobFailure::new(JobId::new(), &error));
        assert_eq!(api_error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.body.error, "Invalid data found when processing input");
        assert!(api_error.body.job_id.is_some());
    }
}
