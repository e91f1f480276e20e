//! Mapping of sandbox errors onto HTTP responses
//!
//! Every error body has the same shape as the not-found results:
//! `{"error": "..."}`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use crate::error::SandboxError;
use crate::exec::ErrorBody;
use crate::metrics::ERRORS_TOTAL;

/// Error returned by the HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Malformed request that never reached the sandbox
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Sandbox(e) => match e {
                SandboxError::UnknownAgent(_) => StatusCode::NOT_FOUND,
                SandboxError::InvalidPath(_) => StatusCode::BAD_REQUEST,
                SandboxError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                SandboxError::WorkspaceCorrupted { .. }
                | SandboxError::UploadFailed { .. }
                | SandboxError::Spawn { .. }
                | SandboxError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Sandbox(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let retry_after = match &self {
            ApiError::Sandbox(SandboxError::RateLimited { retry_after_ms }) => {
                Some(retry_after_ms.div_ceil(1000).max(1))
            }
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SandboxError::UnknownAgent("a".into()), StatusCode::NOT_FOUND),
            (SandboxError::InvalidPath("..".into()), StatusCode::BAD_REQUEST),
            (
                SandboxError::RateLimited { retry_after_ms: 100 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                SandboxError::Spawn {
                    program: "python3".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
        assert_eq!(
            ApiError::BadRequest("no files".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::from(SandboxError::RateLimited { retry_after_ms: 250 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
