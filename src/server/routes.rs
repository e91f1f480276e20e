//! HTTP handlers for the sandbox endpoints
//!
//! | Method | Path | Query | Response |
//! |---|---|---|---|
//! | POST | `/upload/` | - (multipart files) | `{agent_id, info}` |
//! | POST | `/execute/` | `agent_id`, `filename` | report or `{"error": "File not found"}` |
//! | POST | `/test/` | `agent_id` | report or `{"error": "Test directory not found"}` |
//! | DELETE | `/workspace/` | `agent_id` | `{agent_id, released}` |
//! | GET | `/health` | - | `{status, workspaces}` |
//! | GET | `/metrics` | - | Prometheus text |

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::exec::{ExecuteResponse, FileUpload, Sandbox, TestResponse, UploadResponse};
use crate::metrics::{self, REQUESTS_TOTAL};
use crate::security::RateLimiter;

/// Shared state for every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub sandbox: Sandbox,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteParams {
    pub agent_id: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct AgentParams {
    pub agent_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub agent_id: String,
    pub released: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub workspaces: usize,
}

/// `POST /upload/` - every multipart part carrying a filename is one file
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    REQUESTS_TOTAL.with_label_values(&["upload"]).inc();
    state.rate_limiter.check()?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        files.push(FileUpload::new(filename, content.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }

    Ok(Json(state.sandbox.upload(files).await?))
}

/// `POST /execute/?agent_id=&filename=`
pub async fn execute(
    State(state): State<AppState>,
    Query(params): Query<ExecuteParams>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    REQUESTS_TOTAL.with_label_values(&["execute"]).inc();
    state.rate_limiter.check()?;
    Ok(Json(
        state.sandbox.execute(&params.agent_id, &params.filename).await?,
    ))
}

/// `POST /test/?agent_id=`
pub async fn run_tests(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
) -> Result<Json<TestResponse>, ApiError> {
    REQUESTS_TOTAL.with_label_values(&["test"]).inc();
    state.rate_limiter.check()?;
    Ok(Json(state.sandbox.run_tests(&params.agent_id).await?))
}

/// `DELETE /workspace/?agent_id=`
pub async fn release(
    State(state): State<AppState>,
    Query(params): Query<AgentParams>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    REQUESTS_TOTAL.with_label_values(&["release"]).inc();
    state.sandbox.release(&params.agent_id).await?;
    Ok(Json(ReleaseResponse {
        agent_id: params.agent_id,
        released: true,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        workspaces: state.sandbox.store().len().await,
    })
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
}
