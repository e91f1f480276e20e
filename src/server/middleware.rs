//! Structured request logging
//!
//! Wraps every request in an `http_request` span carrying a `trace_id`. The id
//! comes from the caller's `x-trace-id` header when present, otherwise a new
//! UUIDv7 is minted. It is echoed back on the response so agent loops can
//! correlate their tool calls with server logs.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

pub async fn log_requests(request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    async move {
        let start = Instant::now();
        info!(query = %query, "Request received");

        let mut response = next.run(request).await;

        info!(
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
