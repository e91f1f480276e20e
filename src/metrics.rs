//! Prometheus metrics for the sandbox service
//!
//! All metrics live in one process-wide registry, exposed in text format by
//! `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_vec_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Encoder, Gauge, Histogram,
    HistogramVec, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Requests received, by endpoint (upload/execute/test/release)
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        "agentbox_requests_total",
        "Sandbox requests received",
        &["endpoint"],
        REGISTRY
    )
    .expect("metric can be registered");

    /// Errors by kind (unknown_agent, invalid_path, spawn_failed, ...)
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        "agentbox_errors_total",
        "Sandbox request errors",
        &["kind"],
        REGISTRY
    )
    .expect("metric can be registered");

    /// Finished process runs, by kind (execute/test) and outcome
    pub static ref EXECUTIONS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        "agentbox_executions_total",
        "Processes run inside workspaces",
        &["kind", "outcome"],
        REGISTRY
    )
    .expect("metric can be registered");

    pub static ref EXECUTION_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "agentbox_execution_duration_seconds",
        "Wall-clock duration of workspace processes",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0],
        REGISTRY
    )
    .expect("metric can be registered");

    pub static ref WORKSPACES_ACTIVE: Gauge = register_gauge_with_registry!(
        "agentbox_workspaces_active",
        "Workspaces currently allocated",
        REGISTRY
    )
    .expect("metric can be registered");

    pub static ref WORKSPACES_SWEPT_TOTAL: Counter = register_counter_with_registry!(
        "agentbox_workspaces_swept_total",
        "Workspaces removed by TTL expiry",
        REGISTRY
    )
    .expect("metric can be registered");

    pub static ref UPLOAD_BYTES: Histogram = register_histogram_with_registry!(
        "agentbox_upload_bytes",
        "Total bytes written per upload",
        vec![256.0, 1024.0, 16384.0, 262144.0, 1048576.0, 16777216.0],
        REGISTRY
    )
    .expect("metric can be registered");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
