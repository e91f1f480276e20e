//! HTTP surface of the sandbox service
//!
//! # Request Flow
//!
//! ```text
//! Client ──POST /upload/──► log_requests ──► rate limit ──► Sandbox::upload
//!                                                              │
//!                                                   WorkspaceStore::allocate
//!                                                              │
//! Client ◄──{agent_id, info}───────────────────────────────────┘
//!
//! Client ──POST /execute/──► ... ──► resolve ──► interpreter (own pgid, deadline)
//! Client ──POST /test/─────► ... ──► resolve ──► test runner (own pgid, deadline)
//! ```

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use crate::config::SandboxConfig;
use crate::exec::{ExecutionSettings, Sandbox};
use crate::security::RateLimiter;
use crate::workspace::WorkspaceStore;

pub use error::ApiError;
pub use routes::AppState;

/// Build the application router
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload/", post(routes::upload))
        .route("/upload", post(routes::upload))
        .route("/execute/", post(routes::execute))
        .route("/execute", post(routes::execute))
        .route("/test/", post(routes::run_tests))
        .route("/test", post(routes::run_tests))
        .route("/workspace/", delete(routes::release))
        .route("/workspace", delete(routes::release))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::prometheus_metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .with_state(state)
}

/// Build handler state from a config
pub fn build_state(config: &SandboxConfig) -> crate::error::Result<AppState> {
    let store = Arc::new(WorkspaceStore::new(&config.workspace_root)?);
    Ok(AppState {
        sandbox: Sandbox::new(store, ExecutionSettings::from(config)),
        rate_limiter: Arc::new(RateLimiter::new(
            config.rate_limit_burst,
            config.rate_limit_per_sec,
        )),
    })
}

/// Run the service until Ctrl+C / SIGTERM, then remove every workspace
pub async fn serve(config: SandboxConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = build_state(&config)?;
    let store = Arc::clone(state.sandbox.store());

    let sweeper = WorkspaceStore::start_sweeper(
        Arc::clone(&store),
        config.sweep_interval,
        config.workspace_ttl,
    );

    let app = create_router(state, config.max_upload_bytes);
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        root = %store.root().display(),
        interpreter = %config.interpreter.program,
        "Sandbox server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    store.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
