//! Agentbox - remote code-execution sandbox for LLM coding agents
//!
//! Agents upload a batch of files, get back an opaque agent id, then execute
//! single files or run the test suite inside that agent's private workspace.
//! Each run is a fresh OS process with a deadline, an output cap and
//! process-group termination.
//!
//! # Modules
//!
//! - `workspace` - agent id → directory store with expiry
//! - `exec` - process runner and the upload/execute/test handlers
//! - `server` - axum HTTP surface
//! - `client` - reqwest client used by agent loops
//! - `security` - filename containment and rate limiting
//! - `config` - environment-driven configuration
//! - `metrics` - Prometheus metrics
//! - `tracing` - logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use agentbox::client::SandboxClient;
//!
//! let mut sandbox = SandboxClient::new("http://127.0.0.1:8000");
//! sandbox.upload(vec![("main.py".into(), b"print('hi')".to_vec())]).await?;
//! let result = sandbox.execute("main.py").await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod exec;
pub mod metrics;
pub mod security;
pub mod server;
pub mod tracing;
pub mod workspace;

// Re-export commonly used types at crate root for convenience
pub use client::{ClientError, SandboxClient};
pub use config::SandboxConfig;
pub use error::SandboxError;
pub use exec::Sandbox;
pub use workspace::WorkspaceStore;
