//! Error taxonomy for the sandbox service
//!
//! Missing files and directories are NOT errors here: they are ordinary
//! outcomes returned as data by the handlers. Everything in [`SandboxError`]
//! is either a caller mistake (unknown id, escaping path, rate limit) or an
//! infrastructure failure (spawn, disk).

use std::path::PathBuf;

/// Errors raised by the workspace store and the handlers
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The agent id was never allocated (or was already released)
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The agent id is known but its directory is gone from disk
    #[error("Workspace for {agent_id} is missing at {}", path.display())]
    WorkspaceCorrupted { agent_id: String, path: PathBuf },

    /// A caller-supplied filename tried to leave the workspace
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Writing one file of an upload batch failed
    #[error("Failed to write {filename}: {source}")]
    UploadFailed {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// The interpreter or test runner could not be launched
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Too many requests in the current window
    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Short label used for the `kind` dimension of error metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::UnknownAgent(_) => "unknown_agent",
            SandboxError::WorkspaceCorrupted { .. } => "workspace_corrupted",
            SandboxError::InvalidPath(_) => "invalid_path",
            SandboxError::UploadFailed { .. } => "upload_failed",
            SandboxError::Spawn { .. } => "spawn_failed",
            SandboxError::RateLimited { .. } => "rate_limited",
            SandboxError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
