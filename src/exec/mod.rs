//! Code execution inside agent workspaces
//!
//! - `runner` - spawns one contained process and captures its output
//! - `sandbox` - the upload, execute and test handlers
//! - `types` - payloads shared with the HTTP surface and the client

pub mod runner;
pub mod sandbox;
pub mod types;

pub use runner::{run_command, RunLimits, RunOutput};
pub use sandbox::{ExecutionSettings, Sandbox};
pub use types::{
    ErrorBody, ExecuteResponse, ExecutionReport, ExecutionStatus, FileUpload, TestReport,
    TestResponse, TestStatus, UploadResponse, UploadedFile,
};
