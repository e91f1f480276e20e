//! Request/response payloads shared by the server and the client

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::runner::RunOutput;

/// Body of the not-found result for `/execute/`
pub const FILE_NOT_FOUND: &str = "File not found";
/// Body of the not-found result for `/test/`
pub const TEST_DIR_NOT_FOUND: &str = "Test directory not found";

/// One file of an upload batch, as received
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub content: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Where an uploaded file ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Filename exactly as the caller sent it
    pub filename: String,
    /// Absolute path inside the workspace
    pub location: PathBuf,
}

/// Response of `/upload/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub agent_id: String,
    /// One entry per uploaded file, in upload order
    pub info: Vec<UploadedFile>,
}

/// Outcome of running a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    TimedOut,
}

impl ExecutionStatus {
    pub fn from_output(output: &RunOutput) -> Self {
        if output.timed_out {
            ExecutionStatus::TimedOut
        } else if output.exit_code == Some(0) {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::TimedOut => "timed_out",
        }
    }
}

/// Outcome of a test run, derived from the runner's exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Every collected test passed
    Passed,
    /// At least one test failed
    Failed,
    /// The runner found nothing to run
    NoTests,
    /// Collection error, usage error, crash or signal
    Error,
    TimedOut,
}

impl TestStatus {
    /// Map pytest-style exit codes: 0 passed, 1 failed, 5 nothing collected
    pub fn from_output(output: &RunOutput) -> Self {
        if output.timed_out {
            return TestStatus::TimedOut;
        }
        match output.exit_code {
            Some(0) => TestStatus::Passed,
            Some(1) => TestStatus::Failed,
            Some(5) => TestStatus::NoTests,
            _ => TestStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::NoTests => "no_tests",
            TestStatus::Error => "error",
            TestStatus::TimedOut => "timed_out",
        }
    }
}

/// Captured result of `/execute/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub status: ExecutionStatus,
    pub duration_ms: f64,
    pub timed_out: bool,
    /// Output exceeded the per-stream cap and was cut
    pub truncated: bool,
}

impl From<RunOutput> for ExecutionReport {
    fn from(output: RunOutput) -> Self {
        let status = ExecutionStatus::from_output(&output);
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            status,
            duration_ms: output.duration_ms,
            timed_out: output.timed_out,
            truncated: output.truncated,
        }
    }
}

/// Captured result of `/test/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub status: TestStatus,
    pub duration_ms: f64,
    pub timed_out: bool,
    pub truncated: bool,
}

impl From<RunOutput> for TestReport {
    fn from(output: RunOutput) -> Self {
        let status = TestStatus::from_output(&output);
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            status,
            duration_ms: output.duration_ms,
            timed_out: output.timed_out,
            truncated: output.truncated,
        }
    }
}

/// Structured error body: `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Response of `/execute/`: a report, or a not-found marker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Completed(ExecutionReport),
    NotFound(ErrorBody),
}

impl ExecuteResponse {
    pub fn file_not_found() -> Self {
        ExecuteResponse::NotFound(ErrorBody {
            error: FILE_NOT_FOUND.to_string(),
        })
    }

    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            ExecuteResponse::Completed(report) => Some(report),
            ExecuteResponse::NotFound(_) => None,
        }
    }
}

/// Response of `/test/`: a report, or a not-found marker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestResponse {
    Completed(TestReport),
    NotFound(ErrorBody),
}

impl TestResponse {
    pub fn directory_not_found() -> Self {
        TestResponse::NotFound(ErrorBody {
            error: TEST_DIR_NOT_FOUND.to_string(),
        })
    }

    pub fn report(&self) -> Option<&TestReport> {
        match self {
            TestResponse::Completed(report) => Some(report),
            TestResponse::NotFound(_) => None,
        }
    }
}
