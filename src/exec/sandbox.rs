//! Upload, Execution and Test handlers
//!
//! [`Sandbox`] is the transport-independent core behind the HTTP endpoints:
//!
//! ```text
//! upload(files)            ──► allocate workspace ──► write files ──► {agent_id, info}
//! execute(agent_id, file)  ──► resolve ──► interpreter <file>      ──► report | "File not found"
//! run_tests(agent_id)      ──► resolve ──► test runner <workspace> ──► report | "Test directory not found"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::runner::{run_command, RunLimits, RunOutput};
use super::types::{
    ExecuteResponse, ExecutionReport, FileUpload, TestReport, TestResponse, UploadResponse,
    UploadedFile,
};
use crate::config::{CommandSpec, SandboxConfig};
use crate::error::{Result, SandboxError};
use crate::metrics::{EXECUTIONS_TOTAL, EXECUTION_DURATION, UPLOAD_BYTES};
use crate::security::{resolve_within, sanitize_filename};
use crate::workspace::WorkspaceStore;

/// Settings the handlers need from [`SandboxConfig`]
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub interpreter: CommandSpec,
    pub test_runner: CommandSpec,
    pub execution_limits: RunLimits,
    pub test_limits: RunLimits,
}

impl From<&SandboxConfig> for ExecutionSettings {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            test_runner: config.test_runner.clone(),
            execution_limits: RunLimits {
                timeout: config.execution_timeout,
                max_output_bytes: config.max_output_bytes,
            },
            test_limits: RunLimits {
                timeout: config.test_timeout,
                max_output_bytes: config.max_output_bytes,
            },
        }
    }
}

/// Upload/execute/test operations over a shared workspace store
#[derive(Debug, Clone)]
pub struct Sandbox {
    store: Arc<WorkspaceStore>,
    settings: Arc<ExecutionSettings>,
}

impl Sandbox {
    pub fn new(store: Arc<WorkspaceStore>, settings: ExecutionSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }

    /// Write a batch of files into a brand new workspace
    ///
    /// Filenames are sanitized before anything touches the disk. If any write
    /// fails the new workspace is released and the error names the file.
    pub async fn upload(&self, files: Vec<FileUpload>) -> Result<UploadResponse> {
        let targets = files
            .iter()
            .map(|file| sanitize_filename(&file.filename))
            .collect::<Result<Vec<_>>>()?;

        let workspace = self.store.allocate().await?;
        let agent_id = workspace.agent_id().to_string();

        let written = {
            let _gate = workspace.lock_exclusive().await?;
            write_batch(workspace.dir(), &files, &targets).await
        };

        match written {
            Ok(info) => {
                let total: usize = files.iter().map(|f| f.content.len()).sum();
                UPLOAD_BYTES.observe(total as f64);
                info!(agent_id = %agent_id, files = info.len(), bytes = total, "Upload stored");
                Ok(UploadResponse { agent_id, info })
            }
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Upload failed, releasing workspace");
                if let Err(release_err) = self.store.release(&agent_id).await {
                    warn!(agent_id = %agent_id, error = %release_err, "Failed to release workspace");
                }
                Err(e)
            }
        }
    }

    /// Run one uploaded file with the configured interpreter
    ///
    /// A missing file (or a workspace whose directory vanished) is a normal
    /// `File not found` response, not an error.
    pub async fn execute(&self, agent_id: &str, filename: &str) -> Result<ExecuteResponse> {
        let workspace = match self.store.resolve(agent_id).await {
            Ok(ws) => ws,
            Err(SandboxError::WorkspaceCorrupted { .. }) => return Ok(ExecuteResponse::file_not_found()),
            Err(e) => return Err(e),
        };
        let path = resolve_within(workspace.dir(), filename)?;

        let _gate = workspace.lock_shared().await?;
        if !tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Ok(ExecuteResponse::file_not_found());
        }

        let output = self
            .run(
                "execute",
                &self.settings.interpreter,
                &path,
                workspace.dir(),
                self.settings.execution_limits,
            )
            .await?;
        let report = ExecutionReport::from(output);
        EXECUTIONS_TOTAL
            .with_label_values(&["execute", report.status.as_str()])
            .inc();
        info!(
            agent_id = %agent_id,
            filename = %filename,
            status = report.status.as_str(),
            exit_code = ?report.exit_code,
            duration_ms = report.duration_ms,
            "Execution finished"
        );
        Ok(ExecuteResponse::Completed(report))
    }

    /// Run the configured test runner over the whole workspace
    pub async fn run_tests(&self, agent_id: &str) -> Result<TestResponse> {
        let workspace = match self.store.resolve(agent_id).await {
            Ok(ws) => ws,
            Err(SandboxError::WorkspaceCorrupted { .. }) => {
                return Ok(TestResponse::directory_not_found())
            }
            Err(e) => return Err(e),
        };

        let _gate = workspace.lock_shared().await?;
        let output = self
            .run(
                "test",
                &self.settings.test_runner,
                workspace.dir(),
                workspace.dir(),
                self.settings.test_limits,
            )
            .await?;
        let report = TestReport::from(output);
        EXECUTIONS_TOTAL
            .with_label_values(&["test", report.status.as_str()])
            .inc();
        info!(
            agent_id = %agent_id,
            status = report.status.as_str(),
            exit_code = ?report.exit_code,
            duration_ms = report.duration_ms,
            "Test run finished"
        );
        Ok(TestResponse::Completed(report))
    }

    /// Delete a workspace and forget its agent id
    pub async fn release(&self, agent_id: &str) -> Result<()> {
        self.store.release(agent_id).await
    }

    async fn run(
        &self,
        kind: &str,
        command: &CommandSpec,
        target: &Path,
        cwd: &Path,
        limits: RunLimits,
    ) -> Result<RunOutput> {
        let start = Instant::now();
        let result = run_command(command, &[target], cwd, limits).await;
        EXECUTION_DURATION
            .with_label_values(&[kind])
            .observe(start.elapsed().as_secs_f64());
        result
    }
}

async fn write_batch(
    dir: &Path,
    files: &[FileUpload],
    targets: &[std::path::PathBuf],
) -> Result<Vec<UploadedFile>> {
    let mut info = Vec::with_capacity(files.len());

    for (file, relative) in files.iter().zip(targets) {
        let location = dir.join(relative);
        let write = async {
            if let Some(parent) = location.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&location, &file.content).await
        };
        write.await.map_err(|source| SandboxError::UploadFailed {
            filename: file.filename.clone(),
            source,
        })?;

        info.push(UploadedFile {
            filename: file.filename.clone(),
            location,
        });
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::types::{ExecutionStatus, TestStatus};
    use std::time::Duration;

    fn sandbox_with(interpreter: CommandSpec, test_runner: CommandSpec) -> (tempfile::TempDir, Sandbox) {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(WorkspaceStore::new(root.path()).unwrap());
        let limits = RunLimits {
            timeout: Duration::from_secs(5),
            max_output_bytes: 64 * 1024,
        };
        let settings = ExecutionSettings {
            interpreter,
            test_runner,
            execution_limits: limits,
            test_limits: limits,
        };
        (root, Sandbox::new(store, settings))
    }

    fn sh_sandbox() -> (tempfile::TempDir, Sandbox) {
        // "test runner" lists the workspace so tests can see what it was given
        sandbox_with(CommandSpec::new("sh", &[]), CommandSpec::new("ls", &[]))
    }

    #[tokio::test]
    async fn test_upload_preserves_order_and_names() {
        let (_root, sandbox) = sh_sandbox();
        let files = vec![
            FileUpload::new("b.sh", "echo b"),
            FileUpload::new("a.sh", "echo a"),
            FileUpload::new("pkg/c.sh", "echo c"),
        ];

        let resp = sandbox.upload(files).await.unwrap();

        let names: Vec<_> = resp.info.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["b.sh", "a.sh", "pkg/c.sh"]);
        for entry in &resp.info {
            assert!(entry.location.is_absolute());
            assert!(entry.location.is_file());
        }
        assert_eq!(std::fs::read_to_string(&resp.info[2].location).unwrap(), "echo c");
    }

    #[tokio::test]
    async fn test_upload_traversal_stays_inside_workspace() {
        let (root, sandbox) = sh_sandbox();
        let resp = sandbox
            .upload(vec![FileUpload::new("../../escape.sh", "echo x")])
            .await
            .unwrap();

        let workspace = sandbox.store().resolve(&resp.agent_id).await.unwrap();
        assert_eq!(resp.info[0].filename, "../../escape.sh");
        assert_eq!(resp.info[0].location, workspace.dir().join("escape.sh"));
        assert!(!root.path().join("escape.sh").exists());
        assert!(!root.path().parent().unwrap().join("escape.sh").exists());
    }

    #[tokio::test]
    async fn test_upload_rejects_unusable_names_before_allocating() {
        let (_root, sandbox) = sh_sandbox();
        let err = sandbox
            .upload(vec![FileUpload::new("ok.sh", "echo"), FileUpload::new("..", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidPath(_)));
        assert!(sandbox.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_write_releases_workspace() {
        let (_root, sandbox) = sh_sandbox();
        // Second file needs "a.sh" to be a directory, which the first write made a file
        let err = sandbox
            .upload(vec![FileUpload::new("a.sh", "echo"), FileUpload::new("a.sh/b.sh", "echo")])
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::UploadFailed { ref filename, .. } if filename == "a.sh/b.sh"));
        assert!(sandbox.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_then_execute() {
        let (_root, sandbox) = sh_sandbox();
        let resp = sandbox
            .upload(vec![FileUpload::new("hello.sh", "echo 'Hello, World!'")])
            .await
            .unwrap();

        let result = sandbox.execute(&resp.agent_id, "hello.sh").await.unwrap();
        let report = result.report().unwrap();
        assert_eq!(report.stdout, "Hello, World!\n");
        assert_eq!(report.stderr, "");
        assert_eq!(report.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_execute_failure_is_reported_not_raised() {
        let (_root, sandbox) = sh_sandbox();
        let resp = sandbox
            .upload(vec![FileUpload::new("bad.sh", "echo nope >&2\nexit 7")])
            .await
            .unwrap();

        let result = sandbox.execute(&resp.agent_id, "bad.sh").await.unwrap();
        let report = result.report().unwrap();
        assert_eq!(report.exit_code, Some(7));
        assert_eq!(report.stderr, "nope\n");
        assert_eq!(report.status, ExecutionStatus::Failure);
    }

    #[tokio::test]
    async fn test_execute_unknown_agent() {
        let (_root, sandbox) = sh_sandbox();
        let err = sandbox.execute("agent_unknown", "x.sh").await.unwrap_err();
        assert!(matches!(err, SandboxError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn test_execute_missing_file_is_not_found() {
        let (_root, sandbox) = sh_sandbox();
        let resp = sandbox.upload(vec![FileUpload::new("a.sh", "echo")]).await.unwrap();

        let result = sandbox.execute(&resp.agent_id, "missing.sh").await.unwrap();
        assert!(matches!(result, ExecuteResponse::NotFound(ref body) if body.error == "File not found"));

        // Directories are not runnable files either
        let resp = sandbox.upload(vec![FileUpload::new("pkg/a.sh", "echo")]).await.unwrap();
        let result = sandbox.execute(&resp.agent_id, "pkg").await.unwrap();
        assert!(result.report().is_none());
    }

    #[tokio::test]
    async fn test_execute_rejects_escaping_paths() {
        let (_root, sandbox) = sh_sandbox();
        let resp = sandbox.upload(vec![FileUpload::new("a.sh", "echo")]).await.unwrap();

        for bad in ["../a.sh", "/etc/passwd", "pkg/../../a.sh"] {
            let err = sandbox.execute(&resp.agent_id, bad).await.unwrap_err();
            assert!(matches!(err, SandboxError::InvalidPath(_)), "accepted {bad}");
        }
    }

    #[tokio::test]
    async fn test_execute_after_directory_removed() {
        let (_root, sandbox) = sh_sandbox();
        let resp = sandbox.upload(vec![FileUpload::new("a.sh", "echo")]).await.unwrap();
        let ws = sandbox.store().resolve(&resp.agent_id).await.unwrap();
        std::fs::remove_dir_all(ws.dir()).unwrap();

        let result = sandbox.execute(&resp.agent_id, "a.sh").await.unwrap();
        assert!(result.report().is_none());
        let result = sandbox.run_tests(&resp.agent_id).await.unwrap();
        assert!(matches!(result, TestResponse::NotFound(ref body) if body.error == "Test directory not found"));
    }

    #[tokio::test]
    async fn test_run_tests_targets_workspace_directory() {
        let (_root, sandbox) = sh_sandbox();
        let resp = sandbox
            .upload(vec![FileUpload::new("test_one.sh", "true"), FileUpload::new("test_two.sh", "true")])
            .await
            .unwrap();

        let result = sandbox.run_tests(&resp.agent_id).await.unwrap();
        let report = result.report().unwrap();
        assert_eq!(report.status, TestStatus::Passed);
        assert!(report.stdout.contains("test_one.sh"));
        assert!(report.stdout.contains("test_two.sh"));
    }

    #[tokio::test]
    async fn test_run_tests_unknown_agent() {
        let (_root, sandbox) = sh_sandbox();
        assert!(matches!(
            sandbox.run_tests("agent_gone").await,
            Err(SandboxError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_hard_error() {
        let (_root, sandbox) = sandbox_with(
            CommandSpec::new("no-such-interpreter-xyz", &[]),
            CommandSpec::new("no-such-runner-xyz", &[]),
        );
        let resp = sandbox.upload(vec![FileUpload::new("a.py", "print(1)")]).await.unwrap();

        assert!(matches!(
            sandbox.execute(&resp.agent_id, "a.py").await,
            Err(SandboxError::Spawn { .. })
        ));
        assert!(matches!(
            sandbox.run_tests(&resp.agent_id).await,
            Err(SandboxError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_two_uploads_are_isolated() {
        let (_root, sandbox) = sh_sandbox();
        let a = sandbox.upload(vec![FileUpload::new("same.sh", "echo same")]).await.unwrap();
        let b = sandbox.upload(vec![FileUpload::new("same.sh", "echo same")]).await.unwrap();

        assert_ne!(a.agent_id, b.agent_id);
        assert_ne!(a.info[0].location, b.info[0].location);

        sandbox.release(&a.agent_id).await.unwrap();
        assert!(sandbox.execute(&b.agent_id, "same.sh").await.unwrap().report().is_some());
        assert!(matches!(
            sandbox.execute(&a.agent_id, "same.sh").await,
            Err(SandboxError::UnknownAgent(_))
        ));
    }
}
