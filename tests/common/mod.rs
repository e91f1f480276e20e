//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use agentbox::config::CommandSpec;
use agentbox::server::{build_state, create_router, AppState};
use agentbox::SandboxConfig;
use axum::Router;

pub const BOUNDARY: &str = "agentbox-test-boundary";

/// Config rooted in `root` that runs files with `sh` and "tests" with `ls`
pub fn shell_config(root: &Path) -> SandboxConfig {
    SandboxConfig {
        workspace_root: root.to_path_buf(),
        interpreter: CommandSpec::new("sh", &[]),
        test_runner: CommandSpec::new("ls", &[]),
        execution_timeout: Duration::from_secs(5),
        test_timeout: Duration::from_secs(5),
        ..SandboxConfig::default()
    }
}

pub fn router(config: &SandboxConfig) -> (Router, AppState) {
    let state = build_state(config).expect("state");
    (create_router(state.clone(), config.max_upload_bytes), state)
}

/// Hand-built multipart body with one `files` part per entry
pub fn multipart_body(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, content) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// True when `python3 -m pytest` is usable on this host
pub fn pytest_available() -> bool {
    std::process::Command::new("python3")
        .args(["-m", "pytest", "--version"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
