//! Client for the sandbox HTTP API
//!
//! Agent loops use one [`SandboxClient`] per session: `upload` stores the
//! returned agent id, and `execute`/`run_tests` act on that workspace.

use std::time::Instant;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::exec::{ErrorBody, ExecuteResponse, TestResponse, UploadResponse};
use crate::server::middleware::TRACE_ID_HEADER;

/// Errors raised by [`SandboxClient`]
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `execute`/`run_tests`/`release` called before a successful upload
    #[error("Agent ID is not set. Please upload files first.")]
    AgentNotSet,

    /// The server does not know the agent id (expired or released)
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Rate limited by sandbox: {0}")]
    RateLimited(String),

    /// Any other non-success status
    #[error("Sandbox returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Network or decoding failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Stateful client for one agent session
#[derive(Debug, Clone)]
pub struct SandboxClient {
    base_url: String,
    http: reqwest::Client,
    agent_id: Option<String>,
    /// Sent as `x-trace-id` on every call of this session
    trace_id: String,
}

impl SandboxClient {
    /// Create a client for the sandbox at `base_url` (e.g. "http://127.0.0.1:8000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    /// Create a client reusing an existing reqwest client (timeouts, pooling)
    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            agent_id: None,
            trace_id: Uuid::now_v7().to_string(),
        }
    }

    /// Agent id from the last successful upload
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Upload `(filename, content)` pairs into a fresh workspace
    ///
    /// On success the new agent id replaces any previous one.
    pub async fn upload(&mut self, files: Vec<(String, Vec<u8>)>) -> Result<UploadResponse, ClientError> {
        let names: Vec<&str> = files.iter().map(|(name, _)| name.as_str()).collect();
        let span = info_span!("sandbox_tool_call", tool = "upload", trace_id = %self.trace_id);
        info!(parent: &span, files = ?names, "Calling sandbox tool");

        let mut form = Form::new();
        for (name, content) in files {
            form = form.part("files", Part::bytes(content).file_name(name));
        }

        let request = self
            .http
            .post(self.url("/upload/"))
            .header(TRACE_ID_HEADER, &self.trace_id)
            .multipart(form);

        let response: UploadResponse = logged(send(request)).instrument(span).await?;
        self.agent_id = Some(response.agent_id.clone());
        Ok(response)
    }

    /// Execute one uploaded file in the current workspace
    pub async fn execute(&self, filename: &str) -> Result<ExecuteResponse, ClientError> {
        let agent_id = self.require_agent()?;
        let span = info_span!(
            "sandbox_tool_call",
            tool = "execute",
            agent_id = %agent_id,
            trace_id = %self.trace_id
        );
        info!(parent: &span, filename = %filename, "Calling sandbox tool");

        let request = self
            .http
            .post(self.url("/execute/"))
            .header(TRACE_ID_HEADER, &self.trace_id)
            .query(&[("agent_id", agent_id), ("filename", filename)]);

        logged(send(request)).instrument(span).await
    }

    /// Run the test suite of the current workspace
    pub async fn run_tests(&self) -> Result<TestResponse, ClientError> {
        let agent_id = self.require_agent()?;
        let span = info_span!(
            "sandbox_tool_call",
            tool = "run_tests",
            agent_id = %agent_id,
            trace_id = %self.trace_id
        );
        info!(parent: &span, "Calling sandbox tool");

        let request = self
            .http
            .post(self.url("/test/"))
            .header(TRACE_ID_HEADER, &self.trace_id)
            .query(&[("agent_id", agent_id)]);

        logged(send(request)).instrument(span).await
    }

    /// Delete the current workspace on the server and forget its id
    pub async fn release(&mut self) -> Result<(), ClientError> {
        let agent_id = self.require_agent()?.to_string();
        let span = info_span!(
            "sandbox_tool_call",
            tool = "release",
            agent_id = %agent_id,
            trace_id = %self.trace_id
        );

        let request = self
            .http
            .delete(self.url("/workspace/"))
            .header(TRACE_ID_HEADER, &self.trace_id)
            .query(&[("agent_id", agent_id.as_str())]);

        let _: serde_json::Value = logged(send(request)).instrument(span).await?;
        self.agent_id = None;
        Ok(())
    }

    fn require_agent(&self) -> Result<&str, ClientError> {
        self.agent_id.as_deref().ok_or(ClientError::AgentNotSet)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Send a request and decode a success body, mapping error statuses
async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await?;
    let status = response.status();

    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::UnknownAgent(message),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited(message),
        other => ClientError::Status {
            status: other.as_u16(),
            message,
        },
    })
}

/// Log the outcome and latency of a tool call inside its span
async fn logged<T, F>(call: F) -> Result<T, ClientError>
where
    F: std::future::Future<Output = Result<T, ClientError>>,
{
    let start = Instant::now();
    let result = call.await;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    match &result {
        Ok(_) => info!(latency_ms, "Sandbox tool call succeeded"),
        Err(e) => warn!(latency_ms, error = %e, "Sandbox tool call failed"),
    }
    result
}
