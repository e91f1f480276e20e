use agentbox::config::SandboxConfig;
use agentbox::server;
use agentbox::tracing::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = SandboxConfig::from_env()?;
    init_tracing("agentbox", config.otlp_endpoint.as_deref())?;

    tracing::info!(
        listen = %config.listen_addr,
        workspace_root = %config.workspace_root.display(),
        exec_timeout_secs = config.execution_timeout.as_secs(),
        test_timeout_secs = config.test_timeout.as_secs(),
        ttl_secs = config.workspace_ttl.as_secs(),
        "Starting agentbox"
    );

    let result = server::serve(config).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Server exited with error");
    }

    shutdown_tracing();
    result
}
