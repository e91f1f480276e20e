//! End-to-end tests: `SandboxClient` against a server on an ephemeral port

mod common;

use agentbox::exec::{ExecutionStatus, TestStatus};
use agentbox::{ClientError, SandboxClient};
use tokio::net::TcpListener;

use common::{router, shell_config};

/// Serve a fresh router on 127.0.0.1:0 and return its base URL
async fn spawn_server(root: &std::path::Path) -> String {
    let (app, _) = router(&shell_config(root));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Test the full upload → execute → test flow through the client
#[tokio::test]
async fn test_client_upload_execute_and_test() {
    let root = tempfile::tempdir().unwrap();
    let mut client = SandboxClient::new(spawn_server(root.path()).await);

    let uploaded = client
        .upload(vec![
            ("main.sh".to_string(), b"echo Hello World".to_vec()),
            ("test_main.sh".to_string(), b"true".to_vec()),
        ])
        .await
        .unwrap();
    assert_eq!(client.agent_id(), Some(uploaded.agent_id.as_str()));

    let executed = client.execute("main.sh").await.unwrap();
    let report = executed.report().expect("completed report");
    assert_eq!(report.stdout, "Hello World\n");
    assert_eq!(report.status, ExecutionStatus::Success);

    let tested = client.run_tests().await.unwrap();
    let report = tested.report().expect("completed report");
    assert_eq!(report.status, TestStatus::Passed);
}

/// Test that the client switches to the newest workspace on each upload
#[tokio::test]
async fn test_client_tracks_latest_agent_id() {
    let root = tempfile::tempdir().unwrap();
    let mut client = SandboxClient::new(spawn_server(root.path()).await);

    let first = client
        .upload(vec![("a.sh".to_string(), b"echo first".to_vec())])
        .await
        .unwrap();
    let second = client
        .upload(vec![("b.sh".to_string(), b"echo second".to_vec())])
        .await
        .unwrap();

    assert_ne!(first.agent_id, second.agent_id);
    assert_eq!(client.agent_id(), Some(second.agent_id.as_str()));

    // a.sh lives only in the first workspace
    let response = client.execute("a.sh").await.unwrap();
    assert!(response.report().is_none());
}

/// Test that a missing file comes back as data, not a ClientError
#[tokio::test]
async fn test_client_missing_file_is_not_an_error() {
    let root = tempfile::tempdir().unwrap();
    let mut client = SandboxClient::new(spawn_server(root.path()).await);
    client
        .upload(vec![("a.sh".to_string(), b"true".to_vec())])
        .await
        .unwrap();

    let response = client.execute("missing.sh").await.unwrap();

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value, serde_json::json!({"error": "File not found"}));
}

/// Test that release deletes the workspace and clears the agent id
#[tokio::test]
async fn test_client_release_forgets_agent() {
    let root = tempfile::tempdir().unwrap();
    let mut client = SandboxClient::new(spawn_server(root.path()).await);
    let uploaded = client
        .upload(vec![("a.sh".to_string(), b"true".to_vec())])
        .await
        .unwrap();

    client.release().await.unwrap();
    assert!(client.agent_id().is_none());
    assert!(matches!(client.execute("a.sh").await, Err(ClientError::AgentNotSet)));

    assert!(!uploaded.info[0].location.exists());
}

/// Test that calls before any upload fail with AgentNotSet
#[tokio::test]
async fn test_client_requires_upload_first() {
    let client = SandboxClient::new("http://127.0.0.1:9");

    let err = client.execute("main.py").await.unwrap_err();

    assert!(matches!(err, ClientError::AgentNotSet));
}
