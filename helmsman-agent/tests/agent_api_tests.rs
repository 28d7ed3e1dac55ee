//! Agent command-surface tests: the router is driven directly, deploys
//! run against the real process executor with throwaway shell workloads.

use axum::body::Body;
use axum::http::Request;
use helmsman_agent::api::{create_router, AgentApiState};
use helmsman_agent::components::ComponentSupervisor;
use helmsman_agent::process::ProcessExecutor;
use helmsman_core::types::ComponentStatus;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn test_state(dir: &tempfile::TempDir) -> (axum::Router, Arc<ComponentSupervisor>) {
    // The process executor stands in for both component types so the
    // tests need no container runtime.
    let executor = Arc::new(ProcessExecutor::new().unwrap());
    let supervisor = Arc::new(ComponentSupervisor::new(
        executor.clone(),
        executor,
        dir.path().to_path_buf(),
    ));
    let router = create_router(AgentApiState {
        supervisor: Arc::clone(&supervisor),
    });
    (router, supervisor)
}

async fn post_json(router: &axum::Router, uri: &str, body: Value) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn write_script(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    tokio::fs::write(&path, content).await.unwrap();
    let mut permissions = tokio::fs::metadata(&path).await.unwrap().permissions();
    permissions.set_mode(0o755);
    tokio::fs::set_permissions(&path, permissions).await.unwrap();
    path.to_str().unwrap().to_string()
}

async fn wait_for_status(
    supervisor: &ComponentSupervisor,
    component_id: &str,
    wanted: ComponentStatus,
) -> bool {
    for _ in 0..100 {
        let reports = supervisor.snapshot().await;
        if reports
            .iter()
            .any(|r| r.component_id == component_id && r.status == wanted)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn deploy_rejects_incomplete_requests() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _supervisor) = test_state(&dir).await;

    let response = post_json(
        &router,
        "/api/deploy",
        json!({"component_id": "c1", "business_id": "b1"}),
    )
    .await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "Missing required fields");
}

#[tokio::test]
async fn stop_rejects_incomplete_requests() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _supervisor) = test_state(&dir).await;

    let response = post_json(&router, "/api/stop", json!({"component_id": "c1"})).await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "Missing required fields");
}

#[tokio::test]
async fn deploy_acknowledges_then_runs_asynchronously() {
    let dir = tempfile::tempdir().unwrap();
    let (router, supervisor) = test_state(&dir).await;
    let script = write_script(&dir, "workload.sh", "#!/bin/sh\nexec sleep 30\n").await;

    let response = post_json(
        &router,
        "/api/deploy",
        json!({
            "component_id": "c1",
            "business_id": "b1",
            "component_name": "worker",
            "type": "binary",
            "binary_path": script,
        }),
    )
    .await;
    assert_eq!(response["status"], "success");
    assert_eq!(
        response["message"],
        "Deploy request is being processed asynchronously"
    );

    assert!(wait_for_status(&supervisor, "c1", ComponentStatus::Running).await);
    let reports = supervisor.snapshot().await;
    let report = reports.iter().find(|r| r.component_id == "c1").unwrap();
    assert!(report.process_id.is_some(), "running implies a process handle");

    // Stop permanently removes the component from local state.
    let response = post_json(
        &router,
        "/api/stop",
        json!({
            "component_id": "c1",
            "business_id": "b1",
            "component_type": "binary",
            "permanently": true,
        }),
    )
    .await;
    assert_eq!(response["status"], "success");

    for _ in 0..50 {
        if supervisor.component_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("component was not removed after permanent stop");
}

#[tokio::test]
async fn failed_setup_surfaces_as_error_status() {
    let dir = tempfile::tempdir().unwrap();
    let (router, supervisor) = test_state(&dir).await;

    let response = post_json(
        &router,
        "/api/deploy",
        json!({
            "component_id": "c1",
            "business_id": "b1",
            "component_name": "worker",
            "type": "binary",
            "binary_path": "/nonexistent/worker",
        }),
    )
    .await;
    // Accepted: failures surface via status, not via the ack.
    assert_eq!(response["status"], "success");

    assert!(wait_for_status(&supervisor, "c1", ComponentStatus::Error).await);
}

#[tokio::test]
async fn term_resistant_workload_is_killed_within_grace() {
    let dir = tempfile::tempdir().unwrap();
    let (router, supervisor) = test_state(&dir).await;
    let script = write_script(
        &dir,
        "stubborn.sh",
        "#!/bin/sh\ntrap '' TERM\nwhile true; do sleep 1; done\n",
    )
    .await;

    let response = post_json(
        &router,
        "/api/deploy",
        json!({
            "component_id": "c1",
            "business_id": "b1",
            "component_name": "stubborn",
            "type": "binary",
            "binary_path": script,
        }),
    )
    .await;
    assert_eq!(response["status"], "success");
    assert!(wait_for_status(&supervisor, "c1", ComponentStatus::Running).await);

    let response = post_json(
        &router,
        "/api/stop",
        json!({
            "component_id": "c1",
            "business_id": "b1",
            "component_type": "binary",
        }),
    )
    .await;
    assert_eq!(response["status"], "success");

    // TERM is ignored; the KILL path still lands within the grace window.
    assert!(wait_for_status(&supervisor, "c1", ComponentStatus::Stopped).await);
}
