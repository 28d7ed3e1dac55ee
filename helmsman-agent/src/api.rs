use crate::components::ComponentSupervisor;
use axum::{extract::State, response::Json, routing::post, Router};
use helmsman_core::types::{DeployCommand, StopCommand};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// State behind the agent's inbound command surface.
#[derive(Clone)]
pub struct AgentApiState {
    pub supervisor: Arc<ComponentSupervisor>,
}

/// Command listener: both routes validate, acknowledge immediately, and
/// hand the actual work to a detached worker. Results travel back to the
/// manager with the next telemetry push.
pub fn create_router(state: AgentApiState) -> Router {
    Router::new()
        .route("/api/deploy", post(deploy))
        .route("/api/stop", post(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_body(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({"status": "error", "message": message.to_string()}))
}

async fn deploy(State(state): State<AgentApiState>, Json(body): Json<Value>) -> Json<Value> {
    for field in ["component_id", "business_id", "component_name", "type"] {
        if body.get(field).and_then(|v| v.as_str()).unwrap_or("").is_empty() {
            return error_body("Missing required fields");
        }
    }

    let command: DeployCommand = match serde_json::from_value(body) {
        Ok(command) => command,
        Err(e) => return error_body(format!("Invalid request: {}", e)),
    };

    debug!("Accepted deploy for component {}", command.spec.component_id);
    let supervisor = Arc::clone(&state.supervisor);
    tokio::spawn(async move {
        supervisor.deploy(command).await;
    });

    Json(json!({
        "status": "success",
        "message": "Deploy request is being processed asynchronously",
    }))
}

async fn stop(State(state): State<AgentApiState>, Json(body): Json<Value>) -> Json<Value> {
    for field in ["component_id", "business_id"] {
        if body.get(field).and_then(|v| v.as_str()).unwrap_or("").is_empty() {
            return error_body("Missing required fields");
        }
    }

    let command: StopCommand = match serde_json::from_value(body) {
        Ok(command) => command,
        Err(e) => return error_body(format!("Invalid request: {}", e)),
    };

    debug!("Accepted stop for component {}", command.component_id);
    let supervisor = Arc::clone(&state.supervisor);
    tokio::spawn(async move {
        supervisor.stop(command).await;
    });

    Json(json!({
        "status": "success",
        "message": "Stop request is being processed asynchronously",
    }))
}
