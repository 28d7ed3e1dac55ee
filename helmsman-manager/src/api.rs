use crate::business::BusinessManager;
use crate::metrics::MetricsCache;
use crate::store::Store;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use helmsman_core::types::{
    new_node_id, BusinessSpec, BusinessTemplate, ComponentTemplate, RegisterRequest,
    ReportRequest, Stamped,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared state behind every control-plane handler.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub cache: Arc<MetricsCache>,
    pub business: Arc<BusinessManager>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// Control-plane router. Every response is the `{status, ...}` JSON
/// envelope on a 200, so clients always get a parseable body.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        // Node registration and telemetry
        .route("/api/register", post(register_node))
        .route("/api/heartbeat/{node_id}", post(heartbeat))
        .route("/api/report", post(report))
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/{node_id}", get(get_node))
        .route("/api/nodes/{node_id}/resources/{resource_type}", get(get_node_resources))
        // Business lifecycle
        .route("/api/businesses", get(list_businesses).post(deploy_business))
        .route("/api/businesses/template/{template_id}", post(deploy_business_from_template))
        .route("/api/businesses/{business_id}", get(get_business).delete(delete_business))
        .route("/api/businesses/{business_id}/stop", post(stop_business))
        .route("/api/businesses/{business_id}/restart", post(restart_business))
        .route(
            "/api/businesses/{business_id}/components/{component_id}/deploy",
            post(deploy_component),
        )
        .route(
            "/api/businesses/{business_id}/components/{component_id}/stop",
            post(stop_component),
        )
        .route(
            "/api/businesses/{business_id}/components/{component_id}/metrics",
            get(component_metrics),
        )
        // Template catalog
        .route(
            "/api/templates/components",
            get(list_component_templates).post(create_component_template),
        )
        .route(
            "/api/templates/components/{template_id}",
            get(get_component_template)
                .put(update_component_template)
                .delete(delete_component_template),
        )
        .route(
            "/api/templates/businesses",
            get(list_business_templates).post(create_business_template),
        )
        .route(
            "/api/templates/businesses/{template_id}",
            get(get_business_template)
                .put(update_business_template)
                .delete(delete_business_template),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_body(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({"status": "error", "message": message.to_string()}))
}

// ---- nodes ----

/// Registration / descriptor refresh. Assigns an id when the agent does
/// not present one, and returns the components currently placed on the
/// node so a restarted agent can recover.
async fn register_node(
    State(state): State<ApiState>,
    Json(request): Json<RegisterRequest>,
) -> Json<Value> {
    // A presented id is honored only when the manager knows it; absent or
    // unknown ids get a fresh assignment.
    let node_id = match request.node_id.clone().filter(|id| !id.is_empty()) {
        Some(presented) => match state.store.get_node(&presented).await {
            Ok(Some(_)) => presented,
            Ok(None) => new_node_id(),
            Err(e) => return error_body(e),
        },
        None => new_node_id(),
    };

    if let Err(e) = state.store.upsert_node(&node_id, &request).await {
        return error_body(e);
    }

    let components = match state.store.components_for_node(&node_id).await {
        Ok(components) => components,
        Err(e) => return error_body(e),
    };

    info!("Registered node {} ({})", node_id, request.hostname);
    Json(json!({
        "status": "success",
        "node_id": node_id,
        "components": components,
    }))
}

async fn heartbeat(State(state): State<ApiState>, Path(node_id): Path<String>) -> Json<Value> {
    match state.store.touch_node(&node_id).await {
        Ok(true) => Json(json!({"status": "success", "message": "Heartbeat updated"})),
        Ok(false) => error_body("Node not found"),
        Err(e) => error_body(e),
    }
}

/// Telemetry ingest: refresh liveness, overwrite the latest-sample cache,
/// and fold component statuses into the store. Unknown component ids are
/// dropped — the agent may be reporting stale state.
async fn report(State(state): State<ApiState>, Json(request): Json<ReportRequest>) -> Json<Value> {
    if request.node_id.is_empty() {
        return error_body("Missing node_id");
    }
    if let Err(e) = state.store.touch_node(&request.node_id).await {
        return error_body(e);
    }

    if let Some(cpu) = request.resource.cpu {
        state
            .cache
            .put_cpu(&request.node_id, Stamped { timestamp: request.timestamp, data: cpu })
            .await;
    }
    if let Some(memory) = request.resource.memory {
        state
            .cache
            .put_memory(&request.node_id, Stamped { timestamp: request.timestamp, data: memory })
            .await;
    }

    for component in &request.components {
        let known = match state.store.component_exists(&component.component_id).await {
            Ok(known) => known,
            Err(e) => return error_body(e),
        };
        if !known {
            debug!("Dropping status for unknown component {}", component.component_id);
            continue;
        }

        if let Err(e) = state
            .store
            .update_component_runtime(
                &component.component_id,
                component.kind,
                component.status,
                component.container_id.as_deref(),
                component.process_id.as_deref(),
            )
            .await
        {
            warn!("Failed to update component {}: {}", component.component_id, e);
            continue;
        }

        if let Some(usage) = &component.resource_usage {
            if let Err(e) = state
                .store
                .append_component_metric(&component.component_id, request.timestamp, usage)
                .await
            {
                warn!("Failed to record metrics for {}: {}", component.component_id, e);
            }
        }
    }

    Json(json!({"status": "success", "message": "Report saved"}))
}

async fn list_nodes(State(state): State<ApiState>) -> Json<Value> {
    match state.store.list_nodes().await {
        Ok(nodes) => Json(json!({"status": "success", "nodes": nodes})),
        Err(e) => error_body(e),
    }
}

/// Node detail plus the freshest cpu/memory samples from the cache.
async fn get_node(State(state): State<ApiState>, Path(node_id): Path<String>) -> Json<Value> {
    let node = match state.store.get_node(&node_id).await {
        Ok(Some(node)) => node,
        Ok(None) => return error_body("Node not found"),
        Err(e) => return error_body(e),
    };

    let mut body = match serde_json::to_value(&node) {
        Ok(Value::Object(map)) => map,
        _ => return error_body("Node serialization failed"),
    };
    if let Some(cpu) = state.cache.latest_cpu(&node_id).await {
        body.insert("latest_cpu".to_string(), json!(cpu));
    }
    if let Some(memory) = state.cache.latest_memory(&node_id).await {
        body.insert("latest_memory".to_string(), json!(memory));
    }

    Json(json!({"status": "success", "node": body}))
}

/// Latest sample for one kind, as an array of zero or one entries.
async fn get_node_resources(
    State(state): State<ApiState>,
    Path((node_id, resource_type)): Path<(String, String)>,
) -> Json<Value> {
    match resource_type.as_str() {
        "cpu" => {
            let metrics: Vec<_> = state.cache.latest_cpu(&node_id).await.into_iter().collect();
            Json(json!({"status": "success", "metrics": metrics}))
        }
        "memory" => {
            let metrics: Vec<_> = state.cache.latest_memory(&node_id).await.into_iter().collect();
            Json(json!({"status": "success", "metrics": metrics}))
        }
        _ => error_body("Invalid resource type"),
    }
}

// ---- businesses ----

async fn deploy_business(
    State(state): State<ApiState>,
    Json(spec): Json<BusinessSpec>,
) -> Json<Value> {
    match state.business.deploy_business(spec).await {
        Ok(report) if report.all_succeeded() => Json(json!({
            "status": "success",
            "message": "Business deployed successfully",
            "business_id": report.business_id,
        })),
        Ok(report) => Json(json!({
            "status": "error",
            "message": "One or more components failed to deploy",
            "business_id": report.business_id,
            "failed_components": report.failed_components,
        })),
        Err(e) => error_body(e),
    }
}

async fn deploy_business_from_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
) -> Json<Value> {
    match state.business.deploy_business_by_template(&template_id).await {
        Ok(report) if report.all_succeeded() => Json(json!({
            "status": "success",
            "message": "Business deployed successfully",
            "business_id": report.business_id,
        })),
        Ok(report) => Json(json!({
            "status": "error",
            "message": "One or more components failed to deploy",
            "business_id": report.business_id,
            "failed_components": report.failed_components,
        })),
        Err(e) => error_body(e),
    }
}

async fn list_businesses(State(state): State<ApiState>) -> Json<Value> {
    match state.store.list_businesses().await {
        Ok(businesses) => Json(json!({"status": "success", "businesses": businesses})),
        Err(e) => error_body(e),
    }
}

async fn get_business(
    State(state): State<ApiState>,
    Path(business_id): Path<String>,
) -> Json<Value> {
    let business = match state.store.get_business(&business_id).await {
        Ok(Some(business)) => business,
        Ok(None) => return error_body("Business not found"),
        Err(e) => return error_body(e),
    };
    let components = match state.store.components_for_business(&business_id).await {
        Ok(components) => components,
        Err(e) => return error_body(e),
    };

    let mut body = match serde_json::to_value(&business) {
        Ok(Value::Object(map)) => map,
        _ => return error_body("Business serialization failed"),
    };
    body.insert("components".to_string(), json!(components));

    Json(json!({"status": "success", "business": body}))
}

async fn stop_business(
    State(state): State<ApiState>,
    Path(business_id): Path<String>,
) -> Json<Value> {
    match state.business.stop_business(&business_id).await {
        Ok(()) => Json(json!({"status": "success", "message": "Business stopped successfully"})),
        Err(e) => error_body(e),
    }
}

async fn restart_business(
    State(state): State<ApiState>,
    Path(business_id): Path<String>,
) -> Json<Value> {
    match state.business.restart_business(&business_id).await {
        Ok(report) if report.all_succeeded() => {
            Json(json!({"status": "success", "message": "Business restarted"}))
        }
        Ok(report) => Json(json!({
            "status": "error",
            "message": "One or more components failed to restart",
            "failed_components": report.failed_components,
        })),
        Err(e) => error_body(e),
    }
}

async fn delete_business(
    State(state): State<ApiState>,
    Path(business_id): Path<String>,
) -> Json<Value> {
    match state.business.delete_business(&business_id).await {
        Ok(()) => Json(json!({
            "status": "success",
            "message": "Business deleted successfully",
            "business_id": business_id,
        })),
        Err(e) => error_body(e),
    }
}

async fn deploy_component(
    State(state): State<ApiState>,
    Path((business_id, component_id)): Path<(String, String)>,
) -> Json<Value> {
    match state.business.deploy_component(&business_id, &component_id).await {
        Ok(()) => Json(json!({"status": "success", "message": "Component deployed successfully"})),
        Err(e) => error_body(e),
    }
}

async fn stop_component(
    State(state): State<ApiState>,
    Path((business_id, component_id)): Path<(String, String)>,
) -> Json<Value> {
    match state.business.stop_component(&business_id, &component_id).await {
        Ok(()) => Json(json!({"status": "success", "message": "Component stopped successfully"})),
        Err(e) => error_body(e),
    }
}

/// Durable per-component usage history, newest first.
async fn component_metrics(
    State(state): State<ApiState>,
    Path((business_id, component_id)): Path<(String, String)>,
    Query(query): Query<LimitQuery>,
) -> Json<Value> {
    let component = match state.store.get_component(&component_id).await {
        Ok(Some(component)) => component,
        Ok(None) => return error_body("Component not found"),
        Err(e) => return error_body(e),
    };
    if component.business_id != business_id {
        return error_body("Component does not belong to this business");
    }

    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    match state.store.recent_component_metrics(&component_id, limit).await {
        Ok(metrics) => Json(json!({"status": "success", "metrics": metrics})),
        Err(e) => error_body(e),
    }
}

// ---- component templates ----

async fn create_component_template(
    State(state): State<ApiState>,
    Json(template): Json<ComponentTemplate>,
) -> Json<Value> {
    match state.store.save_component_template(&template).await {
        Ok(template_id) => Json(json!({
            "status": "success",
            "component_template_id": template_id,
            "message": "Component template saved successfully",
        })),
        Err(e) => error_body(e),
    }
}

async fn list_component_templates(State(state): State<ApiState>) -> Json<Value> {
    match state.store.list_component_templates().await {
        Ok(templates) => Json(json!({"status": "success", "templates": templates})),
        Err(e) => error_body(e),
    }
}

async fn get_component_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
) -> Json<Value> {
    match state.store.get_component_template(&template_id).await {
        Ok(Some(template)) => Json(json!({"status": "success", "template": template})),
        Ok(None) => error_body("Component template not found"),
        Err(e) => error_body(e),
    }
}

async fn update_component_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
    Json(mut template): Json<ComponentTemplate>,
) -> Json<Value> {
    template.component_template_id = Some(template_id);
    create_component_template(State(state), Json(template)).await
}

async fn delete_component_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
) -> Json<Value> {
    match state.store.delete_component_template(&template_id).await {
        Ok(()) => Json(json!({
            "status": "success",
            "message": "Component template deleted successfully",
        })),
        Err(e) => error_body(e),
    }
}

// ---- business templates ----

async fn create_business_template(
    State(state): State<ApiState>,
    Json(template): Json<BusinessTemplate>,
) -> Json<Value> {
    match state.store.save_business_template(&template).await {
        Ok(template_id) => Json(json!({
            "status": "success",
            "business_template_id": template_id,
            "message": "Business template saved successfully",
        })),
        Err(e) => error_body(e),
    }
}

async fn list_business_templates(State(state): State<ApiState>) -> Json<Value> {
    match state.store.list_business_templates().await {
        Ok(templates) => Json(json!({"status": "success", "templates": templates})),
        Err(e) => error_body(e),
    }
}

async fn get_business_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
) -> Json<Value> {
    match state.store.get_business_template(&template_id).await {
        Ok(Some(template)) => Json(json!({"status": "success", "template": template})),
        Ok(None) => error_body("Business template not found"),
        Err(e) => error_body(e),
    }
}

async fn update_business_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
    Json(mut template): Json<BusinessTemplate>,
) -> Json<Value> {
    template.business_template_id = Some(template_id);
    create_business_template(State(state), Json(template)).await
}

async fn delete_business_template(
    State(state): State<ApiState>,
    Path(template_id): Path<String>,
) -> Json<Value> {
    match state.store.delete_business_template(&template_id).await {
        Ok(()) => Json(json!({
            "status": "success",
            "message": "Business template deleted successfully",
        })),
        Err(e) => error_body(e),
    }
}
