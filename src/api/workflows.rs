/// Workflow management REST API endpoints
///
/// Provides CRUD operations for workflow definitions with hot-reload support.
/// Definitions are loaded through the graph loader before they are saved, so a
/// broken canvas is rejected with 400 instead of being persisted.

use crate::{
    api::{api_error, auth::Authenticated, internal_error, ApiError, AppState},
    workflow::{registry::CompiledWorkflow, types::Workflow},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

/// Request body for workflow creation and update
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: Workflow,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
}

/// Load the definition, mapping configuration errors to 400
fn compile(workflow: Workflow) -> Result<CompiledWorkflow, ApiError> {
    CompiledWorkflow::compile(workflow).map_err(|e| {
        tracing::warn!("❌ Rejected workflow definition: {}", e);
        api_error(StatusCode::BAD_REQUEST, e.to_string())
    })
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn create_workflow(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow = payload.workflow;

    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "workflow id and name are required"));
    }

    let compiled = compile(workflow)?;

    let inserted = state
        .storage
        .insert_workflow(&compiled.workflow)
        .await
        .map_err(|e| internal_error("Failed to save workflow", e))?;
    if !inserted {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("workflow '{}' already exists", compiled.workflow.id),
        ));
    }

    let response = WorkflowResponse {
        id: compiled.workflow.id.clone(),
        message: format!("Workflow '{}' created successfully", compiled.workflow.name),
    };
    tracing::info!("🔥 Created workflow: {} ({})", compiled.workflow.id, compiled.workflow.name);
    state.registry.insert(compiled);

    Ok(Json(response))
}

/// List all workflows
///
/// GET /api/workflows
/// Returns: { "workflows": [{ "id": "...", "name": "...", "created_at": "...", "updated_at": "..." }] }
async fn list_workflows(
    State(state): State<AppState>,
    _auth: Authenticated,
) -> Result<Json<Value>, ApiError> {
    let workflows = state
        .storage
        .list_workflows()
        .await
        .map_err(|e| internal_error("Failed to list workflows", e))?;

    Ok(Json(json!({ "workflows": workflows })))
}

/// Get a specific workflow by ID
///
/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{id}' not found"))),
        Err(e) => Err(internal_error("Failed to get workflow", e)),
    }
}

/// Update an existing workflow
///
/// PUT /api/workflows/{id}
/// Body: { "workflow": { "name": "...", "nodes": [...], "edges": [...] } }
async fn update_workflow(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let mut workflow = payload.workflow;

    // The URL is authoritative for the id
    workflow.id = id.clone();

    if workflow.name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "workflow name is required"));
    }

    match state.storage.get_workflow(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{id}' not found"))),
        Err(e) => return Err(internal_error("Failed to look up workflow", e)),
    }

    let compiled = compile(workflow)?;

    state
        .storage
        .save_workflow(&compiled.workflow)
        .await
        .map_err(|e| internal_error("Failed to update workflow", e))?;

    let response = WorkflowResponse {
        id: id.clone(),
        message: format!("Workflow '{}' updated successfully", compiled.workflow.name),
    };
    tracing::info!("🔥 Hot-reloaded workflow: {} ({})", id, compiled.workflow.name);
    state.registry.insert(compiled);

    Ok(Json(response))
}

/// Delete a workflow
///
/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.storage.delete_workflow(&id).await {
        Ok(true) => {
            state.registry.remove_workflow(&id);
            tracing::info!("Deleted workflow: {}", id);
            Ok(Json(json!({ "message": "Workflow deleted successfully" })))
        }
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{id}' not found"))),
        Err(e) => Err(internal_error("Failed to delete workflow", e)),
    }
}
