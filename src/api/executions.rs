/// Workflow execution endpoints
///
/// Runs saved workflows (recording every run) and unsaved canvases straight
/// from the editor. A run whose state carries an error answers 422 with the
/// full state so the editor can show which node failed.

use crate::{
    api::{api_error, auth::Authenticated, internal_error, ApiError, AppState},
    config::Config,
    runtime::graph::WorkflowGraph,
    workflow::{
        node_config::EngineConfig,
        storage::RunRecord,
        types::{Edge, ExecutionState, Node},
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_RUN_LIMIT: i64 = 20;
const MAX_RUN_LIMIT: i64 = 200;

/// Request body for executing a saved workflow
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input: String,
}

/// Request body for executing an unsaved canvas
#[derive(Debug, Deserialize)]
pub struct AdHocExecuteRequest {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

/// Create execution routes
pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/workflows/{id}/runs", get(list_runs))
        .route("/api/runs/{run_id}", get(get_run))
        .route("/api/execute", post(execute_canvas))
}

/// The caller runs tools as themselves unless the workflow pins a user.
/// The service-wide agent budget applies unless the workflow sets its own.
fn config_for_caller(graph: &WorkflowGraph, raw: &Value, user_id: &str, service: &Config) -> EngineConfig {
    let mut config = graph.config().clone();
    config.user_id.get_or_insert_with(|| user_id.to_string());
    if raw.get("max_agent_iterations").is_none() {
        config.max_agent_iterations = service.engine.max_agent_iterations.max(1);
    }
    config
}

fn status_for(state: &ExecutionState) -> StatusCode {
    if state.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}

/// Execute a saved workflow
///
/// POST /api/workflows/{id}/execute
/// Body: { "input": "..." }
/// Returns the run record; 422 when a node failed
async fn execute_workflow(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    Path(id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<(StatusCode, Json<RunRecord>), ApiError> {
    let compiled = state.registry.get_workflow(&id).ok_or_else(|| {
        tracing::warn!("❌ Execution requested for unknown workflow: {}", id);
        api_error(StatusCode::NOT_FOUND, format!("workflow '{id}' not found"))
    })?;

    tracing::info!("🚀 Starting workflow execution: {} for user {}", id, user.user_id);
    let started_at = chrono::Utc::now();
    let config = config_for_caller(
        &compiled.graph,
        &compiled.workflow.config,
        &user.user_id,
        &state.config,
    );

    let mut run_state = state
        .engine
        .run_with_config(&compiled.graph, &config, &request.input)
        .await;
    run_state.metadata.insert("workflow_id".to_string(), json!(id));

    let run = RunRecord::new(id, user.user_id, request.input, started_at, run_state);
    state
        .storage
        .save_run(&run)
        .await
        .map_err(|e| internal_error("Failed to record run", e))?;

    match &run.state.error {
        None => tracing::info!("🎉 Workflow run {} succeeded", run.id),
        Some(error) => tracing::warn!("❌ Workflow run {} failed: {}", run.id, error),
    }

    Ok((status_for(&run.state), Json(run)))
}

/// Execute an unsaved canvas
///
/// POST /api/execute
/// Body: { "nodes": [...], "edges": [...], "config": {...}, "input": "..." }
/// Returns the final execution state; 400 when the graph does not load
async fn execute_canvas(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    Json(request): Json<AdHocExecuteRequest>,
) -> Result<(StatusCode, Json<ExecutionState>), ApiError> {
    let graph = WorkflowGraph::load(&request.nodes, &request.edges, &request.config).map_err(|e| {
        tracing::warn!("❌ Canvas rejected: {}", e);
        api_error(StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let config = config_for_caller(&graph, &request.config, &user.user_id, &state.config);
    let run_state = state.engine.run_with_config(&graph, &config, &request.input).await;

    Ok((status_for(&run_state), Json(run_state)))
}

/// List recent runs of a workflow
///
/// GET /api/workflows/{id}/runs?limit=20
async fn list_runs(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, MAX_RUN_LIMIT);
    let runs = state
        .storage
        .list_runs(&id, limit)
        .await
        .map_err(|e| internal_error("Failed to list runs", e))?;

    Ok(Json(json!({ "runs": runs })))
}

/// Get a run by ID
///
/// GET /api/runs/{run_id}
async fn get_run(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    match state.storage.get_run(&run_id).await {
        Ok(Some(run)) => Ok(Json(run)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, format!("run '{run_id}' not found"))),
        Err(e) => Err(internal_error("Failed to get run", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeKind;

    fn single_node_graph(raw: &Value) -> WorkflowGraph {
        WorkflowGraph::load(&[Node::new("in", NodeKind::Input)], &[], raw).unwrap()
    }

    #[test]
    fn test_config_for_caller() {
        let mut service = Config::default();
        service.engine.max_agent_iterations = 3;

        let raw = json!({});
        let config = config_for_caller(&single_node_graph(&raw), &raw, "alice", &service);
        assert_eq!(config.user_id.as_deref(), Some("alice"));
        assert_eq!(config.max_agent_iterations, 3);

        let raw = json!({"user_id": "bot", "max_agent_iterations": 5});
        let config = config_for_caller(&single_node_graph(&raw), &raw, "alice", &service);
        assert_eq!(config.user_id.as_deref(), Some("bot"));
        assert_eq!(config.max_agent_iterations, 5);
    }
}
