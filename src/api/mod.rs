/// HTTP API Layer
///
/// This module provides the REST API endpoints for the workflow builder. It handles:
/// - Workflow CRUD operations with hot-reload
/// - Execution of saved and unsaved workflows, and run history
/// - Pass-through access to the tool integration provider
/// - Bearer-token authentication

use crate::{
    config::Config,
    providers::ToolProvider,
    runtime::engine::ExecutionEngine,
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

// Bearer-token authentication extractor
pub mod auth;

// Workflow management endpoints (POST/GET/PUT/DELETE)
pub mod workflows;

// Workflow execution and run history endpoints
pub mod executions;

// Tool listing and direct execution endpoints
pub mod tools;

// Re-export router builders
pub use executions::create_execution_routes;
pub use tools::create_tool_routes;
pub use workflows::create_workflow_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow storage for persistence
    pub storage: WorkflowStorage,
    /// Hot-reload registry for in-memory workflows
    pub registry: Arc<WorkflowRegistry>,
    /// Execution engine for running workflows
    pub engine: Arc<ExecutionEngine>,
    /// Tool integration provider
    pub tools: Arc<dyn ToolProvider>,
    /// Service configuration
    pub config: Arc<Config>,
}

/// Error response: status plus `{ "error": message }`
pub type ApiError = (StatusCode, Json<Value>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Log a storage/registry failure and hide it behind a 500
pub(crate) fn internal_error(context: &str, error: anyhow::Error) -> ApiError {
    tracing::error!("{}: {}", context, error);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, context)
}
