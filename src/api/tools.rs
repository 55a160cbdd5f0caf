/// Tool integration endpoints
///
/// Thin pass-throughs to the tool provider for the editor's tool picker and
/// for trying a tool outside a workflow. Calls run as the authenticated user.

use crate::{
    api::{api_error, auth::Authenticated, ApiError, AppState},
    providers::ToolFilter,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct ToolsQuery {
    /// Comma-separated app names
    pub apps: Option<String>,
    /// Comma-separated tool names
    pub tools: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Create tool routes
pub fn create_tool_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tools", get(list_tools))
        .route("/api/tools/execute", post(execute_tool))
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// List tools available to the caller
///
/// GET /api/tools?apps=github,slack
async fn list_tools(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    Query(query): Query<ToolsQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = ToolFilter {
        apps: split_list(query.apps.as_deref()),
        tools: split_list(query.tools.as_deref()),
    };

    let tools = state.tools.list_tools(&user.user_id, &filter).await.map_err(|e| {
        tracing::error!("Failed to list tools for {}: {}", user.user_id, e);
        api_error(StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    Ok(Json(json!({ "tools": tools })))
}

/// Execute one tool directly
///
/// POST /api/tools/execute
/// Body: { "tool": "GITHUB_GET_REPO", "arguments": {...} }
async fn execute_tool(
    State(state): State<AppState>,
    Authenticated(user): Authenticated,
    Json(request): Json<ExecuteToolRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.tool.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "tool is required"));
    }

    let arguments = match request.arguments {
        Value::Null => json!({}),
        other => other,
    };

    let result = state
        .tools
        .execute(&user.user_id, &request.tool, arguments)
        .await
        .map_err(|e| {
            tracing::error!("Tool '{}' failed for {}: {}", request.tool, user.user_id, e);
            api_error(StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    Ok(Json(json!({ "tool": request.tool, "result": result })))
}
