//! End-to-end tests for the flowsmith HTTP API.
//!
//! Each test builds a router over an in-memory SQLite database and stub
//! providers, and sends requests with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use flowsmith::api::AppState;
use flowsmith::config::{AuthConfig, Config};
use flowsmith::testing::{ScriptedModel, StaticTools};
use flowsmith::workflow::storage::WorkflowStorage;
use flowsmith::{build_router, build_state};

async fn test_state_with(config: Config, model: ScriptedModel, tools: StaticTools) -> AppState {
    let storage = WorkflowStorage::in_memory().await.expect("in-memory database");
    build_state(config, storage, Arc::new(model), Arc::new(tools))
        .await
        .expect("app state")
}

async fn test_app_with(config: Config, model: ScriptedModel, tools: StaticTools) -> Router {
    build_router(test_state_with(config, model, tools).await)
}

async fn test_state() -> AppState {
    let mut config = Config::default();
    config.auth = AuthConfig::default();
    config.engine.default_user_id = "tester".to_string();
    test_state_with(
        config,
        ScriptedModel::new(["A short summary."]),
        StaticTools::new()
            .with_tool("SLACK_SEND_MESSAGE", Some("slack"), json!({"ts": "123.45"}))
            .with_tool("GITHUB_GET_REPO", Some("github"), json!({"stars": 10})),
    )
    .await
}

async fn test_app() -> Router {
    build_router(test_state().await)
}

async fn request_json(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    request_json(app, Method::POST, path, Some(body), &[]).await
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    request_json(app, Method::GET, path, None, &[]).await
}

fn summarize_workflow(id: &str) -> Value {
    json!({
        "workflow": {
            "id": id,
            "name": "Summarize and post",
            "nodes": [
                {"id": "in", "kind": "input"},
                {"id": "summarize", "kind": "llm", "label": "Summarize",
                 "config": {"prompt": "Summarize: {{input}}"}},
                {"id": "post", "kind": "tool-call",
                 "config": {"tool": "SLACK_SEND_MESSAGE", "input_path": "summarize",
                            "input_key": "text", "arguments": {"channel": "#news"}}},
                {"id": "out", "kind": "output", "config": {"source": "summarize"}}
            ],
            "edges": [
                {"source": "in", "target": "summarize"},
                {"source": "summarize", "target": "post"},
                {"source": "post", "target": "out"}
            ]
        }
    })
}

#[tokio::test]
async fn health_check_responds() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn workflow_crud_roundtrip() {
    let app = test_app().await;

    let (status, body) = post_json(&app, "/api/workflows", summarize_workflow("wf-news")).await;
    assert_eq!(status, StatusCode::OK, "create failed: {body:?}");
    assert_eq!(body["id"], "wf-news");

    let (status, _) = post_json(&app, "/api/workflows", summarize_workflow("wf-news")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = get_json(&app, "/api/workflows/wf-news").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"].as_array().unwrap().len(), 4);
    assert_eq!(body["nodes"][2]["kind"], "tool-call");

    let (status, body) = get_json(&app, "/api/workflows").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflows"].as_array().unwrap().len(), 1);

    let mut update = summarize_workflow("ignored");
    update["workflow"]["name"] = json!("Renamed");
    let (status, body) =
        request_json(&app, Method::PUT, "/api/workflows/wf-news", Some(update), &[]).await;
    assert_eq!(status, StatusCode::OK, "update failed: {body:?}");

    let (_, body) = get_json(&app, "/api/workflows/wf-news").await;
    assert_eq!(body["name"], "Renamed");
    assert_eq!(body["id"], "wf-news");

    let (status, _) = request_json(&app, Method::DELETE, "/api/workflows/wf-news", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(&app, "/api/workflows/wf-news").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_creates_with_same_id_conflict() {
    let app = test_app().await;
    let mut first = summarize_workflow("wf-race");
    first["workflow"]["name"] = json!("First");
    let mut second = summarize_workflow("wf-race");
    second["workflow"]["name"] = json!("Second");

    let ((status_a, _), (status_b, _)) = tokio::join!(
        post_json(&app, "/api/workflows", first),
        post_json(&app, "/api/workflows", second)
    );
    let mut statuses = [status_a, status_b];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    let winner = if status_a == StatusCode::OK { "First" } else { "Second" };
    let (_, body) = get_json(&app, "/api/workflows/wf-race").await;
    assert_eq!(body["name"], winner);
}

#[tokio::test]
async fn failed_delete_keeps_workflow_runnable() {
    let state = test_state().await;
    let app = build_router(state.clone());
    let (status, _) = post_json(&app, "/api/workflows", summarize_workflow("wf-keep")).await;
    assert_eq!(status, StatusCode::OK);

    state.storage.close().await;
    let (status, _) = request_json(&app, Method::DELETE, "/api/workflows/wf-keep", None, &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.registry.get_workflow("wf-keep").is_some());
}

#[tokio::test]
async fn invalid_workflow_is_rejected_before_saving() {
    let app = test_app().await;
    let mut body = summarize_workflow("wf-bad");
    body["workflow"]["edges"]
        .as_array_mut()
        .unwrap()
        .push(json!({"source": "out", "target": "nowhere"}));

    let (status, response) = post_json(&app, "/api/workflows", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("unknown node: nowhere"));

    let (status, _) = get_json(&app, "/api/workflows/wf-bad").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn execute_saved_workflow_records_run() {
    let app = test_app().await;
    let (status, _) = post_json(&app, "/api/workflows", summarize_workflow("wf-run")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, run) = post_json(
        &app,
        "/api/workflows/wf-run/execute",
        json!({"input": "Long article text"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "execute failed: {run:?}");
    assert_eq!(run["status"], "succeeded");
    assert_eq!(run["user_id"], "tester");
    assert_eq!(run["state"]["output"], "A short summary.");
    assert_eq!(run["state"]["node_results"]["post"], json!({"ts": "123.45"}));
    assert_eq!(run["state"]["log"].as_array().unwrap().len(), 4);
    assert_eq!(run["state"]["metadata"]["workflow_id"], "wf-run");

    let run_id = run["id"].as_str().unwrap().to_string();
    let (status, fetched) = get_json(&app, &format!("/api/runs/{run_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["state"]["output"], "A short summary.");

    let (status, runs) = get_json(&app, "/api/workflows/wf-run/runs?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs["runs"].as_array().unwrap().len(), 1);

    let (status, _) = post_json(&app, "/api/workflows/missing/execute", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_run_returns_unprocessable_state() {
    let app = test_app().await;
    let (status, body) = post_json(
        &app,
        "/api/execute",
        json!({
            "nodes": [
                {"id": "in", "kind": "input"},
                {"id": "post", "kind": "tool-call",
                 "config": {"tool": "SLACK_SEND_MESSAGE", "input_path": "in.missing"}},
                {"id": "out", "kind": "output"}
            ],
            "edges": [
                {"source": "in", "target": "post"},
                {"source": "post", "target": "out"}
            ],
            "input": "hello"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().starts_with("data error"));
    assert_eq!(body["output"], Value::Null);
    assert_eq!(body["log"][0], "node in (input) completed");
}

#[tokio::test]
async fn ad_hoc_canvas_passthrough() {
    let app = test_app().await;
    let (status, body) = post_json(
        &app,
        "/api/execute",
        json!({
            "nodes": [{"id": "in", "kind": "input"}, {"id": "out", "kind": "output"}],
            "edges": [{"source": "in", "target": "out"}],
            "input": "hello"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], "hello");
    assert_eq!(
        body["log"],
        json!(["node in (input) completed", "node out (output) completed"])
    );
    assert_eq!(body["error"], Value::Null);

    let (status, body) = post_json(
        &app,
        "/api/execute",
        json!({
            "nodes": [{"id": "in", "kind": "input"}],
            "edges": [{"source": "in", "target": "ghost"}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("configuration error"));
}

#[tokio::test]
async fn tool_endpoints_pass_through() {
    let app = test_app().await;

    let (status, body) = get_json(&app, "/api/tools?apps=github").await;
    assert_eq!(status, StatusCode::OK);
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "GITHUB_GET_REPO");

    let (status, body) = post_json(
        &app,
        "/api/tools/execute",
        json!({"tool": "GITHUB_GET_REPO", "arguments": {"repo": "acme/app"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!({"stars": 10}));

    let (status, _) = post_json(&app, "/api/tools/execute", json!({"tool": "NOPE"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn api_keys_are_enforced() {
    let mut config = Config::default();
    config.auth = AuthConfig::parse_keys("k-alice:alice:pro");
    let app = test_app_with(config, ScriptedModel::new(["ok"]), StaticTools::new()).await;

    let (status, _) = get_json(&app, "/api/workflows").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request_json(
        &app,
        Method::GET,
        "/api/workflows",
        None,
        &[("authorization", "Bearer wrong")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = request_json(
        &app,
        Method::POST,
        "/api/execute",
        Some(json!({
            "nodes": [{"id": "in", "kind": "input"}, {"id": "out", "kind": "output"}],
            "edges": [{"source": "in", "target": "out"}],
            "input": "hi"
        })),
        &[("authorization", "Bearer k-alice")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], "hi");
}
