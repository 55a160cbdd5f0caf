/// Server setup and initialization
///
/// Wires together all components: storage, registry, providers, execution
/// engine, and HTTP routes.

use crate::{
    api::{create_execution_routes, create_tool_routes, create_workflow_routes, AppState},
    config::Config,
    providers::{HttpToolProvider, LanguageModel, OpenAiCompatibleModel, ToolProvider},
    runtime::{engine::ExecutionEngine, executor::NodeExecutor},
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Assemble application state from already constructed collaborators
///
/// Initializes the schema and loads saved workflows into the registry.
pub async fn build_state(
    config: Config,
    storage: WorkflowStorage,
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolProvider>,
) -> Result<AppState> {
    tracing::info!("📋 Initializing workflow storage schema");
    storage
        .init_schema()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize storage schema: {}", e))?;

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(storage.clone()));
    registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load workflows from storage: {}", e))?;

    tracing::info!("🚀 Initializing execution engine");
    let executor = Arc::new(NodeExecutor::new(model, Arc::clone(&tools)));
    let engine = Arc::new(ExecutionEngine::new(executor));

    Ok(AppState {
        storage,
        registry,
        engine,
        tools,
        config: Arc::new(config),
    })
}

/// Build the HTTP router over prepared state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // Workflow management API routes
        .merge(create_workflow_routes())
        // Execution and run history routes
        .merge(create_execution_routes())
        // Tool integration routes
        .merge(create_tool_routes())
        .with_state(state)
}

/// Create the main Axum application with all routes
///
/// Connects the database and the HTTP providers named in the configuration.
pub async fn create_app(config: Config) -> Result<Router> {
    if let Some(parent) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|path| Path::new(path).parent())
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        tracing::info!("📁 Ensuring data directory exists: {}", parent.display());
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;
    }

    let storage = WorkflowStorage::connect(&config.database.url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", config.database.url, e))?;

    tracing::info!("🧠 Language model endpoint: {} ({})", config.llm.base_url, config.llm.model);
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiCompatibleModel::from_settings(&config.llm)?);

    tracing::info!("🔧 Tool provider endpoint: {}", config.tools.base_url);
    let tools: Arc<dyn ToolProvider> = Arc::new(HttpToolProvider::from_settings(&config.tools)?);

    if config.auth.api_keys.is_empty() {
        tracing::warn!("🔓 No API keys configured; requests run as '{}'", config.engine.default_user_id);
    }

    let state = build_state(config, storage, model, tools).await?;

    tracing::info!("✅ Application initialized successfully");
    Ok(build_router(state))
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting flowsmith server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
