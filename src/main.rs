/// flowsmith server entry point
///
/// Loads configuration from the environment and starts the HTTP server:
/// - Workflow management API at /api/workflows/*
/// - Execution at /api/workflows/{id}/execute and /api/execute
/// - Tool integration at /api/tools/*
/// - Health check at /healthz

use flowsmith::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // FLOWSMITH_* environment variables, with local defaults
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
