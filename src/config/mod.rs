/// Configuration management for the flowsmith service
///
/// Handles server configuration, database connection, provider endpoints,
/// engine defaults and API keys. Every value can be set from a FLOWSMITH_*
/// environment variable for container deployment.

use serde::{Deserialize, Serialize};

use crate::workflow::node_config::DEFAULT_MAX_AGENT_ITERATIONS;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Language-model provider
    pub llm: LlmSettings,
    /// Tool integration provider
    pub tools: ToolSettings,
    /// Engine defaults
    pub engine: EngineSettings,
    /// API authentication
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL (default: "sqlite://data/flowsmith.db")
    pub url: String,
}

/// OpenAI-compatible completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Model used when a node doesn't name one
    pub model: String,
    pub timeout_secs: u64,
}

/// Integration provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Defaults applied to every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// User for anonymous callers
    pub default_user_id: String,
    pub max_agent_iterations: usize,
}

/// Accepted API keys; an empty list disables authentication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub api_keys: Vec<ApiKey>,
}

/// One bearer token and the user it authenticates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub user_id: String,
    pub plan: String,
}

impl AuthConfig {
    /// Parse "key:user[:plan],key:user[:plan]"; malformed entries are skipped
    pub fn parse_keys(raw: &str) -> Self {
        let api_keys = raw
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.trim().splitn(3, ':');
                let key = parts.next().filter(|k| !k.is_empty())?;
                let user_id = parts.next().filter(|u| !u.is_empty())?;
                let plan = parts.next().unwrap_or("free");
                Some(ApiKey {
                    key: key.to_string(),
                    user_id: user_id.to_string(),
                    plan: plan.to_string(),
                })
            })
            .collect();
        Self { api_keys }
    }
}

fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| fallback.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("FLOWSMITH_HOST", "0.0.0.0"),
                port: env_parse("FLOWSMITH_PORT", 3004),
            },
            database: DatabaseConfig {
                url: env_or("FLOWSMITH_DATABASE_URL", "sqlite://data/flowsmith.db"),
            },
            llm: LlmSettings {
                base_url: env_or("FLOWSMITH_LLM_BASE_URL", "https://api.openai.com/v1"),
                api_key: std::env::var("FLOWSMITH_LLM_API_KEY").ok(),
                model: env_or("FLOWSMITH_LLM_MODEL", "gpt-4o-mini"),
                timeout_secs: env_parse("FLOWSMITH_LLM_TIMEOUT_SECS", 60),
            },
            tools: ToolSettings {
                base_url: env_or("FLOWSMITH_TOOLS_BASE_URL", "http://localhost:8787/api/v1"),
                api_key: std::env::var("FLOWSMITH_TOOLS_API_KEY").ok(),
                timeout_secs: env_parse("FLOWSMITH_TOOLS_TIMEOUT_SECS", 30),
            },
            engine: EngineSettings {
                default_user_id: env_or("FLOWSMITH_DEFAULT_USER", "default"),
                max_agent_iterations: env_parse(
                    "FLOWSMITH_MAX_AGENT_ITERATIONS",
                    DEFAULT_MAX_AGENT_ITERATIONS,
                ),
            },
            auth: AuthConfig::parse_keys(&env_or("FLOWSMITH_API_KEYS", "")),
        }
    }
}
