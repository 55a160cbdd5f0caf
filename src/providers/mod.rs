/// External collaborators of the execution engine
///
/// The engine talks to two providers:
/// - a language model that turns a message history into a completion
/// - a tool-execution service (the integration provider) that runs tools on
///   behalf of a user and lists the tools available to them

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::error::EngineResult;
use crate::workflow::types::Message;

// OpenAI-compatible chat completions client
pub mod openai;

// REST client for the tool integration provider
pub mod http_tools;

pub use http_tools::HttpToolProvider;
pub use openai::OpenAiCompatibleModel;

/// Per-call completion parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Language-model completion capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete the conversation; failures are `EngineError::Provider`
    async fn complete(&self, messages: &[Message], params: &CompletionParams) -> EngineResult<String>;
}

/// A tool exposed by the integration provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// App/toolkit the tool belongs to (e.g. "github")
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// Filters for tool discovery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolFilter {
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Tool-execution capability
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Run `tool` for `user_id`; returns the provider's result payload
    async fn execute(&self, user_id: &str, tool: &str, arguments: Value) -> EngineResult<Value>;

    /// Tools available to `user_id`
    async fn list_tools(&self, user_id: &str, filter: &ToolFilter) -> EngineResult<Vec<ToolDescriptor>>;
}
