/// Typed node and engine configuration
///
/// The editor stores every node's configuration as a free-form JSON object.
/// At load time each object is parsed into the struct for its node kind, so
/// executors never reach into untyped maps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::runtime::error::{EngineError, EngineResult};
use crate::workflow::types::{Node, NodeKind, RESERVED_METADATA_KEYS};

/// Agent loops stop after this many external calls unless configured otherwise
pub const DEFAULT_MAX_AGENT_ITERATIONS: usize = 8;

/// Workflow-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// User on whose behalf tools are executed
    #[serde(default)]
    pub user_id: Option<String>,
    /// Default external-call budget for agent nodes
    #[serde(default = "default_max_agent_iterations")]
    pub max_agent_iterations: usize,
    /// Copied into every run's metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            max_agent_iterations: DEFAULT_MAX_AGENT_ITERATIONS,
            metadata: Map::new(),
        }
    }
}

impl EngineConfig {
    /// Parse the optional workflow configuration mapping
    pub fn from_value(raw: &Value) -> EngineResult<Self> {
        let config: EngineConfig = parse_object(raw)
            .map_err(|e| EngineError::Configuration(format!("invalid engine config: {e}")))?;
        if config.max_agent_iterations == 0 {
            return Err(EngineError::Configuration(
                "max_agent_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(key) = RESERVED_METADATA_KEYS.iter().find(|key| config.metadata.contains_key(**key)) {
            return Err(EngineError::Configuration(format!("metadata key '{key}' is reserved")));
        }
        Ok(config)
    }
}

fn default_max_agent_iterations() -> usize {
    DEFAULT_MAX_AGENT_ITERATIONS
}

fn default_prompt() -> String {
    "{{input}}".to_string()
}

fn default_input_key() -> String {
    "input".to_string()
}

fn default_true() -> bool {
    true
}

/// Input node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Used when the caller supplies an empty input
    #[serde(default)]
    pub default: Option<String>,
}

/// Sampling parameters shared by LLM and agent nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// LLM node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Prompt template; `{{input}}`, `{{output}}` and `{{<node>.<path>}}` are substituted
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Optional system prompt (also a template)
    #[serde(default)]
    pub system: Option<String>,
    /// Send the accumulated history along with the prompt
    #[serde(default = "default_true")]
    pub include_history: bool,
    #[serde(flatten)]
    pub params: ModelParams,
}

/// Tool-call node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallConfig {
    /// Tool identifier at the integration provider
    pub tool: String,
    /// Static arguments sent with every call
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Dotted path into prior node results, e.g. "fetch.data.items.0.title"
    #[serde(default)]
    pub input_path: Option<String>,
    /// Argument name the resolved input is stored under
    #[serde(default = "default_input_key")]
    pub input_key: String,
    /// Overrides the workflow's user id
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Agent node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Standing instructions placed in the system prompt
    #[serde(default)]
    pub instructions: String,
    /// Task template, rendered like an LLM prompt
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Tools the agent may call
    #[serde(default)]
    pub tools: Vec<String>,
    /// Apps whose tools are discovered from the provider and added to `tools`
    #[serde(default)]
    pub apps: Vec<String>,
    /// External-call budget; falls back to the workflow's `max_agent_iterations`
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub include_history: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub params: ModelParams,
}

/// Output node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Dotted path into node results; defaults to the current output
    #[serde(default)]
    pub source: Option<String>,
}

/// A node's behavior together with its parsed configuration
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    Input(InputConfig),
    Llm(LlmConfig),
    ToolCall(ToolCallConfig),
    Agent(AgentConfig),
    Output(OutputConfig),
}

impl NodeSpec {
    /// Parse a node descriptor's configuration for its kind
    pub fn parse(node: &Node) -> EngineResult<Self> {
        let invalid = |e: serde_json::Error| {
            EngineError::Configuration(format!(
                "node '{}' ({}) has invalid config: {}",
                node.id, node.kind, e
            ))
        };

        let spec = match node.kind {
            NodeKind::Input => NodeSpec::Input(parse_object(&node.config).map_err(invalid)?),
            NodeKind::Llm => NodeSpec::Llm(parse_object(&node.config).map_err(invalid)?),
            NodeKind::ToolCall => {
                let config: ToolCallConfig = parse_object(&node.config).map_err(invalid)?;
                if config.tool.trim().is_empty() {
                    return Err(EngineError::Configuration(format!(
                        "node '{}' (tool-call) has an empty tool name",
                        node.id
                    )));
                }
                NodeSpec::ToolCall(config)
            }
            NodeKind::Agent => {
                let config: AgentConfig = parse_object(&node.config).map_err(invalid)?;
                if config.max_iterations == Some(0) {
                    return Err(EngineError::Configuration(format!(
                        "node '{}' (agent) needs max_iterations of at least 1",
                        node.id
                    )));
                }
                NodeSpec::Agent(config)
            }
            NodeKind::Output => NodeSpec::Output(parse_object(&node.config).map_err(invalid)?),
        };

        Ok(spec)
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSpec::Input(_) => NodeKind::Input,
            NodeSpec::Llm(_) => NodeKind::Llm,
            NodeSpec::ToolCall(_) => NodeKind::ToolCall,
            NodeSpec::Agent(_) => NodeKind::Agent,
            NodeSpec::Output(_) => NodeKind::Output,
        }
    }
}

/// Deserialize a config object, treating a missing (null) config as `{}`
fn parse_object<T: DeserializeOwned>(raw: &Value) -> Result<T, serde_json::Error> {
    match raw {
        Value::Null => serde_json::from_value(Value::Object(Map::new())),
        other => serde_json::from_value(other.clone()),
    }
}
