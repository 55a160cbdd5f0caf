/// Core workflow type definitions
///
/// Defines the structures the canvas editor saves (workflows, nodes, edges) and
/// the execution state threaded through a single run. These types are
/// serialized/deserialized from JSON for persistence and the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::runtime::error::EngineError;

/// A complete workflow definition containing nodes and their connections
///
/// Workflows are stored as JSON in SQLite and loaded into petgraph DAGs
/// for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-support-triage")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// List of nodes in this workflow
    pub nodes: Vec<Node>,
    /// List of edges connecting nodes
    pub edges: Vec<Edge>,
    /// Optional engine configuration (user id, agent iteration cap, metadata)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

/// A single node descriptor as drawn on the canvas
///
/// `config` stays free-form here; the graph loader parses it into the
/// explicit configuration struct for the node's kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "in", "summarize")
    pub id: String,
    /// The kind of node which determines execution behavior
    pub kind: NodeKind,
    /// Optional display label from the editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Kind-specific configuration
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl Node {
    /// Create a node with an empty configuration
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            config: Value::Null,
        }
    }

    /// Attach a configuration object
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Available node kinds
///
/// - Input: seeds the run with the caller's input string
/// - Llm: one language-model completion
/// - ToolCall: one tool invocation through the integration provider
/// - Agent: bounded loop of completions and tool invocations
/// - Output: selects the value returned to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Expected config: { "default": "text used when the caller sends nothing" }
    Input,
    /// Expected config: { "prompt": "Summarize: {{input}}", "system": "...", "model": "..." }
    Llm,
    /// Expected config: { "tool": "GITHUB_CREATE_ISSUE", "input_path": "fetch.data.title", "arguments": {...} }
    ToolCall,
    /// Expected config: { "instructions": "...", "tools": ["..."], "max_iterations": 4 }
    Agent,
    /// Expected config: { "source": "summarize" }
    Output,
}

impl NodeKind {
    /// Stable lowercase name used in logs and the wire format
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Llm => "llm",
            NodeKind::ToolCall => "tool-call",
            NodeKind::Agent => "agent",
            NodeKind::Output => "output",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection between two nodes in the workflow DAG
///
/// Field names follow the editor (`source`/`target`); `from`/`to` are
/// accepted as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    #[serde(alias = "from")]
    pub source: String,
    /// Target node ID
    #[serde(alias = "to")]
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role/content pair of the message history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Metadata keys written by the engine and the HTTP layer
///
/// Workflow metadata may not use them.
pub const RESERVED_METADATA_KEYS: &[&str] = &["nodes_executed", "duration_ms", "error_kind", "workflow_id"];

/// Runtime state threaded through one workflow run
///
/// Created at the start of a run, updated after every node, returned to the
/// caller when the run ends. The log only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Accumulated chat history (LLM and agent exchanges)
    pub messages: Vec<Message>,
    /// Current input string
    pub input: String,
    /// Latest value produced by an LLM, tool-call or agent node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_output: Option<String>,
    /// Final output, set only by an output node
    pub output: Option<String>,
    /// Result produced by each completed node, keyed by node id
    pub node_results: BTreeMap<String, Value>,
    /// Ordered trace of node completions/failures
    pub log: Vec<String>,
    /// Terminal error, set when a node failed
    pub error: Option<String>,
    /// Free-form run metadata
    pub metadata: Map<String, Value>,
}

impl ExecutionState {
    /// Fresh state seeded with the caller's input
    pub fn new(initial_input: impl Into<String>) -> Self {
        Self {
            input: initial_input.into(),
            ..Self::default()
        }
    }

    /// True when no node failed
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Append a trace line
    pub fn record(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }

    /// Mark the run as failed
    pub fn fail(&mut self, error: &EngineError) {
        self.error = Some(error.to_string());
        self.metadata
            .insert("error_kind".to_string(), Value::String(error.kind().to_string()));
    }
}
