/// flowsmith: workflow-builder backend
///
/// This library persists workflows drawn on a node/edge canvas and runs them:
/// input, LLM, tool-call, agent and output nodes executed in dependency order
/// against a language model and a tool integration provider.

// Core configuration and setup
pub mod config;

// Workflow management layer - definitions, storage, and registry
pub mod workflow;

// Runtime execution engine - graph loading, node executors, execution loop
pub mod runtime;

// External collaborators - language model and tool provider clients
pub mod providers;

// Deterministic stub providers for tests
pub mod testing;

// HTTP API layer - workflow CRUD, execution, tools
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use runtime::{EngineError, ExecutionEngine, NodeExecutor, WorkflowGraph};
pub use server::{build_router, build_state, start_server};
pub use workflow::{Edge, ExecutionState, Node, NodeKind, Workflow};
