/// Runtime Execution Engine
///
/// This module provides the workflow execution engine. It handles:
/// - Loading node/edge descriptors into a petgraph DAG
/// - Ordered, one-at-a-time execution of nodes
/// - Per-kind node executors calling the language model and tool providers
/// - State threading and the execution log

// Error taxonomy shared by the loader and the executors
pub mod error;

// Graph loader: descriptors → validated petgraph DAG
pub mod graph;

// Dotted-path lookup and prompt templating
pub mod path;

// Individual node execution handlers
pub mod executor;

// Execution loop
pub mod engine;

// Re-export main types
pub use engine::ExecutionEngine;
pub use error::{EngineError, EngineResult};
pub use executor::{NodeExecutor, StateUpdate};
pub use graph::WorkflowGraph;
