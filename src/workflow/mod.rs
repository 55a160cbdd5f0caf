/// Workflow Management Layer
///
/// This module handles workflow definitions, persistence, and hot-reload registry.
/// It provides:
/// - Type definitions (Workflow, Node, Edge, ExecutionState)
/// - Typed per-kind node configuration
/// - SQLite persistence with sqlx
/// - Lock-free hot-reload registry using ArcSwap

// Core workflow type definitions
pub mod types;

// Typed node and engine configuration
pub mod node_config;

// SQLite persistence layer for workflows and run records
pub mod storage;

// Hot-reload registry using ArcSwap for zero-downtime updates
pub mod registry;

// Re-export commonly used types
pub use node_config::{EngineConfig, NodeSpec};
pub use types::{Edge, ExecutionState, Message, Node, NodeKind, Role, Workflow};
