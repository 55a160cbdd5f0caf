/// Petgraph-based workflow execution loop
///
/// Walks a loaded workflow graph one node at a time, merging every node's
/// update into the run state and stopping at the first failure.

use crate::runtime::error::EngineResult;
use crate::runtime::executor::NodeExecutor;
use crate::runtime::graph::WorkflowGraph;
use crate::workflow::node_config::EngineConfig;
use crate::workflow::types::{ExecutionState, Workflow, RESERVED_METADATA_KEYS};
use serde_json::json;
use std::sync::Arc;

/// Workflow execution engine
///
/// Runs are independent: each owns its state and the executor's providers are
/// only read.
#[derive(Debug)]
pub struct ExecutionEngine {
    /// Node executor for handling individual node execution
    executor: Arc<NodeExecutor>,
}

impl ExecutionEngine {
    /// Create new execution engine with node executor
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }

    /// Load and run a workflow definition
    ///
    /// Only a load failure is returned as an error; node failures are
    /// reported inside the returned state.
    pub async fn execute(&self, workflow: &Workflow, initial_input: &str) -> EngineResult<ExecutionState> {
        let graph = WorkflowGraph::from_workflow(workflow)?;
        Ok(self.run(&graph, initial_input).await)
    }

    /// Run a loaded graph with its own engine configuration
    pub async fn run(&self, graph: &WorkflowGraph, initial_input: &str) -> ExecutionState {
        self.run_with_config(graph, graph.config(), initial_input).await
    }

    /// Run a loaded graph with an explicit engine configuration
    pub async fn run_with_config(
        &self,
        graph: &WorkflowGraph,
        config: &EngineConfig,
        initial_input: &str,
    ) -> ExecutionState {
        let run_start_time = std::time::Instant::now();
        let mut state = ExecutionState::new(initial_input);
        for (key, value) in &config.metadata {
            if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
                tracing::warn!("⚠️ Ignoring reserved metadata key '{}'", key);
                continue;
            }
            state.metadata.insert(key.clone(), value.clone());
        }

        let order = match graph.execution_order() {
            Ok(order) => order,
            Err(e) => {
                tracing::error!("❌ Cannot order workflow nodes: {}", e);
                state.fail(&e);
                return state;
            }
        };

        tracing::info!("🔄 Executing {} nodes", order.len());

        let mut executed = 0;
        for (step, node) in order.iter().enumerate() {
            tracing::info!(
                "📍 Step {}/{}: Executing node '{}' (kind: {})",
                step + 1,
                order.len(),
                node.id,
                node.kind()
            );
            let node_start_time = std::time::Instant::now();

            match self.executor.execute_node(node, &state, config).await {
                Ok(update) => {
                    update.apply_to(&node.id, &mut state);
                    state.record(format!("node {} ({}) completed", node.id, node.kind()));
                    executed += 1;
                    tracing::info!("✅ Node '{}' completed in {:?}", node.id, node_start_time.elapsed());
                }
                Err(e) => {
                    tracing::error!("❌ Node '{}' failed after {:?}: {}", node.id, node_start_time.elapsed(), e);
                    state.record(format!("node {} ({}) failed: {}", node.id, node.kind(), e));
                    state.fail(&e);
                    break;
                }
            }
        }

        state.metadata.insert("nodes_executed".to_string(), json!(executed));
        state
            .metadata
            .insert("duration_ms".to_string(), json!(run_start_time.elapsed().as_millis() as u64));

        if state.succeeded() {
            tracing::info!("🎉 Workflow run completed in {:?}", run_start_time.elapsed());
        }

        state
    }
}
