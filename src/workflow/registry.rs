/// Hot-reload workflow registry using ArcSwap
///
/// Provides lock-free, atomic updates to the in-memory registry of loaded
/// workflows. Each update swaps the entire map pointer, so runs that already
/// hold a graph continue undisturbed.

use crate::runtime::graph::WorkflowGraph;
use crate::workflow::{storage::WorkflowStorage, types::Workflow};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Lock-free workflow registry for hot-reload capabilities
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Key: workflow_id, Value: compiled workflow
    workflows: ArcSwap<HashMap<String, CompiledWorkflow>>,

    /// Reference to persistent storage for reload operations
    storage: WorkflowStorage,
}

/// Workflow definition together with its loaded graph
///
/// Cloning is cheap; the graph is shared.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    /// Base workflow definition
    pub workflow: Workflow,

    /// Validated graph ready for execution
    pub graph: Arc<WorkflowGraph>,
}

impl CompiledWorkflow {
    /// Load the workflow's graph; fails on any configuration error
    pub fn compile(workflow: Workflow) -> Result<Self> {
        let graph = WorkflowGraph::from_workflow(&workflow)
            .map_err(|e| anyhow::anyhow!("workflow '{}' is invalid: {}", workflow.id, e))?;

        Ok(Self {
            workflow,
            graph: Arc::new(graph),
        })
    }
}

impl WorkflowRegistry {
    /// Create new registry instance with storage backend
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Initialize registry by loading all workflows from storage
    ///
    /// Stored workflows that no longer load are skipped with a warning.
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored_workflows = self.storage.load_all_workflows().await?;

        let mut compiled = HashMap::new();
        for (id, workflow) in stored_workflows {
            match CompiledWorkflow::compile(workflow) {
                Ok(workflow) => {
                    compiled.insert(id, workflow);
                }
                Err(e) => tracing::warn!("⚠️ Skipping stored workflow: {}", e),
            }
        }

        // Atomic swap of the entire registry
        self.workflows.store(Arc::new(compiled));

        tracing::info!("Initialized workflow registry with {} workflows", self.workflows.load().len());

        Ok(())
    }

    /// Hot-reload a single workflow from storage
    pub async fn reload_workflow(&self, workflow_id: &str) -> Result<()> {
        let workflow = self
            .storage
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Workflow not found: {}", workflow_id))?;

        self.insert(CompiledWorkflow::compile(workflow)?);

        tracing::info!("Hot-reloaded workflow: {}", workflow_id);

        Ok(())
    }

    /// Put an already compiled workflow into the registry
    pub fn insert(&self, compiled: CompiledWorkflow) {
        let current = self.workflows.load();
        let mut new_registry = (**current).clone();
        new_registry.insert(compiled.workflow.id.clone(), compiled);
        self.workflows.store(Arc::new(new_registry));
    }

    /// Get a workflow by ID (lock-free read)
    pub fn get_workflow(&self, workflow_id: &str) -> Option<CompiledWorkflow> {
        self.workflows.load().get(workflow_id).cloned()
    }

    /// List all active workflow IDs
    pub fn list_workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove a workflow from registry
    pub fn remove_workflow(&self, workflow_id: &str) {
        let current = self.workflows.load();
        let mut new_registry = (**current).clone();

        if new_registry.remove(workflow_id).is_some() {
            self.workflows.store(Arc::new(new_registry));
            tracing::info!("Removed workflow from registry: {}", workflow_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Edge, Node, NodeKind};
    use serde_json::Value;

    fn workflow(id: &str, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: id.to_string(),
            nodes: vec![Node::new("in", NodeKind::Input), Node::new("out", NodeKind::Output)],
            edges,
            config: Value::Null,
        }
    }

    #[tokio::test]
    async fn test_init_skips_invalid_workflows() {
        let storage = WorkflowStorage::in_memory().await.unwrap();
        storage.init_schema().await.unwrap();
        storage.save_workflow(&workflow("good", vec![Edge::new("in", "out")])).await.unwrap();
        storage.save_workflow(&workflow("bad", vec![Edge::new("in", "ghost")])).await.unwrap();

        let registry = WorkflowRegistry::new(storage);
        registry.init_from_storage().await.unwrap();
        assert_eq!(registry.list_workflow_ids(), vec!["good".to_string()]);

        let compiled = registry.get_workflow("good").unwrap();
        assert_eq!(compiled.graph.len(), 2);

        registry.remove_workflow("good");
        assert!(registry.get_workflow("good").is_none());
        assert!(registry.reload_workflow("bad").await.is_err());
    }
}
