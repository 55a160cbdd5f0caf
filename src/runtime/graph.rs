/// Workflow graph loader
///
/// Turns node and edge descriptors into a petgraph DAG with typed node
/// configurations, and answers the lookups the execution loop needs.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::runtime::error::{EngineError, EngineResult};
use crate::workflow::node_config::{EngineConfig, NodeSpec};
use crate::workflow::types::{Edge, Node, NodeKind, Workflow};

/// A node after its configuration has been parsed
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedNode {
    pub id: String,
    pub label: Option<String>,
    pub spec: NodeSpec,
}

impl LoadedNode {
    pub fn kind(&self) -> NodeKind {
        self.spec.kind()
    }
}

/// Loaded, validated workflow graph
///
/// Node indices follow declaration order, which the traversal uses to
/// break ties between independent nodes.
#[derive(Debug)]
pub struct WorkflowGraph {
    /// The petgraph DiGraph structure
    graph: DiGraph<LoadedNode, ()>,
    /// Mapping from node ID to graph node index
    node_id_to_index: HashMap<String, NodeIndex>,
    /// Parsed workflow-level configuration
    config: EngineConfig,
}

impl WorkflowGraph {
    /// Build the graph from descriptors
    ///
    /// Fails with a configuration error on duplicate node ids, edges to
    /// unknown nodes, invalid node configs and cycles.
    pub fn load(nodes: &[Node], edges: &[Edge], config: &Value) -> EngineResult<Self> {
        tracing::debug!("🏗️ Loading workflow graph: {} nodes, {} edges", nodes.len(), edges.len());

        if nodes.is_empty() {
            return Err(EngineError::Configuration("workflow has no nodes".to_string()));
        }

        let config = EngineConfig::from_value(config)?;
        let mut graph = DiGraph::new();
        let mut node_id_to_index = HashMap::new();

        for node in nodes {
            if node_id_to_index.contains_key(&node.id) {
                return Err(EngineError::Configuration(format!("duplicate node id: {}", node.id)));
            }
            let loaded = LoadedNode {
                id: node.id.clone(),
                label: node.label.clone(),
                spec: NodeSpec::parse(node)?,
            };
            let index = graph.add_node(loaded);
            node_id_to_index.insert(node.id.clone(), index);
            tracing::debug!("  ➕ Added node: '{}' ({})", node.id, node.kind);
        }

        for edge in edges {
            let from = node_id_to_index.get(&edge.source).ok_or_else(|| {
                EngineError::Configuration(format!("edge references unknown node: {}", edge.source))
            })?;
            let to = node_id_to_index.get(&edge.target).ok_or_else(|| {
                EngineError::Configuration(format!("edge references unknown node: {}", edge.target))
            })?;
            graph.add_edge(*from, *to, ());
            tracing::debug!("  🔗 Added edge: '{}' → '{}'", edge.source, edge.target);
        }

        if let Err(cycle) = toposort(&graph, None) {
            let at = &graph[cycle.node_id()].id;
            tracing::error!("❌ Workflow contains a cycle through '{}'", at);
            return Err(EngineError::Configuration(format!(
                "workflow contains a cycle through node '{at}'"
            )));
        }

        Ok(Self {
            graph,
            node_id_to_index,
            config,
        })
    }

    /// Load a saved workflow definition
    pub fn from_workflow(workflow: &Workflow) -> EngineResult<Self> {
        Self::load(&workflow.nodes, &workflow.edges, &workflow.config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, id: &str) -> Option<&LoadedNode> {
        self.node_id_to_index.get(id).map(|&index| &self.graph[index])
    }

    pub fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.node(id).map(LoadedNode::kind)
    }

    /// Direct successors of `id`, in edge declaration order
    pub fn successors(&self, id: &str) -> Vec<&str> {
        let Some(&index) = self.node_id_to_index.get(id) else {
            return Vec::new();
        };
        // petgraph yields the most recently added edge first
        let mut successors: Vec<&str> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .map(|next| self.graph[next].id.as_str())
            .collect();
        successors.reverse();
        successors
    }

    /// The first input node, else the first node without incoming edges
    pub fn start_node(&self) -> EngineResult<&LoadedNode> {
        self.start_index().map(|index| &self.graph[index])
    }

    fn start_index(&self) -> EngineResult<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&index| self.graph[index].kind() == NodeKind::Input)
            .or_else(|| {
                self.graph.node_indices().find(|&index| {
                    self.graph
                        .neighbors_directed(index, Direction::Incoming)
                        .next()
                        .is_none()
                })
            })
            .ok_or_else(|| EngineError::Configuration("workflow has no start node".to_string()))
    }

    /// Nodes reachable from the start node, in dependency order
    ///
    /// Kahn's algorithm over the reachable subgraph; among ready nodes the
    /// earliest declared runs first. A linear chain yields the plain
    /// successor walk.
    pub fn execution_order(&self) -> EngineResult<Vec<&LoadedNode>> {
        let start = self.start_index()?;

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(index) = bfs.next(&self.graph) {
            reachable.insert(index);
        }

        let mut pending: HashMap<NodeIndex, usize> = reachable
            .iter()
            .map(|&index| {
                let incoming = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .filter(|source| reachable.contains(source))
                    .count();
                (index, incoming)
            })
            .collect();

        let mut ready: BTreeSet<NodeIndex> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&index, _)| index)
            .collect();

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(index) = ready.pop_first() {
            order.push(&self.graph[index]);
            for next in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(next);
                    }
                }
            }
        }

        if order.len() != reachable.len() {
            return Err(EngineError::Configuration("workflow contains a cycle".to_string()));
        }

        Ok(order)
    }
}
