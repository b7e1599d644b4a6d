/// Node type registry using ArcSwap
///
/// Maps type tags (`"set"`, `"noOp"`, ...) to constructor closures. Lookups are
/// lock-free; registering a type swaps the whole map, so runs that are already
/// instantiating nodes keep the snapshot they loaded.

use crate::error::EngineError;
use crate::nodes::{self, NoOpNode, SetNode, TriggerEntryNode, WorkflowNode};
use crate::triggers::TriggerKind;
use crate::workflow::types::{Node, WorkflowGraph};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Builds a node instance from its graph definition, validating parameters
pub type NodeConstructor = Arc<dyn Fn(&Node) -> Result<Arc<dyn WorkflowNode>> + Send + Sync>;

/// Lock-free registry of node constructors keyed by type tag
pub struct NodeRegistry {
    constructors: ArcSwap<HashMap<String, NodeConstructor>>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            constructors: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Registry preloaded with the built-in node types
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register(nodes::set::NODE_TYPE, |node| {
            Ok(Arc::new(SetNode::from_node(node)?) as Arc<dyn WorkflowNode>)
        });
        registry.register(nodes::noop::NODE_TYPE, |_node| {
            Ok(Arc::new(NoOpNode) as Arc<dyn WorkflowNode>)
        });
        for kind in [TriggerKind::Manual, TriggerKind::Schedule, TriggerKind::Webhook] {
            registry.register(kind.node_type(), move |_node| {
                Ok(Arc::new(TriggerEntryNode::new(kind)) as Arc<dyn WorkflowNode>)
            });
        }

        registry
    }

    /// Register (or replace) the constructor for `node_type`
    pub fn register<F>(&self, node_type: &str, constructor: F)
    where
        F: Fn(&Node) -> Result<Arc<dyn WorkflowNode>> + Send + Sync + 'static,
    {
        let constructor: NodeConstructor = Arc::new(constructor);

        // Clone current map and update it
        let current = self.constructors.load();
        let mut updated = (**current).clone();
        let replaced = updated.insert(node_type.to_string(), constructor).is_some();

        // Atomic swap to new map
        self.constructors.store(Arc::new(updated));

        if replaced {
            tracing::debug!("🔁 Replaced node type: {}", node_type);
        } else {
            tracing::debug!("🧩 Registered node type: {}", node_type);
        }
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.constructors.load().contains_key(node_type)
    }

    /// Registered type tags, sorted
    pub fn node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.load().keys().cloned().collect();
        types.sort();
        types
    }

    /// Construct the instance for one graph node
    pub fn instantiate(&self, node: &Node) -> Result<Arc<dyn WorkflowNode>> {
        let constructors = self.constructors.load();
        let constructor = constructors
            .get(&node.node_type)
            .ok_or_else(|| EngineError::UnknownNodeType(node.node_type.clone()))?;

        constructor(node)
    }

    /// Construct instances for every enabled node of `graph`, keyed by node id
    pub fn instantiate_graph(&self, graph: &WorkflowGraph) -> Result<HashMap<String, Arc<dyn WorkflowNode>>> {
        graph
            .nodes
            .iter()
            .filter(|node| !node.disabled)
            .map(|node| Ok((node.id.clone(), self.instantiate(node)?)))
            .collect()
    }
}
