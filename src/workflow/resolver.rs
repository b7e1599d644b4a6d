/// Dependency graph resolver
///
/// Turns a node/connection list into a linear execution order with Kahn's algorithm
/// over a petgraph DiGraph. Zero in-degree nodes are seeded in declaration order, which
/// is the tie-break for nodes without mutual dependency. Cycles never fail resolution:
/// the result falls back to declaration order and carries a warning plus the cycle members.

use crate::workflow::types::WorkflowGraph;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};

/// Outcome of resolving a graph
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Node ids to execute, always covering every node exactly once
    pub order: Vec<String>,
    /// Nodes that sit on a cycle (strongly connected, or self-looped)
    pub cyclic_nodes: Vec<String>,
    /// Nodes the topological pass could not order (cycle members and everything behind them)
    pub unresolved: Vec<String>,
    /// Human-readable warnings produced while resolving
    pub warnings: Vec<String>,
}

impl Resolution {
    pub fn has_cycle(&self) -> bool {
        !self.unresolved.is_empty()
    }
}

/// Compute the execution order for `graph`
pub fn resolve_execution_order(graph: &WorkflowGraph) -> Resolution {
    let mut dag: DiGraph<&str, ()> = DiGraph::new();
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
    let mut warnings = Vec::new();

    // Node indices follow declaration order
    for node in &graph.nodes {
        let idx = dag.add_node(node.id.as_str());
        index_of.insert(node.id.as_str(), idx);
    }

    for edge in graph.edges() {
        match (index_of.get(edge.source.as_str()), index_of.get(edge.target.as_str())) {
            (Some(&from), Some(&to)) => {
                dag.add_edge(from, to, ());
            }
            _ => {
                let message = format!(
                    "Ignoring connection '{}' -> '{}' with an unknown endpoint",
                    edge.source, edge.target
                );
                tracing::warn!("⚠️ {}", message);
                warnings.push(message);
            }
        }
    }

    let mut in_degree: Vec<usize> = dag
        .node_indices()
        .map(|idx| dag.edges_directed(idx, petgraph::Direction::Incoming).count())
        .collect();

    let mut queue: VecDeque<NodeIndex> = dag
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    let mut order: Vec<NodeIndex> = Vec::with_capacity(dag.node_count());
    while let Some(current) = queue.pop_front() {
        order.push(current);

        let mut freed: Vec<NodeIndex> = Vec::new();
        for edge in dag.edges(current) {
            let target = edge.target();
            in_degree[target.index()] -= 1;
            if in_degree[target.index()] == 0 {
                freed.push(target);
            }
        }
        // petgraph yields edges newest-first; keep newly freed nodes in declaration order
        freed.sort();
        queue.extend(freed);
    }

    if order.len() == dag.node_count() {
        tracing::debug!("📋 Resolved execution order for {} nodes", order.len());
        return Resolution {
            order: order.iter().map(|&idx| dag[idx].to_string()).collect(),
            cyclic_nodes: Vec::new(),
            unresolved: Vec::new(),
            warnings,
        };
    }

    let mut cyclic: Vec<NodeIndex> = tarjan_scc(&dag)
        .into_iter()
        .filter(|scc| scc.len() > 1 || dag.contains_edge(scc[0], scc[0]))
        .flatten()
        .collect();
    cyclic.sort();
    let cyclic_nodes: Vec<String> = cyclic.iter().map(|&idx| dag[idx].to_string()).collect();

    let mut ordered = vec![false; dag.node_count()];
    for idx in &order {
        ordered[idx.index()] = true;
    }
    let unresolved: Vec<String> = dag
        .node_indices()
        .filter(|idx| !ordered[idx.index()])
        .map(|idx| dag[idx].to_string())
        .collect();

    let message = format!(
        "Cycle detected involving nodes [{}]; falling back to declaration order",
        cyclic_nodes.join(", ")
    );
    tracing::warn!("🔁 {}", message);
    warnings.push(message);

    Resolution {
        order: graph.nodes.iter().map(|n| n.id.clone()).collect(),
        cyclic_nodes,
        unresolved,
        warnings,
    }
}
