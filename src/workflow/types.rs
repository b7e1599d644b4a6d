/// Core workflow type definitions
///
/// Defines nodes, connections and the graph they form, in the JSON shape produced by
/// workflow authoring tools:
/// `{ nodes: [{id, name, type, parameters, disabled?}],
///    connections: { target: { inputPort: [{node, type, index}] } } }`

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// A single node in the workflow graph
///
/// Identity is `id`, unique within a graph. `parameters` is opaque here; node
/// constructors validate it when the node instance is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "n1", "webhook-start")
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Type tag resolved through the node registry (e.g., "set", "webhookTrigger")
    #[serde(rename = "type")]
    pub node_type: String,
    /// Node-specific configuration
    #[serde(default = "empty_object")]
    pub parameters: Value,
    /// Disabled nodes are skipped by the engine
    #[serde(default)]
    pub disabled: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, parameters: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            parameters,
            disabled: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Source side of a connection as stored in the graph input shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRef {
    /// Source node ID
    pub node: String,
    /// Connection kind (usually "main")
    #[serde(rename = "type", default = "main_port")]
    pub kind: String,
    /// Output index on the source node
    #[serde(default)]
    pub index: usize,
}

fn main_port() -> String {
    "main".to_string()
}

/// A directed data edge `source -> (target, input_port)`, flattened from the input shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: String,
    pub target: String,
    pub input_port: String,
    pub output_index: usize,
}

/// Inbound connections keyed target → input port → sources
pub type ConnectionMap = BTreeMap<String, BTreeMap<String, Vec<ConnectionRef>>>;

/// A complete workflow graph
///
/// May contain cycles; the resolver reports them instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// Optional workflow identifier carried into run results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Nodes in declaration order (the resolver's tie-break order)
    pub nodes: Vec<Node>,
    /// Connections keyed by target node id
    #[serde(default)]
    pub connections: ConnectionMap,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            id: None,
            nodes,
            connections: ConnectionMap::new(),
        }
    }

    /// Add an edge `source -> target` on the "main" input port
    pub fn connect(self, source: &str, target: &str) -> Self {
        self.connect_port(source, 0, target, "main")
    }

    /// Add an edge from `source` output `output_index` into `target`'s `input_port`
    pub fn connect_port(mut self, source: &str, output_index: usize, target: &str, input_port: &str) -> Self {
        self.connections
            .entry(target.to_string())
            .or_default()
            .entry(input_port.to_string())
            .or_default()
            .push(ConnectionRef {
                node: source.to_string(),
                kind: main_port(),
                index: output_index,
            });
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All connections, flattened, in target → port order
    pub fn edges(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .flat_map(|(target, ports)| {
                ports.iter().flat_map(move |(port, sources)| {
                    sources.iter().map(move |src| Connection {
                        source: src.node.clone(),
                        target: target.clone(),
                        input_port: port.clone(),
                        output_index: src.index,
                    })
                })
            })
            .collect()
    }

    /// Inbound connections of one node, in input port order
    pub fn inbound(&self, target: &str) -> Vec<Connection> {
        let Some(ports) = self.connections.get(target) else {
            return Vec::new();
        };

        ports
            .iter()
            .flat_map(|(port, sources)| {
                sources.iter().map(move |src| Connection {
                    source: src.node.clone(),
                    target: target.to_string(),
                    input_port: port.clone(),
                    output_index: src.index,
                })
            })
            .collect()
    }

    /// Check node id uniqueness and that every connection endpoint exists
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(EngineError::InvalidGraph("node with empty id".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(EngineError::InvalidGraph(format!("duplicate node id '{}'", node.id)));
            }
        }

        for edge in self.edges() {
            if !seen.contains(edge.target.as_str()) {
                return Err(EngineError::InvalidGraph(format!(
                    "connection targets unknown node '{}'",
                    edge.target
                )));
            }
            if !seen.contains(edge.source.as_str()) {
                return Err(EngineError::InvalidGraph(format!(
                    "connection from unknown node '{}' into '{}'",
                    edge.source, edge.target
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_graph_input_shape() {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "nodes": [
                {"id": "a", "name": "Start", "type": "manualTrigger"},
                {"id": "b", "name": "Set", "type": "set", "parameters": {"values": {"x": 1}}, "disabled": true}
            ],
            "connections": {
                "b": {"main": [{"node": "a", "type": "main", "index": 0}]}
            }
        }))
        .unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.nodes[1].disabled);
        assert_eq!(graph.nodes[0].parameters, json!({}));
        assert_eq!(
            graph.inbound("b"),
            vec![Connection {
                source: "a".to_string(),
                target: "b".to_string(),
                input_port: "main".to_string(),
                output_index: 0,
            }]
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_endpoint() {
        let graph = WorkflowGraph::new(vec![Node::new("a", "noOp", json!({}))]).connect("ghost", "a");
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let graph = WorkflowGraph::new(vec![
            Node::new("a", "noOp", json!({})),
            Node::new("a", "noOp", json!({})),
        ]);
        assert!(matches!(graph.validate(), Err(EngineError::InvalidGraph(_))));
    }
}
