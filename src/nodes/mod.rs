/// Node contract and built-in nodes
///
/// Every executable node implements [`WorkflowNode`]. Parameter validation happens in
/// the node's constructor; `execute` only does the work. Transform-style nodes get the
/// per-item loop and continue-on-failure handling from [`TransformNode`] instead of a
/// base class.

use crate::runtime::types::ExecutionContext;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod expression;
pub mod noop;
pub mod set;
pub mod trigger_entry;

pub use noop::NoOpNode;
pub use set::SetNode;
pub use trigger_entry::TriggerEntryNode;

/// One input to a node: the output of a single inbound connection
///
/// Items are never merged; a node with three inbound edges receives three items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputItem {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_output_index: Option<usize>,
}

impl InputItem {
    /// The synthetic item handed to nodes without any usable inbound connection
    pub fn empty() -> Self {
        Self {
            data: json!({ "json": {} }),
            source_node_id: None,
            source_output_index: None,
        }
    }

    pub fn from_source(data: Value, source_node_id: &str, output_index: usize) -> Self {
        Self {
            data,
            source_node_id: Some(source_node_id.to_string()),
            source_output_index: Some(output_index),
        }
    }

    /// The value `$json` refers to
    ///
    /// Like n8n's `$json`, an array output is read through its first item, and an
    /// `{ "json": ... }` envelope is unwrapped.
    pub fn json(&self) -> Value {
        let mut root = &self.data;
        if let Value::Array(items) = root {
            root = items.first().unwrap_or(&Value::Null);
        }
        match root {
            Value::Object(map) if map.contains_key("json") => map["json"].clone(),
            other => other.clone(),
        }
    }
}

/// The execution unit every node implements
#[async_trait]
pub trait WorkflowNode: Send + Sync + std::fmt::Debug {
    /// Type tag this node was registered under
    fn node_type(&self) -> &str;

    /// Run the node once against its input items
    async fn execute(&self, items: &[InputItem], context: &ExecutionContext) -> Result<Value>;
}

/// Capability for nodes that transform each input item independently
///
/// Output cardinality matches input cardinality. With continue-on-failure enabled a
/// failing item is replaced by an `{ "error": ... }` placeholder instead of failing the node.
pub trait TransformNode: Send + Sync {
    fn transform_item(&self, item: &InputItem, context: &ExecutionContext) -> Result<Value>;

    fn transform_all(&self, items: &[InputItem], context: &ExecutionContext) -> Result<Value> {
        let mut outputs = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            match self.transform_item(item, context) {
                Ok(output) => outputs.push(output),
                Err(e) if context.config.continue_on_failure => {
                    tracing::warn!(
                        node_id = %context.node_id,
                        "⚠️ Item {} failed, continuing with placeholder: {}",
                        index,
                        e
                    );
                    outputs.push(json!({ "json": { "error": e.to_string() } }));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Value::Array(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_unwraps_envelope_and_arrays() {
        let item = InputItem::from_source(json!([{ "json": { "a": 1 } }, { "json": { "a": 2 } }]), "src", 0);
        assert_eq!(item.json(), json!({ "a": 1 }));

        let bare = InputItem::from_source(json!({ "a": 3 }), "src", 0);
        assert_eq!(bare.json(), json!({ "a": 3 }));

        assert_eq!(InputItem::empty().json(), json!({}));
    }
}
