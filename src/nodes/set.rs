/// Value-setting transform node (`set`)
///
/// Expected params:
/// `{ "values": { "user.name": "{{ $json.name }}", "score": 10 }, "keepOnlySet": false }`
/// or the list form `{ "values": [{ "name": "user.name", "value": "..." }] }`.
/// Each input item produces one output item `{ "json": ... }`.

use crate::error::EngineError;
use crate::nodes::expression::{resolve_value, set_path, ExpressionScope};
use crate::nodes::{InputItem, TransformNode, WorkflowNode};
use crate::runtime::types::ExecutionContext;
use crate::workflow::types::Node;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const NODE_TYPE: &str = "set";

#[derive(Debug, Clone)]
pub struct SetNode {
    /// (dot-path, raw value) pairs in declaration order
    assignments: Vec<(String, Value)>,
    /// Start from an empty object instead of the incoming item
    keep_only_set: bool,
    parameters: Value,
}

impl SetNode {
    /// Build from node parameters, failing on a missing or malformed `values`
    pub fn new(parameters: &Value) -> Result<Self, EngineError> {
        let values = parameters
            .get("values")
            .ok_or_else(|| EngineError::parameter(NODE_TYPE, "values", "is required"))?;

        let assignments: Vec<(String, Value)> = match values {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Value::Array(list) => list
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    let name = entry.get("name").and_then(Value::as_str).ok_or_else(|| {
                        EngineError::parameter(NODE_TYPE, "values", format!("entry {} has no 'name'", i))
                    })?;
                    Ok((name.to_string(), entry.get("value").cloned().unwrap_or(Value::Null)))
                })
                .collect::<Result<Vec<_>, EngineError>>()?,
            _ => {
                return Err(EngineError::parameter(
                    NODE_TYPE,
                    "values",
                    "must be an object or a list of {name, value}",
                ))
            }
        };

        if let Some((path, _)) = assignments.iter().find(|(path, _)| path.split('.').any(str::is_empty)) {
            return Err(EngineError::parameter(
                NODE_TYPE,
                "values",
                format!("invalid field path '{}'", path),
            ));
        }

        let keep_only_set = parameters
            .get("keepOnlySet")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            assignments,
            keep_only_set,
            parameters: parameters.clone(),
        })
    }

    pub fn from_node(node: &Node) -> Result<Self, EngineError> {
        Self::new(&node.parameters)
    }
}

impl TransformNode for SetNode {
    fn transform_item(&self, item: &InputItem, _context: &ExecutionContext) -> Result<Value> {
        let source = item.json();
        let scope = ExpressionScope {
            json: &source,
            parameters: &self.parameters,
        };

        let mut output = match (&source, self.keep_only_set) {
            (_, true) | (Value::Null, false) => json!({}),
            (Value::Object(_), false) => source.clone(),
            (other, false) => anyhow::bail!(
                "Cannot set fields on a non-object item ({}); enable keepOnlySet",
                other
            ),
        };

        for (path, raw) in &self.assignments {
            set_path(&mut output, path, resolve_value(raw, &scope));
        }

        Ok(json!({ "json": output }))
    }
}

#[async_trait]
impl WorkflowNode for SetNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    async fn execute(&self, items: &[InputItem], context: &ExecutionContext) -> Result<Value> {
        tracing::debug!("✏️ Setting {} field(s) on {} item(s)", self.assignments.len(), items.len());
        self.transform_all(items, context)
    }
}
