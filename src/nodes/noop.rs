/// Pass-through node (`noOp`)
///
/// Emits its input items unchanged, one output per item.

use crate::nodes::{InputItem, WorkflowNode};
use crate::runtime::types::ExecutionContext;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub const NODE_TYPE: &str = "noOp";

#[derive(Debug, Clone, Default)]
pub struct NoOpNode;

#[async_trait]
impl WorkflowNode for NoOpNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    async fn execute(&self, items: &[InputItem], _context: &ExecutionContext) -> Result<Value> {
        Ok(Value::Array(items.iter().map(|item| item.data.clone()).collect()))
    }
}
