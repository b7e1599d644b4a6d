/// Trigger entry nodes (`manualTrigger`, `scheduleTrigger`, `webhookTrigger`)
///
/// These nodes start a graph. The trigger itself lives in the triggers layer; inside a
/// run the entry node only hands the firing payload to its dependents. An entry node
/// that isn't the one being fired emits an empty item.

use crate::nodes::{InputItem, WorkflowNode};
use crate::runtime::types::ExecutionContext;
use crate::triggers::TriggerKind;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct TriggerEntryNode {
    kind: TriggerKind,
}

impl TriggerEntryNode {
    pub fn new(kind: TriggerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }
}

#[async_trait]
impl WorkflowNode for TriggerEntryNode {
    fn node_type(&self) -> &str {
        self.kind.node_type()
    }

    async fn execute(&self, _items: &[InputItem], context: &ExecutionContext) -> Result<Value> {
        let payload = context
            .trigger
            .as_ref()
            .filter(|invocation| invocation.trigger_id == context.node_id)
            .map(|invocation| invocation.payload.clone())
            .unwrap_or_else(|| json!({}));

        Ok(json!([{ "json": payload }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::TriggerInvocation;

    #[tokio::test]
    async fn test_emits_payload_only_for_own_firing() {
        let node = TriggerEntryNode::new(TriggerKind::Webhook);
        let invocation = TriggerInvocation {
            trigger_id: "hook".to_string(),
            payload: json!({ "body": { "id": 1 } }),
        };

        let own = ExecutionContext::for_test("hook").with_trigger(invocation.clone());
        assert_eq!(
            node.execute(&[InputItem::empty()], &own).await.unwrap(),
            json!([{ "json": { "body": { "id": 1 } } }])
        );

        let other = ExecutionContext::for_test("other").with_trigger(invocation);
        assert_eq!(
            node.execute(&[InputItem::empty()], &other).await.unwrap(),
            json!([{ "json": {} }])
        );
    }
}
