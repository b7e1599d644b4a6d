/// Workflow-running subscriber
///
/// Runs the graph through a fresh engine for every firing and hands the result to a
/// sink. A failed run is reported back to the trigger so its retry policy applies.

use crate::config::EngineConfig;
use crate::runtime::engine::ExecutionEngine;
use crate::runtime::sink::ExecutionSink;
use crate::runtime::types::TriggerInvocation;
use crate::triggers::base::TriggerSubscriber;
use crate::workflow::registry::NodeRegistry;
use crate::workflow::types::WorkflowGraph;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct WorkflowSubscriber {
    graph: Arc<WorkflowGraph>,
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    sink: Arc<dyn ExecutionSink>,
}

impl WorkflowSubscriber {
    pub fn new(
        graph: Arc<WorkflowGraph>,
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        Self {
            graph,
            registry,
            config,
            sink,
        }
    }
}

#[async_trait]
impl TriggerSubscriber for WorkflowSubscriber {
    async fn on_fire(&self, invocation: TriggerInvocation) -> Result<()> {
        let trigger_id = invocation.trigger_id.clone();
        let engine = ExecutionEngine::from_registry(Arc::clone(&self.graph), &self.registry, self.config.clone())?
            .with_trigger(invocation);
        tracing::info!(trigger_id = %trigger_id, run_id = %engine.run_id(), "🚀 Trigger started workflow run");

        let result = engine.execute().await;
        self.sink.persist(&result, &result.logs).await?;

        if !result.success {
            anyhow::bail!(
                "Workflow run {} failed: {}",
                result.run_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }
}
