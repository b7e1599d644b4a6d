/// Workflow execution engine
///
/// Resolves the execution order of a workflow graph and runs its nodes one at a time in
/// that order. Each node receives one input item per successful inbound connection,
/// is retried with exponential backoff, and its outcome is recorded for dependents.
/// An engine instance is single-use: `execute` consumes it.

use crate::config::{CyclePolicy, EngineConfig};
use crate::error::EngineError;
use crate::nodes::{InputItem, WorkflowNode};
use crate::runtime::executor::NodeExecutor;
use crate::runtime::logger::{ExecutionLogger, LogLevel};
use crate::runtime::types::{
    ExecutionContext, ExecutionSummary, NodeExecutionResult, NodeStatus, TriggerInvocation,
    WorkflowExecutionResult,
};
use crate::workflow::registry::NodeRegistry;
use crate::workflow::resolver::resolve_execution_order;
use crate::workflow::types::WorkflowGraph;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;

/// Single-use executor for one run of one graph
#[derive(Debug)]
pub struct ExecutionEngine {
    run_id: String,
    graph: Arc<WorkflowGraph>,
    config: Arc<EngineConfig>,
    /// Node instances keyed by graph node id
    nodes: HashMap<String, Arc<dyn WorkflowNode>>,
    trigger: Option<TriggerInvocation>,
}

impl ExecutionEngine {
    /// Create an engine with no node instances registered yet
    pub fn new(graph: impl Into<Arc<WorkflowGraph>>, config: EngineConfig) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            graph: graph.into(),
            config: Arc::new(config),
            nodes: HashMap::new(),
            trigger: None,
        }
    }

    /// Create an engine and instantiate every enabled node through `registry`
    ///
    /// Fails fast with the node's parameter validation error.
    pub fn from_registry(
        graph: impl Into<Arc<WorkflowGraph>>,
        registry: &NodeRegistry,
        config: EngineConfig,
    ) -> Result<Self> {
        let mut engine = Self::new(graph, config);
        let graph = Arc::clone(&engine.graph);

        for node in graph.nodes.iter().filter(|n| !n.disabled) {
            let instance = registry.instantiate(node)?;
            engine.register_node(&node.id, instance);
        }

        Ok(engine)
    }

    /// Provide the instance that executes graph node `id`
    pub fn register_node(&mut self, id: &str, node: Arc<dyn WorkflowNode>) -> &mut Self {
        self.nodes.insert(id.to_string(), node);
        self
    }

    /// Attach the trigger firing that started this run
    pub fn with_trigger(mut self, invocation: TriggerInvocation) -> Self {
        self.trigger = Some(invocation);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the graph once
    ///
    /// Never returns an error: failures become `success: false` results carrying the
    /// partial node results and logs produced so far.
    pub async fn execute(self) -> WorkflowExecutionResult {
        let mut run = RunState::new(&self.run_id, &self.graph, self.config.log_level);
        run.logger.info(
            format!(
                "🚀 Starting workflow execution{} with {} nodes",
                self.graph
                    .id
                    .as_deref()
                    .map(|id| format!(" '{}'", id))
                    .unwrap_or_default(),
                self.graph.nodes.len()
            ),
            None,
        );

        if let Err(e) = self.graph.validate() {
            run.logger.error(format!("❌ {}", e), None);
            return run.finish(&self.graph, Vec::new(), Some(e.to_string()));
        }

        let resolution = resolve_execution_order(&self.graph);
        for warning in &resolution.warnings {
            run.logger.warn(format!("⚠️ {}", warning), None);
        }

        let mut unreachable: HashSet<String> = HashSet::new();
        if resolution.has_cycle() {
            match self.config.cycle_policy {
                CyclePolicy::Fail => {
                    let err = EngineError::CycleDetected {
                        nodes: resolution.cyclic_nodes.clone(),
                    };
                    run.logger.error(format!("❌ {}", err), None);
                    return run.finish(&self.graph, resolution.order, Some(err.to_string()));
                }
                CyclePolicy::Skip => {
                    unreachable.extend(resolution.unresolved.iter().cloned());
                }
                CyclePolicy::Fallback => {
                    run.logger.warn("🔁 Executing cyclic graph in declaration order", None);
                }
            }
        }
        run.logger.debug(format!("📋 Execution order: {:?}", resolution.order), None);

        let mut context = ExecutionContext::new(&self.run_id, Arc::clone(&self.graph), Arc::clone(&self.config));
        context.trigger = self.trigger.clone();
        let executor = NodeExecutor::new(Arc::clone(&self.config));

        for (step, node_id) in resolution.order.iter().enumerate() {
            let node_id = node_id.as_str();
            let Some(node) = self.graph.node(node_id) else {
                continue;
            };

            if node.disabled {
                run.statuses.insert(node_id.to_string(), NodeStatus::Skipped);
                run.logger.info(format!("⏭️ Skipping disabled node '{}'", node_id), Some(node_id));
                continue;
            }
            if unreachable.contains(node_id) {
                run.statuses.insert(node_id.to_string(), NodeStatus::Skipped);
                run.logger.warn(
                    format!("⏭️ Skipping node '{}': unreachable because of a cycle", node_id),
                    Some(node_id),
                );
                continue;
            }

            let Some(instance) = self.nodes.get(node_id) else {
                let err = EngineError::NodeNotRegistered(node_id.to_string());
                run.statuses.insert(node_id.to_string(), NodeStatus::Failed);
                run.logger.error(format!("❌ {}", err), Some(node_id));
                if self.config.continue_on_failure {
                    continue;
                }
                return run.finish(&self.graph, resolution.order.clone(), Some(err.to_string()));
            };

            run.statuses.insert(node_id.to_string(), NodeStatus::Running);
            run.logger.info(
                format!(
                    "📍 Step {}/{}: Executing node '{}' (type: {})",
                    step + 1,
                    resolution.order.len(),
                    node_id,
                    node.node_type
                ),
                Some(node_id),
            );

            let items = gather_input_items(&self.graph, node_id, &run.results);
            run.logger.debug(format!("📥 Gathered {} input item(s)", items.len()), Some(node_id));

            let node_context = context.for_node(node_id);
            let node_start = Instant::now();
            let outcome = executor
                .execute_with_retry(instance, items, &node_context, &mut run.logger)
                .await;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            run.node_times.insert(node_id.to_string(), elapsed_ms);

            match outcome.result {
                Ok(data) => {
                    run.record(node_id, Ok(data), elapsed_ms, outcome.attempts);
                    run.statuses.insert(node_id.to_string(), NodeStatus::Completed);
                    run.logger.info(
                        format!("✅ Node '{}' completed in {} ms", node_id, elapsed_ms),
                        Some(node_id),
                    );
                }
                Err(err) => {
                    let message = err.to_string();
                    run.record(node_id, Err(message.clone()), elapsed_ms, outcome.attempts);
                    run.statuses.insert(node_id.to_string(), NodeStatus::Failed);
                    run.logger.error(format!("❌ {}", message), Some(node_id));

                    if !self.config.continue_on_failure {
                        run.logger.error("🛑 Aborting workflow execution", Some(node_id));
                        return run.finish(&self.graph, resolution.order.clone(), Some(message));
                    }
                    run.logger.warn(
                        format!("↪️ Continuing after failure of '{}'", node_id),
                        Some(node_id),
                    );
                }
            }
        }

        run.finish(&self.graph, resolution.order, None)
    }
}

/// One item per inbound connection whose source succeeded, or a single empty item
fn gather_input_items(
    graph: &WorkflowGraph,
    node_id: &str,
    results: &BTreeMap<String, NodeExecutionResult>,
) -> Vec<InputItem> {
    let items: Vec<InputItem> = graph
        .inbound(node_id)
        .into_iter()
        .filter_map(|conn| {
            let source = results.get(&conn.source).filter(|r| r.success)?;
            Some(InputItem::from_source(
                source.data.clone().unwrap_or(Value::Null),
                &conn.source,
                conn.output_index,
            ))
        })
        .collect();

    if items.is_empty() {
        vec![InputItem::empty()]
    } else {
        items
    }
}

/// Mutable bookkeeping owned by a single run
struct RunState {
    run_id: String,
    started: Instant,
    started_at: DateTime<Utc>,
    logger: ExecutionLogger,
    results: BTreeMap<String, NodeExecutionResult>,
    statuses: BTreeMap<String, NodeStatus>,
    node_times: BTreeMap<String, u64>,
}

impl RunState {
    fn new(run_id: &str, graph: &WorkflowGraph, min_level: LogLevel) -> Self {
        Self {
            run_id: run_id.to_string(),
            started: Instant::now(),
            started_at: Utc::now(),
            logger: ExecutionLogger::new(run_id, min_level),
            results: BTreeMap::new(),
            statuses: graph
                .nodes
                .iter()
                .map(|n| (n.id.clone(), NodeStatus::Pending))
                .collect(),
            node_times: BTreeMap::new(),
        }
    }

    fn record(&mut self, node_id: &str, outcome: Result<Value, String>, elapsed_ms: u64, attempts: u32) {
        let (success, data, error) = match outcome {
            Ok(data) => (true, Some(data), None),
            Err(message) => (false, None, Some(message)),
        };
        self.results.insert(
            node_id.to_string(),
            NodeExecutionResult {
                success,
                data,
                error,
                execution_time_ms: elapsed_ms,
                attempts,
                timestamp: Utc::now(),
            },
        );
    }

    fn finish(mut self, graph: &WorkflowGraph, order: Vec<String>, error: Option<String>) -> WorkflowExecutionResult {
        let wall_clock_ms = self.started.elapsed().as_millis() as u64;
        let success = error.is_none();

        if success {
            self.logger.info(format!("🎉 Workflow execution completed in {} ms", wall_clock_ms), None);
        } else {
            self.logger.error(format!("💥 Workflow execution failed after {} ms", wall_clock_ms), None);
        }

        let count = |status: NodeStatus| self.statuses.values().filter(|s| **s == status).count();
        let node_time_ms: u64 = self.node_times.values().sum();
        let summary = ExecutionSummary {
            total_nodes: self.statuses.len(),
            completed: count(NodeStatus::Completed),
            failed: count(NodeStatus::Failed),
            skipped: count(NodeStatus::Skipped),
            pending: count(NodeStatus::Pending),
            node_time_ms,
            wall_clock_ms,
            overhead_ms: wall_clock_ms.saturating_sub(node_time_ms),
            error_count: self.logger.count(LogLevel::Error),
            warning_count: self.logger.count(LogLevel::Warn),
        };

        WorkflowExecutionResult {
            success,
            run_id: self.run_id,
            workflow_id: graph.id.clone(),
            error,
            total_time_ms: wall_clock_ms,
            started_at: self.started_at,
            finished_at: Utc::now(),
            execution_order: order,
            results: self.results,
            statuses: self.statuses,
            node_times: self.node_times,
            logs: self.logger.into_entries(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NoOpNode;
    use crate::workflow::types::Node;
    use serde_json::json;

    #[test]
    fn test_gather_skips_failed_sources() {
        let graph = WorkflowGraph::new(vec![
            Node::new("a", "noOp", json!({})),
            Node::new("b", "noOp", json!({})),
            Node::new("c", "noOp", json!({})),
        ])
        .connect("a", "c")
        .connect("b", "c");

        let mut results = BTreeMap::new();
        let ok = NodeExecutionResult {
            success: true,
            data: Some(json!([{ "json": { "v": 1 } }])),
            error: None,
            execution_time_ms: 1,
            attempts: 1,
            timestamp: Utc::now(),
        };
        results.insert("a".to_string(), ok.clone());
        results.insert(
            "b".to_string(),
            NodeExecutionResult {
                success: false,
                data: None,
                error: Some("boom".to_string()),
                ..ok
            },
        );

        let items = gather_input_items(&graph, "c", &results);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_node_id.as_deref(), Some("a"));

        let none = gather_input_items(&graph, "a", &results);
        assert_eq!(none, vec![InputItem::empty()]);
    }

    #[tokio::test]
    async fn test_invalid_graph_is_a_failed_result() {
        let graph = WorkflowGraph::new(vec![Node::new("a", "noOp", json!({}))]).connect("ghost", "a");
        let mut engine = ExecutionEngine::new(graph, EngineConfig::default());
        engine.register_node("a", Arc::new(NoOpNode));

        let result = engine.execute().await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("ghost"));
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_node_fails_run() {
        let graph = WorkflowGraph::new(vec![Node::new("a", "noOp", json!({}))]);
        let result = ExecutionEngine::new(graph, EngineConfig::default()).execute().await;

        assert!(!result.success);
        assert_eq!(result.status("a"), Some(NodeStatus::Failed));
        assert!(result.result("a").is_none());
    }
}
