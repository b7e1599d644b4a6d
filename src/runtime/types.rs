/// Runtime types shared by the engine, nodes and sinks
///
/// The context is built once per run and cloned (never mutated) per node invocation.
/// Results are created once per `execute()` call and are immutable after it returns.

use crate::config::EngineConfig;
use crate::runtime::logger::ExecutionLog;
use crate::workflow::types::WorkflowGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The trigger firing that started a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInvocation {
    pub trigger_id: String,
    pub payload: Value,
}

/// Immutable bundle handed to every node invocation
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub workflow_id: Option<String>,
    /// Node currently being executed (empty outside of a node invocation)
    pub node_id: String,
    pub graph: Arc<WorkflowGraph>,
    pub config: Arc<EngineConfig>,
    pub trigger: Option<TriggerInvocation>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>, graph: Arc<WorkflowGraph>, config: Arc<EngineConfig>) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_id: graph.id.clone(),
            node_id: String::new(),
            graph,
            config,
            trigger: None,
            started_at: Utc::now(),
        }
    }

    /// Copy of this context addressed to one node
    pub fn for_node(&self, node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            ..self.clone()
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerInvocation) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[cfg(test)]
    pub(crate) fn for_test(node_id: &str) -> Self {
        Self::new("test-run", Arc::new(WorkflowGraph::default()), Arc::new(EngineConfig::default()))
            .for_node(node_id)
    }
}

/// Lifecycle of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Recorded outcome of a node that was actually attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Counts and timings over one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub total_nodes: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Nodes never reached because the run aborted
    pub pending: usize,
    /// Sum of per-node execution times
    pub node_time_ms: u64,
    /// Wall-clock time of the whole run
    pub wall_clock_ms: u64,
    /// Wall-clock time not spent inside nodes
    pub overhead_ms: u64,
    pub error_count: usize,
    pub warning_count: usize,
}

/// Final report of one `execute()` call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionResult {
    pub success: bool,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_time_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub execution_order: Vec<String>,
    pub results: BTreeMap<String, NodeExecutionResult>,
    pub statuses: BTreeMap<String, NodeStatus>,
    pub node_times: BTreeMap<String, u64>,
    pub logs: Vec<ExecutionLog>,
    pub summary: ExecutionSummary,
}

impl WorkflowExecutionResult {
    pub fn result(&self, node_id: &str) -> Option<&NodeExecutionResult> {
        self.results.get(node_id)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.statuses.get(node_id).copied()
    }
}
