use anyhow::Result;
use async_trait::async_trait;
use flowforge::config::{CyclePolicy, EngineConfig};
use flowforge::nodes::{InputItem, NoOpNode, WorkflowNode};
use flowforge::runtime::{
    ExecutionContext, ExecutionEngine, LogLevel, NodeStatus, TriggerInvocation,
};
use flowforge::workflow::{Node, NodeRegistry, WorkflowGraph};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fails until it has been called `fail_times` times
#[derive(Debug)]
struct FlakyNode {
    fail_times: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl WorkflowNode for FlakyNode {
    fn node_type(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, _items: &[InputItem], _context: &ExecutionContext) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            anyhow::bail!("flaky failure {}", call);
        }
        Ok(json!([{ "json": { "call": call } }]))
    }
}

#[derive(Debug)]
struct AlwaysFailNode;

#[async_trait]
impl WorkflowNode for AlwaysFailNode {
    fn node_type(&self) -> &str {
        "alwaysFail"
    }

    async fn execute(&self, _items: &[InputItem], _context: &ExecutionContext) -> Result<Value> {
        anyhow::bail!("upstream service unavailable")
    }
}

#[derive(Debug)]
struct SlowNode(Duration);

#[async_trait]
impl WorkflowNode for SlowNode {
    fn node_type(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _items: &[InputItem], _context: &ExecutionContext) -> Result<Value> {
        tokio::time::sleep(self.0).await;
        Ok(json!([]))
    }
}

/// Records the items of every invocation
#[derive(Debug, Default)]
struct RecordingNode {
    seen: Mutex<Vec<Vec<InputItem>>>,
}

#[async_trait]
impl WorkflowNode for RecordingNode {
    fn node_type(&self) -> &str {
        "recording"
    }

    async fn execute(&self, items: &[InputItem], _context: &ExecutionContext) -> Result<Value> {
        self.seen.lock().unwrap().push(items.to_vec());
        Ok(json!([{ "json": { "received": items.len() } }]))
    }
}

fn noop(id: &str) -> Node {
    Node::new(id, "noOp", json!({}))
}

fn config(max_retries: u32, continue_on_failure: bool) -> EngineConfig {
    EngineConfig {
        max_retries,
        continue_on_failure,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_diamond_runs_in_dependency_order() {
    let graph = WorkflowGraph::new(vec![noop("c"), noop("b"), noop("a")])
        .connect("a", "b")
        .connect("a", "c")
        .connect("b", "c");

    let mut engine = ExecutionEngine::new(graph, EngineConfig::default());
    for id in ["a", "b", "c"] {
        engine.register_node(id, Arc::new(NoOpNode));
    }
    let result = engine.execute().await;

    assert!(result.success);
    assert_eq!(result.execution_order, vec!["a", "b", "c"]);
    assert_eq!(result.summary.completed, 3);
    assert_eq!(result.summary.total_nodes, 3);
}

#[tokio::test]
async fn test_independent_nodes_keep_declaration_order() {
    let graph = WorkflowGraph::new(vec![noop("x"), noop("y")]);
    let mut engine = ExecutionEngine::new(graph, EngineConfig::default());
    engine.register_node("x", Arc::new(NoOpNode));
    engine.register_node("y", Arc::new(NoOpNode));

    let result = engine.execute().await;
    assert_eq!(result.execution_order, vec!["x", "y"]);
}

#[tokio::test]
async fn test_cycle_fallback_warns_and_runs_everything() {
    let graph = WorkflowGraph::new(vec![noop("a"), noop("b")])
        .connect("a", "b")
        .connect("b", "a");

    let mut engine = ExecutionEngine::new(graph, EngineConfig::default());
    engine.register_node("a", Arc::new(NoOpNode));
    engine.register_node("b", Arc::new(NoOpNode));
    let result = engine.execute().await;

    assert!(result.success);
    assert_eq!(result.execution_order, vec!["a", "b"]);
    assert!(result
        .logs
        .iter()
        .any(|log| log.level == LogLevel::Warn && log.message.contains("Cycle detected")));
    assert!(result.summary.warning_count >= 1);
    assert_eq!(result.status("b"), Some(NodeStatus::Completed));
}

#[tokio::test]
async fn test_cycle_skip_policy_skips_unordered_nodes() {
    let graph = WorkflowGraph::new(vec![noop("start"), noop("a"), noop("b")])
        .connect("start", "a")
        .connect("a", "b")
        .connect("b", "a");

    let mut engine = ExecutionEngine::new(
        graph,
        EngineConfig {
            cycle_policy: CyclePolicy::Skip,
            ..EngineConfig::default()
        },
    );
    for id in ["start", "a", "b"] {
        engine.register_node(id, Arc::new(NoOpNode));
    }
    let result = engine.execute().await;

    assert!(result.success);
    assert_eq!(result.status("start"), Some(NodeStatus::Completed));
    assert_eq!(result.status("a"), Some(NodeStatus::Skipped));
    assert_eq!(result.status("b"), Some(NodeStatus::Skipped));
    assert!(result.result("a").is_none());
    assert_eq!(result.summary.skipped, 2);
}

#[tokio::test]
async fn test_cycle_fail_policy_runs_nothing() {
    let graph = WorkflowGraph::new(vec![noop("a"), noop("b")])
        .connect("a", "b")
        .connect("b", "a");

    let mut engine = ExecutionEngine::new(
        graph,
        EngineConfig {
            cycle_policy: CyclePolicy::Fail,
            ..EngineConfig::default()
        },
    );
    engine.register_node("a", Arc::new(NoOpNode));
    engine.register_node("b", Arc::new(NoOpNode));
    let result = engine.execute().await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Cycle detected between nodes: a, b"));
    assert!(result.results.is_empty());
    assert_eq!(result.summary.pending, 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff_until_success() {
    let graph = WorkflowGraph::new(vec![Node::new("flaky", "flaky", json!({}))]);
    let mut engine = ExecutionEngine::new(graph, config(3, false));
    engine.register_node(
        "flaky",
        Arc::new(FlakyNode {
            fail_times: 2,
            calls: AtomicUsize::new(0),
        }),
    );

    let started = tokio::time::Instant::now();
    let result = engine.execute().await;
    let elapsed = started.elapsed();

    assert!(result.success);
    assert_eq!(result.status("flaky"), Some(NodeStatus::Completed));
    let node = result.result("flaky").unwrap();
    assert_eq!(node.attempts, 3);
    assert_eq!(node.data.as_ref().unwrap()[0]["json"]["call"], 3);
    assert!(elapsed >= Duration::from_millis(3_000), "elapsed {:?}", elapsed);
    assert!(result.node_times["flaky"] >= 3_000);
    assert_eq!(result.summary.warning_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_aborts_run_without_continue() {
    let graph = WorkflowGraph::new(vec![noop("a"), Node::new("b", "alwaysFail", json!({})), noop("c")])
        .connect("a", "b")
        .connect("b", "c");

    let mut engine = ExecutionEngine::new(graph, config(3, false));
    engine.register_node("a", Arc::new(NoOpNode));
    engine.register_node("b", Arc::new(AlwaysFailNode));
    engine.register_node("c", Arc::new(NoOpNode));
    let result = engine.execute().await;

    assert!(!result.success);
    let error = result.error.clone().unwrap();
    assert!(error.contains("upstream service unavailable"), "{}", error);
    assert!(error.contains("3 attempt"));

    assert_eq!(result.status("b"), Some(NodeStatus::Failed));
    assert!(!result.result("b").unwrap().success);
    assert!(result.result("c").is_none());
    assert_eq!(result.status("c"), Some(NodeStatus::Pending));
    assert_eq!(result.summary.completed, 1);
    assert_eq!(result.summary.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_continue_on_failure_passes_only_successful_inputs() {
    let graph = WorkflowGraph::new(vec![
        noop("a"),
        Node::new("b", "alwaysFail", json!({})),
        Node::new("c", "recording", json!({})),
    ])
    .connect("a", "b")
    .connect("a", "c")
    .connect("b", "c");

    let recorder = Arc::new(RecordingNode::default());
    let mut engine = ExecutionEngine::new(graph, config(2, true));
    engine.register_node("a", Arc::new(NoOpNode));
    engine.register_node("b", Arc::new(AlwaysFailNode));
    engine.register_node("c", recorder.clone());
    let result = engine.execute().await;

    assert!(result.success);
    assert_eq!(result.status("b"), Some(NodeStatus::Failed));
    assert_eq!(result.status("c"), Some(NodeStatus::Completed));

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 1);
    assert_eq!(seen[0][0].source_node_id.as_deref(), Some("a"));
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_counts_as_failure() {
    let graph = WorkflowGraph::new(vec![Node::new("slow", "slow", json!({}))]);
    let mut engine = ExecutionEngine::new(
        graph,
        EngineConfig {
            max_retries: 2,
            timeout_ms: 100,
            ..EngineConfig::default()
        },
    );
    engine.register_node("slow", Arc::new(SlowNode(Duration::from_secs(60))));
    let result = engine.execute().await;

    assert!(!result.success);
    let node = result.result("slow").unwrap();
    assert_eq!(node.attempts, 2);
    assert!(node.error.as_ref().unwrap().contains("timed out after 100 ms"));
}

#[tokio::test]
async fn test_disabled_node_is_skipped_and_dependents_get_empty_item() {
    let graph = WorkflowGraph::new(vec![noop("a").disabled(), Node::new("b", "recording", json!({}))])
        .connect("a", "b");

    let recorder = Arc::new(RecordingNode::default());
    let mut engine = ExecutionEngine::new(graph, EngineConfig::default());
    engine.register_node("b", recorder.clone());
    let result = engine.execute().await;

    assert!(result.success);
    assert_eq!(result.status("a"), Some(NodeStatus::Skipped));
    assert!(result.result("a").is_none());
    assert_eq!(recorder.seen.lock().unwrap()[0], vec![InputItem::empty()]);
}

#[tokio::test]
async fn test_expressions_flow_from_trigger_payload() {
    let graph = WorkflowGraph::new(vec![
        Node::new("start", "manualTrigger", json!({})),
        Node::new(
            "shape",
            "set",
            json!({
                "values": {
                    "message": "value is {{ $json.a.b }}",
                    "copy": "{{ $json.a }}"
                },
                "keepOnlySet": true
            }),
        ),
    ])
    .connect("start", "shape");

    let registry = NodeRegistry::with_builtins();
    let result = ExecutionEngine::from_registry(graph, &registry, EngineConfig::default())
        .unwrap()
        .with_trigger(TriggerInvocation {
            trigger_id: "start".to_string(),
            payload: json!({ "a": { "b": 5 } }),
        })
        .execute()
        .await;

    assert!(result.success, "{:?}", result.error);
    let output = result.result("shape").unwrap().data.clone().unwrap();
    assert_eq!(output[0]["json"]["message"], "value is 5");
    assert_eq!(output[0]["json"]["copy"], json!({ "b": 5 }));
}

#[tokio::test]
async fn test_from_registry_fails_fast_on_bad_parameters() {
    let graph = WorkflowGraph::new(vec![Node::new("shape", "set", json!({ "keepOnlySet": true }))]);
    let err = ExecutionEngine::from_registry(graph, &NodeRegistry::with_builtins(), EngineConfig::default())
        .unwrap_err();

    assert!(err.to_string().contains("Invalid parameter 'values'"));
}

#[tokio::test]
async fn test_logs_are_kept_below_minimum_level() {
    let graph = WorkflowGraph::new(vec![noop("a")]);
    let mut engine = ExecutionEngine::new(
        graph,
        EngineConfig {
            log_level: LogLevel::Error,
            ..EngineConfig::default()
        },
    );
    engine.register_node("a", Arc::new(NoOpNode));
    let result = engine.execute().await;

    assert!(result.logs.iter().any(|log| log.level == LogLevel::Debug));
    assert!(result.logs.iter().any(|log| log.node_id.as_deref() == Some("a")));
    assert!(result.logs.iter().all(|log| log.run_id == result.run_id));
}
