/// Server setup and initialization
///
/// Wires together config, the node registry, the workflow graph and its triggers.
/// Each trigger entry node in the workflow file becomes a running trigger that executes
/// the whole graph per firing.

use crate::{
    config::Config,
    runtime::{
        engine::ExecutionEngine,
        logger::LogLevel,
        sink::{ExecutionSink, TracingSink},
    },
    triggers::{TriggerConfig, TriggerKind, TriggerManager, WorkflowSubscriber},
    workflow::{registry::NodeRegistry, types::WorkflowGraph},
};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

/// Initialize the tracing subscriber once per process
pub fn init_tracing(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_max_level(tracing::Level::from(level))
        .try_init();
}

/// Read and validate a workflow graph from a JSON file
pub fn load_workflow(path: &str) -> Result<WorkflowGraph> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read workflow file {}: {}", path, e))?;
    let graph: WorkflowGraph = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("Failed to parse workflow file {}: {}", path, e))?;
    graph.validate()?;

    tracing::info!(
        "📥 Loaded workflow {} with {} nodes",
        graph.id.as_deref().unwrap_or(path),
        graph.nodes.len()
    );
    Ok(graph)
}

/// Create one trigger per schedule/webhook entry node, each subscribed with a
/// workflow-running subscriber
///
/// Every node is instantiated once up front so bad parameters fail at startup.
pub async fn build_triggers(
    config: &Config,
    graph: Arc<WorkflowGraph>,
    registry: Arc<NodeRegistry>,
    sink: Arc<dyn ExecutionSink>,
) -> Result<TriggerManager> {
    registry.instantiate_graph(&graph)?;
    let manager = TriggerManager::new();

    for node in graph.nodes.iter().filter(|n| !n.disabled) {
        let Some(kind) = TriggerKind::from_node_type(&node.node_type) else {
            continue;
        };
        if kind == TriggerKind::Manual {
            tracing::debug!("⏭️ Manual trigger node '{}' only fires on demand", node.id);
            continue;
        }

        let mut parameters = node.parameters.clone();
        if kind == TriggerKind::Webhook {
            if let Some(params) = parameters.as_object_mut() {
                params.entry("host").or_insert_with(|| json!(config.server.host));
                params.entry("port").or_insert_with(|| json!(config.server.port));
            }
        }

        let name = if node.name.is_empty() { &node.id } else { &node.name };
        let trigger_config = TriggerConfig::from_defaults(&node.id, name, parameters, &config.triggers);
        let trigger = manager.create(kind, trigger_config).await?;

        trigger
            .subscribe(Arc::new(WorkflowSubscriber::new(
                Arc::clone(&graph),
                Arc::clone(&registry),
                config.engine.clone(),
                Arc::clone(&sink),
            )))
            .await;
    }

    Ok(manager)
}

/// Run the configured workflow until ctrl-c
///
/// A workflow without schedule or webhook triggers is executed once.
pub async fn start_server(config: Config) -> Result<()> {
    init_tracing(config.logging.level);
    tracing::info!("Starting flowforge...");

    let Some(path) = config.workflow_file.clone() else {
        tracing::warn!("⚠️ FLOWFORGE_WORKFLOW is not set; nothing to run");
        return Ok(());
    };

    let graph = Arc::new(load_workflow(&path)?);
    let registry = Arc::new(NodeRegistry::with_builtins());
    let sink: Arc<dyn ExecutionSink> = Arc::new(TracingSink);

    tracing::info!("🔗 Creating triggers");
    let manager = build_triggers(&config, Arc::clone(&graph), Arc::clone(&registry), Arc::clone(&sink)).await?;

    if manager.ids().await.is_empty() {
        tracing::info!("▶️ No schedule or webhook triggers; executing workflow once");
        let engine = ExecutionEngine::from_registry(graph, &registry, config.engine.clone())?;
        let result = engine.execute().await;
        sink.persist(&result, &result.logs).await?;
        if !result.success {
            anyhow::bail!(
                "Workflow execution failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        return Ok(());
    }

    if let Err(e) = manager.start_all().await {
        manager.stop_all().await.ok();
        return Err(e);
    }
    let running = manager.ids().await.len();
    tracing::info!("✅ {} trigger(s) running; press ctrl-c to stop", running);

    tokio::signal::ctrl_c().await?;
    tracing::info!("⏹️ Shutting down");
    manager.stop_all().await
}
