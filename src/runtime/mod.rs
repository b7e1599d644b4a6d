/// Runtime Execution Engine
///
/// This module runs a resolved workflow graph:
/// - Single-use execution engine that walks the resolved order
/// - Per-attempt timeouts with exponential retry backoff
/// - Per-run execution logs mirrored to tracing
/// - Sinks that receive every finished run

// Core execution engine
pub mod engine;

// Retry/timeout handling for individual node attempts
pub mod executor;

// Per-run log list
pub mod logger;

// Persistence/notification sinks
pub mod sink;

// Context and result types
pub mod types;

// Re-export main types
pub use engine::ExecutionEngine;
pub use executor::{backoff_delay, NodeExecutor};
pub use logger::{ExecutionLog, ExecutionLogger, LogLevel};
pub use sink::{ExecutionSink, MemorySink, TracingSink};
pub use types::{
    ExecutionContext, ExecutionSummary, NodeExecutionResult, NodeStatus, TriggerInvocation,
    WorkflowExecutionResult,
};
