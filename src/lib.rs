/// Flowforge: dependency-ordered workflow execution engine
///
/// This library resolves workflow graphs into an execution order, runs their nodes with
/// bounded retries and timeouts, and drives executions from long-lived triggers.

// Core configuration and setup
pub mod config;

// Error taxonomy
pub mod error;

// Workflow definition layer - graph types, order resolution and node registry
pub mod workflow;

// Node contract and built-in nodes
pub mod nodes;

// Runtime execution engine - retries, timeouts, logs and results
pub mod runtime;

// Trigger subsystem - lifecycle, manager, schedule and webhook triggers
pub mod triggers;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use config::{Config, CyclePolicy, EngineConfig, TimeoutMode};
pub use error::{EngineError, TriggerError};
pub use nodes::{InputItem, WorkflowNode};
pub use runtime::{ExecutionEngine, WorkflowExecutionResult};
pub use triggers::{Trigger, TriggerManager};
pub use workflow::{NodeRegistry, WorkflowGraph};
pub use server::start_server;
