/// Error taxonomy for the engine and trigger subsystem
///
/// Public APIs return `anyhow::Result`; these typed errors are wrapped inside and
/// can be recovered with `downcast_ref` when a caller needs to branch on the kind.

use thiserror::Error;

/// Errors raised while building or running a workflow
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node was constructed with a missing or malformed parameter
    #[error("Invalid parameter '{parameter}' for node type '{node_type}': {reason}")]
    ParameterValidation {
        node_type: String,
        parameter: String,
        reason: String,
    },

    /// A single attempt exceeded its time budget (retried like any other failure)
    #[error("Node '{node_id}' attempt {attempt} timed out after {timeout_ms} ms")]
    AttemptTimeout {
        node_id: String,
        attempt: u32,
        timeout_ms: u64,
    },

    /// A node kept failing after every allowed attempt
    #[error("Node '{node_id}' failed after {attempts} attempt(s): {message}")]
    NodeExecution {
        node_id: String,
        attempts: u32,
        message: String,
    },

    /// The graph contains at least one cycle and the cycle policy is `fail`
    #[error("Cycle detected between nodes: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    /// No node instance was registered for a graph node before running
    #[error("No node instance registered for '{0}'")]
    NodeNotRegistered(String),

    /// The registry has no constructor for this type tag
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Structural problem in the graph definition
    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),
}

impl EngineError {
    /// Shorthand for parameter validation failures raised by node constructors
    pub fn parameter(node_type: &str, parameter: &str, reason: impl Into<String>) -> Self {
        Self::ParameterValidation {
            node_type: node_type.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by trigger lifecycle transitions and trigger configuration
#[derive(Debug, Error)]
pub enum TriggerError {
    /// A start/stop transition failed or was requested from the wrong state
    #[error("Trigger '{trigger_id}' lifecycle error: {message}")]
    Lifecycle { trigger_id: String, message: String },

    /// Trigger parameters failed validation
    #[error("Invalid trigger configuration '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Schedule expression failed validation
    #[error("Invalid schedule expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// No trigger with this id is registered in the manager
    #[error("Trigger not found: {0}")]
    NotFound(String),

    /// A trigger with this id is already registered in the manager
    #[error("Trigger already registered: {0}")]
    AlreadyRegistered(String),

    /// The HTTP listener could not be bound
    #[error("Failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl TriggerError {
    pub fn lifecycle(trigger_id: &str, message: impl Into<String>) -> Self {
        Self::Lifecycle {
            trigger_id: trigger_id.to_string(),
            message: message.into(),
        }
    }

    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
