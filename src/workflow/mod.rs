/// Workflow Definition Layer
///
/// This module handles workflow graphs and how they are turned into runnable nodes:
/// - Type definitions (WorkflowGraph, Node, ConnectionMap)
/// - Dependency resolution into an execution order
/// - Node type registry using ArcSwap for lock-free lookups

// Core workflow type definitions
pub mod types;

// Kahn's-algorithm execution order resolution
pub mod resolver;

// Node type registry
pub mod registry;

// Re-export commonly used types
pub use registry::NodeRegistry;
pub use resolver::{resolve_execution_order, Resolution};
pub use types::{Connection, ConnectionMap, ConnectionRef, Node, WorkflowGraph};
