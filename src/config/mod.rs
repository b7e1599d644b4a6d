/// Configuration management for the flowforge engine
///
/// Handles server configuration, engine run policy and trigger defaults.
/// Every value has an ENV_VAR override so the binary can be configured in containers.

use crate::runtime::logger::LogLevel;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP configuration used by webhook triggers that don't set their own host/port
    pub server: ServerConfig,
    /// Run policy applied to every workflow execution
    pub engine: EngineConfig,
    /// Defaults for triggers created from a workflow file
    pub triggers: TriggerDefaults,
    /// Logging output
    pub logging: LoggingConfig,
    /// Optional workflow graph (JSON) loaded by the binary at startup
    pub workflow_file: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number
    pub port: u16,
}

/// What the engine does when the graph contains a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Warn and execute every node in declaration order
    #[default]
    Fallback,
    /// Warn and mark nodes that could not be ordered as skipped
    Skip,
    /// Fail the run before any node executes
    Fail,
}

/// What happens to an attempt that exceeds its timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutMode {
    /// Stop waiting; the work keeps running in the background
    #[default]
    Abandon,
    /// Stop waiting and abort the spawned task at its next await point
    Abort,
}

/// Per-run execution policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Attempts per node (including the first one)
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// Keep executing remaining nodes after a node exhausts its retries
    pub continue_on_failure: bool,
    /// Minimum level mirrored to tracing (all entries are kept in the result)
    pub log_level: LogLevel,
    /// First backoff delay; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Backoff cap
    pub retry_max_delay_ms: u64,
    pub cycle_policy: CyclePolicy,
    pub timeout_mode: TimeoutMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_ms: 300_000,
            continue_on_failure: false,
            log_level: LogLevel::Info,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 10_000,
            cycle_policy: CyclePolicy::Fallback,
            timeout_mode: TimeoutMode::Abandon,
        }
    }
}

/// Defaults applied to triggers created from workflow trigger nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerDefaults {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub retry_on_failure: bool,
    pub timeout_ms: u64,
}

impl Default for TriggerDefaults {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            retry_on_failure: true,
            timeout_ms: 30_000,
        }
    }
}

/// Logging output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Maximum level emitted by the tracing subscriber
    pub level: LogLevel,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let log_level = env_parse("FLOWFORGE_LOG", LogLevel::Info);

        Self {
            server: ServerConfig {
                host: std::env::var("FLOWFORGE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("FLOWFORGE_PORT", 5678),
            },
            engine: EngineConfig {
                max_retries: env_parse("FLOWFORGE_MAX_RETRIES", 3),
                timeout_ms: env_parse("FLOWFORGE_NODE_TIMEOUT_MS", 300_000),
                continue_on_failure: env_parse("FLOWFORGE_CONTINUE_ON_FAILURE", false),
                log_level,
                cycle_policy: std::env::var("FLOWFORGE_CYCLE_POLICY")
                    .ok()
                    .and_then(|v| serde_json::from_value(serde_json::Value::String(v.to_lowercase())).ok())
                    .unwrap_or_default(),
                ..EngineConfig::default()
            },
            triggers: TriggerDefaults::default(),
            logging: LoggingConfig { level: log_level },
            workflow_file: std::env::var("FLOWFORGE_WORKFLOW").ok(),
        }
    }
}

/// Read an env var and parse it, falling back to `default` when unset or malformed
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
