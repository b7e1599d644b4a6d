/// Trigger configuration and status types

use crate::config::TriggerDefaults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutable trigger configuration
///
/// Swapped atomically by `Trigger::update_config`. Kind-specific settings live in
/// `parameters` and are validated by the trigger kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerConfig {
    pub id: String,
    pub name: String,
    /// Disabled triggers ignore firings without changing lifecycle state
    pub enabled: bool,
    /// Attempts per subscriber dispatch (including the first one)
    pub max_retries: u32,
    /// Linear retry step: attempt `n` waits `retry_delay_ms * n`
    pub retry_delay_ms: u64,
    pub retry_on_failure: bool,
    /// Per-dispatch timeout
    pub timeout_ms: u64,
    /// Pause between stop and start in `restart()`
    pub restart_delay_ms: u64,
    pub parameters: Value,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            enabled: true,
            max_retries: 3,
            retry_delay_ms: 1_000,
            retry_on_failure: true,
            timeout_ms: 30_000,
            restart_delay_ms: 1_000,
            parameters: Value::Object(Default::default()),
        }
    }
}

impl TriggerConfig {
    pub fn new(id: impl Into<String>, parameters: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            parameters,
            ..Self::default()
        }
    }

    /// Config seeded from the process-wide trigger defaults
    pub fn from_defaults(id: &str, name: &str, parameters: Value, defaults: &TriggerDefaults) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay_ms,
            retry_on_failure: defaults.retry_on_failure,
            timeout_ms: defaults.timeout_ms,
            parameters,
            ..Self::default()
        }
    }
}

/// Lifecycle state of a trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

/// Snapshot of a trigger's lifecycle state and counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStatus {
    pub state: TriggerState,
    /// Accepted firings (monotonic)
    pub fire_count: u64,
    /// Failed or timed-out subscriber attempts
    pub error_count: u64,
    pub last_fired: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Result of a dry run; never changes lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerTestResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TriggerTestResult {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Outcome of one `fire()` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireReport {
    /// False when the trigger was disabled or not running
    pub accepted: bool,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl FireReport {
    pub fn ignored() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: TriggerConfig = serde_json::from_value(json!({
            "id": "nightly",
            "parameters": { "expression": "0 0 * * *" }
        }))
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1_000);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.parameters["expression"], "0 0 * * *");
    }
}
