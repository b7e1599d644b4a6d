/// Trigger Subsystem
///
/// Long-lived sources that originate workflow executions:
/// - Generic lifecycle state machine and concurrent subscriber fan-out
/// - Trigger manager owning every trigger of a process
/// - Scheduled (cron-like) triggers backed by tokio-cron-scheduler
/// - HTTP webhook triggers, each owning its own axum listener
/// - Manual triggers fired programmatically

// Lifecycle base shared by every trigger kind
pub mod base;

// Registry of running triggers
pub mod manager;

// On-demand trigger
pub mod manual;

// Five-field schedule expressions
pub mod schedule;

// Time-based trigger
pub mod scheduled;

// Subscriber that runs a workflow per firing
pub mod subscriber;

// Config and status types
pub mod types;

// HTTP event trigger
pub mod webhook;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use base::{FnSubscriber, Trigger, TriggerBehavior, TriggerHandle, TriggerSubscriber};
pub use manager::TriggerManager;
pub use manual::ManualTrigger;
pub use schedule::ScheduleExpression;
pub use scheduled::ScheduledTrigger;
pub use subscriber::WorkflowSubscriber;
pub use types::{FireReport, TriggerConfig, TriggerState, TriggerStatus, TriggerTestResult};
pub use webhook::WebhookTrigger;

/// The trigger kinds this crate ships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Manual,
    Schedule,
    Webhook,
}

impl TriggerKind {
    /// Type tag of the workflow entry node that stands for this trigger
    pub fn node_type(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "manualTrigger",
            TriggerKind::Schedule => "scheduleTrigger",
            TriggerKind::Webhook => "webhookTrigger",
        }
    }

    pub fn from_node_type(node_type: &str) -> Option<Self> {
        match node_type {
            "manualTrigger" => Some(TriggerKind::Manual),
            "scheduleTrigger" => Some(TriggerKind::Schedule),
            "webhookTrigger" => Some(TriggerKind::Webhook),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Schedule => "schedule",
            TriggerKind::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

/// Build a stopped trigger of `kind`, validating `config` against it
pub fn create_trigger(kind: TriggerKind, config: TriggerConfig) -> Result<Trigger> {
    let behavior: Arc<dyn TriggerBehavior> = match kind {
        TriggerKind::Manual => Arc::new(ManualTrigger::new()),
        TriggerKind::Schedule => Arc::new(ScheduledTrigger::new()),
        TriggerKind::Webhook => Arc::new(WebhookTrigger::new()),
    };
    Trigger::new(config, behavior)
}
