/// Manual trigger
///
/// Owns no external resource. Firings come from `Trigger::fire`, which makes it the
/// entry point for on-demand and programmatic executions.

use crate::triggers::base::{TriggerBehavior, TriggerHandle};
use crate::triggers::types::{TriggerConfig, TriggerTestResult};
use crate::triggers::TriggerKind;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

#[derive(Debug, Clone, Default)]
pub struct ManualTrigger;

impl ManualTrigger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TriggerBehavior for ManualTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Manual
    }

    fn validate(&self, _config: &TriggerConfig) -> Result<()> {
        Ok(())
    }

    async fn on_start(&self, _config: &TriggerConfig, handle: TriggerHandle) -> Result<()> {
        tracing::debug!(trigger_id = %handle.trigger_id(), "🖐️ Manual trigger ready");
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    async fn on_test(&self, config: &TriggerConfig) -> Result<TriggerTestResult> {
        Ok(TriggerTestResult::ok(
            "Manual trigger fires on demand",
            json!({
                "triggerId": config.id,
                "timestamp": Utc::now().to_rfc3339(),
                "parameters": config.parameters,
            }),
        ))
    }
}
