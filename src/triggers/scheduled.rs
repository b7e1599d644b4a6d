/// Scheduled trigger
///
/// Runs a five-field schedule on tokio-cron-scheduler. The expression is handed to the
/// cron engine in six-field form; if the engine rejects it the trigger falls back to a
/// repeated job at the expression's approximate cadence.

use crate::error::TriggerError;
use crate::triggers::base::{TriggerBehavior, TriggerHandle};
use crate::triggers::schedule::ScheduleExpression;
use crate::triggers::types::{TriggerConfig, TriggerTestResult};
use crate::triggers::TriggerKind;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Kind-specific parameters
///
/// `{ "expression": "*/5 * * * *", "timezone": "Europe/Berlin" }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSettings {
    #[serde(alias = "schedule", alias = "cronExpression")]
    pub expression: String,
    /// Echoed in every payload; evaluation itself is UTC
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl ScheduleSettings {
    pub fn from_config(config: &TriggerConfig) -> Result<Self> {
        let settings: Self = serde_json::from_value(config.parameters.clone())
            .map_err(|e| TriggerError::config("parameters", e.to_string()))?;
        ScheduleExpression::validate(&settings.expression)?;
        Ok(settings)
    }
}

/// Time-based trigger behavior
#[derive(Default)]
pub struct ScheduledTrigger {
    scheduler: Mutex<Option<JobScheduler>>,
}

impl ScheduledTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort next fire time for `config`'s expression
    pub fn next_fire_time(config: &TriggerConfig) -> Result<Option<DateTime<Utc>>> {
        let settings = ScheduleSettings::from_config(config)?;
        Ok(ScheduleExpression::parse(&settings.expression)?.next_fire_after(Utc::now()))
    }

    /// Human-readable description of `config`'s expression
    pub fn describe(config: &TriggerConfig) -> Result<String> {
        let settings = ScheduleSettings::from_config(config)?;
        Ok(ScheduleExpression::parse(&settings.expression)?.describe())
    }
}

/// The payload of one tick
fn tick_payload(settings: &ScheduleSettings) -> Value {
    json!({
        "scheduleExpression": settings.expression,
        "timezone": settings.timezone,
        "scheduledTime": Utc::now().to_rfc3339(),
    })
}

type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Fire the trigger once for a schedule tick
fn tick(handle: &TriggerHandle, settings: &ScheduleSettings) -> TickFuture {
    let handle = handle.clone();
    let payload = tick_payload(settings);

    Box::pin(async move {
        tracing::debug!(trigger_id = %handle.trigger_id(), "🔔 Schedule tick");
        let report = handle.fire(payload).await;
        if report.accepted && report.failed > 0 {
            tracing::warn!(
                trigger_id = %handle.trigger_id(),
                "⚠️ {} of {} subscriber(s) failed on scheduled run",
                report.failed,
                report.dispatched
            );
        }
    })
}

#[async_trait]
impl TriggerBehavior for ScheduledTrigger {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Schedule
    }

    fn validate(&self, config: &TriggerConfig) -> Result<()> {
        ScheduleSettings::from_config(config).map(|_| ())
    }

    async fn on_start(&self, config: &TriggerConfig, handle: TriggerHandle) -> Result<()> {
        let settings = ScheduleSettings::from_config(config)?;
        let expression = ScheduleExpression::parse(&settings.expression)?;
        let cron = expression.to_cron6();

        let scheduler = JobScheduler::new().await?;

        let (cron_handle, cron_settings) = (handle.clone(), settings.clone());
        let job = match Job::new_async(cron.as_str(), move |_uuid, _l| tick(&cron_handle, &cron_settings)) {
            Ok(job) => {
                tracing::info!(
                    trigger_id = %handle.trigger_id(),
                    "⏰ Scheduled '{}' ({}) in {}",
                    expression,
                    expression.describe(),
                    settings.timezone
                );
                job
            }
            Err(e) => {
                let interval = expression.approximate_interval();
                tracing::warn!(
                    trigger_id = %handle.trigger_id(),
                    "⚠️ Cron engine rejected '{}' ({}); falling back to a tick every {} s",
                    cron,
                    e,
                    interval.as_secs()
                );
                let (interval_handle, interval_settings) = (handle.clone(), settings.clone());
                Job::new_repeated_async(interval, move |_uuid, _l| tick(&interval_handle, &interval_settings))?
            }
        };

        let job_uuid = scheduler.add(job).await?;
        scheduler.start().await?;
        tracing::debug!(trigger_id = %handle.trigger_id(), "📝 Tracked schedule job {}", job_uuid);

        *self.scheduler.lock().await = Some(scheduler);
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler.shutdown().await?;
        }
        Ok(())
    }

    async fn on_test(&self, config: &TriggerConfig) -> Result<TriggerTestResult> {
        let settings = ScheduleSettings::from_config(config)?;
        let expression = ScheduleExpression::parse(&settings.expression)?;
        let mut data = tick_payload(&settings);
        data["description"] = json!(expression.describe());
        data["nextFireTime"] = json!(expression.next_fire_after(Utc::now()).map(|t| t.to_rfc3339()));

        Ok(TriggerTestResult::ok(
            format!("Schedule '{}' is valid: {}", expression, expression.describe()),
            data,
        ))
    }
}
