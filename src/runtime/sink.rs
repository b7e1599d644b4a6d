/// Persistence/notification sink contract
///
/// The engine hands every finished run to a sink. Where results end up is up to the
/// embedding application; this module ships a tracing sink and an in-memory sink.

use crate::runtime::logger::ExecutionLog;
use crate::runtime::types::WorkflowExecutionResult;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn persist(&self, result: &WorkflowExecutionResult, logs: &[ExecutionLog]) -> Result<()>;
}

/// Writes a one-line summary of each run to tracing
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl ExecutionSink for TracingSink {
    async fn persist(&self, result: &WorkflowExecutionResult, logs: &[ExecutionLog]) -> Result<()> {
        let summary = &result.summary;
        if result.success {
            tracing::info!(
                run_id = %result.run_id,
                "📦 Run finished: {} completed, {} failed, {} skipped in {} ms ({} log entries)",
                summary.completed,
                summary.failed,
                summary.skipped,
                result.total_time_ms,
                logs.len()
            );
        } else {
            tracing::error!(
                run_id = %result.run_id,
                "📦 Run failed after {} ms: {}",
                result.total_time_ms,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }
}

/// Keeps every run in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    runs: Mutex<Vec<WorkflowExecutionResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn runs(&self) -> Vec<WorkflowExecutionResult> {
        self.runs.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.runs.lock().await.len()
    }
}

#[async_trait]
impl ExecutionSink for MemorySink {
    async fn persist(&self, result: &WorkflowExecutionResult, _logs: &[ExecutionLog]) -> Result<()> {
        self.runs.lock().await.push(result.clone());
        Ok(())
    }
}
