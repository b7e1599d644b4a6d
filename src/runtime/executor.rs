/// Node attempt execution with retry, timeout and backoff
///
/// Each attempt runs on its own spawned task and is raced against the per-attempt
/// timeout. Timeouts are soft by default: the engine stops waiting but the task keeps
/// running, so late side effects from a timed-out attempt can still land. With
/// `TimeoutMode::Abort` the task is aborted at its next await point instead.

use crate::config::{EngineConfig, TimeoutMode};
use crate::error::EngineError;
use crate::nodes::{InputItem, WorkflowNode};
use crate::runtime::logger::ExecutionLogger;
use crate::runtime::types::ExecutionContext;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Why a single attempt did not produce a value
#[derive(Debug)]
pub enum AttemptError {
    /// The work returned an error
    Failed(anyhow::Error),
    /// The timeout elapsed first
    TimedOut,
    /// The task panicked
    Panicked(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Failed(e) => write!(f, "{:#}", e),
            AttemptError::TimedOut => f.write_str("timed out"),
            AttemptError::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

/// Run `work` on a spawned task and wait at most `limit` for it
pub async fn run_attempt<T, F>(work: F, limit: Duration, mode: TimeoutMode) -> Result<T, AttemptError>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let mut handle = tokio::spawn(work);

    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(AttemptError::Failed(e)),
        Ok(Err(join_error)) => Err(AttemptError::Panicked(join_error.to_string())),
        Err(_) => {
            if mode == TimeoutMode::Abort {
                handle.abort();
            }
            Err(AttemptError::TimedOut)
        }
    }
}

/// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped at `max`
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let shift = attempt.saturating_sub(1).min(32);
    let delay = base_ms.saturating_mul(1u64 << shift);
    Duration::from_millis(delay.min(max_ms))
}

/// Outcome of all attempts for one node
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<Value, EngineError>,
    pub attempts: u32,
}

/// Executes nodes under the run's retry policy
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    config: Arc<EngineConfig>,
}

impl NodeExecutor {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Execute `node` until it succeeds or `max_retries` attempts are used up
    pub async fn execute_with_retry(
        &self,
        node: &Arc<dyn WorkflowNode>,
        items: Vec<InputItem>,
        context: &ExecutionContext,
        logger: &mut ExecutionLogger,
    ) -> RetryOutcome {
        let node_id = context.node_id.clone();
        let max_attempts = self.config.max_retries.max(1);
        let limit = Duration::from_millis(self.config.timeout_ms);
        let items = Arc::new(items);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            logger.debug(
                format!("🔄 Attempt {}/{} for node '{}'", attempt, max_attempts, node_id),
                Some(&node_id),
            );

            let work = {
                let node = Arc::clone(node);
                let items = Arc::clone(&items);
                let context = context.clone();
                async move { node.execute(&items, &context).await }
            };

            match run_attempt(work, limit, self.config.timeout_mode).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(AttemptError::TimedOut) => {
                    last_error = EngineError::AttemptTimeout {
                        node_id: node_id.clone(),
                        attempt,
                        timeout_ms: self.config.timeout_ms,
                    }
                    .to_string();
                }
                Err(other) => {
                    last_error = other.to_string();
                }
            }

            if attempt < max_attempts {
                let delay = backoff_delay(
                    attempt,
                    self.config.retry_base_delay_ms,
                    self.config.retry_max_delay_ms,
                );
                logger.warn(
                    format!(
                        "⚠️ Attempt {}/{} failed: {}. Retrying in {} ms",
                        attempt,
                        max_attempts,
                        last_error,
                        delay.as_millis()
                    ),
                    Some(&node_id),
                );
                tokio::time::sleep(delay).await;
            }
        }

        RetryOutcome {
            result: Err(EngineError::NodeExecution {
                node_id,
                attempts: max_attempts,
                message: last_error,
            }),
            attempts: max_attempts,
        }
    }
}
