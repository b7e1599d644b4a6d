/// Trigger lifecycle base
///
/// `Trigger` owns the lifecycle state machine, the subscriber set and the fan-out
/// discipline. Kind-specific work (binding a listener, scheduling a timer) lives
/// behind [`TriggerBehavior`]; a behavior gets a [`TriggerHandle`] on start and fires
/// through it.
///
/// ```text
/// stopped --start()--> starting --> running | error
/// running --stop()---> stopping --> stopped | error
/// ```

use crate::config::TimeoutMode;
use crate::error::TriggerError;
use crate::runtime::executor::run_attempt;
use crate::runtime::types::TriggerInvocation;
use crate::triggers::types::{FireReport, TriggerConfig, TriggerState, TriggerStatus, TriggerTestResult};
use crate::triggers::TriggerKind;
use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Receives every accepted firing of a trigger
#[async_trait]
pub trait TriggerSubscriber: Send + Sync {
    async fn on_fire(&self, invocation: TriggerInvocation) -> Result<()>;
}

/// Subscriber backed by an async closure
pub struct FnSubscriber<F> {
    f: F,
}

impl<F, Fut> FnSubscriber<F>
where
    F: Fn(TriggerInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn shared(f: F) -> Arc<dyn TriggerSubscriber> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> TriggerSubscriber for FnSubscriber<F>
where
    F: Fn(TriggerInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn on_fire(&self, invocation: TriggerInvocation) -> Result<()> {
        (self.f)(invocation).await
    }
}

/// Kind-specific hooks driven by the lifecycle state machine
#[async_trait]
pub trait TriggerBehavior: Send + Sync {
    fn kind(&self) -> TriggerKind;

    /// Reject configs this kind can't run with
    fn validate(&self, config: &TriggerConfig) -> Result<()>;

    /// Acquire the external resource and start firing through `handle`
    async fn on_start(&self, config: &TriggerConfig, handle: TriggerHandle) -> Result<()>;

    /// Release the external resource
    async fn on_stop(&self) -> Result<()>;

    /// Dry run
    async fn on_test(&self, config: &TriggerConfig) -> Result<TriggerTestResult>;

    /// Bound address for kinds that own a listener
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// State shared between a trigger and the handles given to its behavior
struct TriggerCore {
    id: String,
    config: ArcSwap<TriggerConfig>,
    status: RwLock<TriggerStatus>,
    subscribers: RwLock<Vec<Arc<dyn TriggerSubscriber>>>,
}

impl TriggerCore {
    async fn fire(&self, payload: Value) -> FireReport {
        let config = self.config.load_full();
        {
            let mut status = self.status.write().await;
            if !config.enabled || status.state != TriggerState::Running {
                tracing::debug!(
                    trigger_id = %self.id,
                    "⏸️ Ignoring firing: trigger is {:?} (enabled: {})",
                    status.state,
                    config.enabled
                );
                return FireReport::ignored();
            }
            status.fire_count += 1;
            status.last_fired = Some(Utc::now());
        }

        let subscribers = self.subscribers.read().await.clone();
        let invocation = TriggerInvocation {
            trigger_id: self.id.clone(),
            payload,
        };
        tracing::info!(
            trigger_id = %self.id,
            "🔔 Trigger fired, dispatching to {} subscriber(s)",
            subscribers.len()
        );

        let outcomes = join_all(subscribers.iter().enumerate().map(|(index, subscriber)| {
            self.dispatch(index, Arc::clone(subscriber), invocation.clone(), &config)
        }))
        .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        FireReport {
            accepted: true,
            dispatched: subscribers.len(),
            succeeded,
            failed: subscribers.len() - succeeded,
        }
    }

    /// Deliver one invocation to one subscriber under the retry policy
    async fn dispatch(
        &self,
        index: usize,
        subscriber: Arc<dyn TriggerSubscriber>,
        invocation: TriggerInvocation,
        config: &TriggerConfig,
    ) -> bool {
        let max_attempts = if config.retry_on_failure {
            config.max_retries.max(1)
        } else {
            1
        };
        let limit = Duration::from_millis(config.timeout_ms);

        for attempt in 1..=max_attempts {
            let work = {
                let subscriber = Arc::clone(&subscriber);
                let invocation = invocation.clone();
                async move { subscriber.on_fire(invocation).await }
            };

            match run_attempt(work, limit, TimeoutMode::Abandon).await {
                Ok(()) => {
                    tracing::debug!(trigger_id = %self.id, "✅ Subscriber {} handled firing", index);
                    return true;
                }
                Err(e) => {
                    let message = format!("subscriber {} attempt {}/{}: {}", index, attempt, max_attempts, e);
                    {
                        let mut status = self.status.write().await;
                        status.error_count += 1;
                        status.last_error = Some(message.clone());
                    }
                    tracing::warn!(trigger_id = %self.id, "⚠️ Dispatch failed, {}", message);

                    if attempt < max_attempts {
                        let delay = config.retry_delay_ms.saturating_mul(u64::from(attempt));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        tracing::error!(
            trigger_id = %self.id,
            "❌ Subscriber {} gave up after {} attempt(s)",
            index,
            max_attempts
        );
        false
    }
}

/// Cloneable firing handle given to a behavior while it runs
#[derive(Clone)]
pub struct TriggerHandle {
    core: Arc<TriggerCore>,
}

impl TriggerHandle {
    pub fn trigger_id(&self) -> &str {
        &self.core.id
    }

    pub fn config(&self) -> Arc<TriggerConfig> {
        self.core.config.load_full()
    }

    /// Whether a firing right now would be dispatched
    pub async fn is_accepting(&self) -> bool {
        self.core.config.load().enabled && self.core.status.read().await.state == TriggerState::Running
    }

    pub async fn fire(&self, payload: Value) -> FireReport {
        self.core.fire(payload).await
    }
}

/// A long-lived trigger instance
pub struct Trigger {
    core: Arc<TriggerCore>,
    behavior: Arc<dyn TriggerBehavior>,
    /// Serialises lifecycle transitions
    transition: Mutex<()>,
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.core.id)
            .field("kind", &self.behavior.kind())
            .finish()
    }
}

impl Trigger {
    /// Create a stopped trigger after validating `config` against the behavior
    pub fn new(config: TriggerConfig, behavior: Arc<dyn TriggerBehavior>) -> Result<Self> {
        if config.id.trim().is_empty() {
            return Err(TriggerError::config("id", "must not be empty").into());
        }
        behavior.validate(&config)?;

        Ok(Self {
            core: Arc::new(TriggerCore {
                id: config.id.clone(),
                config: ArcSwap::from_pointee(config),
                status: RwLock::new(TriggerStatus::default()),
                subscribers: RwLock::new(Vec::new()),
            }),
            behavior,
            transition: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn kind(&self) -> TriggerKind {
        self.behavior.kind()
    }

    pub fn config(&self) -> Arc<TriggerConfig> {
        self.core.config.load_full()
    }

    pub fn handle(&self) -> TriggerHandle {
        TriggerHandle {
            core: Arc::clone(&self.core),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.behavior.local_addr()
    }

    pub async fn status(&self) -> TriggerStatus {
        self.core.status.read().await.clone()
    }

    pub async fn state(&self) -> TriggerState {
        self.core.status.read().await.state
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn TriggerSubscriber>) {
        self.core.subscribers.write().await.push(subscriber);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.core.subscribers.read().await.len()
    }

    /// Subscribe `subscriber`, then start
    pub async fn start_with(&self, subscriber: Arc<dyn TriggerSubscriber>) -> Result<()> {
        self.subscribe(subscriber).await;
        self.start().await
    }

    /// stopped/error -> starting -> running, or error if the start hook fails
    pub async fn start(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        self.start_locked().await
    }

    /// running/error -> stopping -> stopped (subscribers cleared), or error
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        self.stop_locked().await.map(|_| ())
    }

    /// Stop, wait `restart_delay_ms`, start again with every previous subscriber
    ///
    /// The transition lock is held throughout. Subscribers added while the trigger is
    /// down are kept after the restored ones.
    pub async fn restart(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        let count = self.subscriber_count().await;
        tracing::info!(trigger_id = %self.core.id, "🔄 Restarting trigger with {} subscriber(s)", count);

        let mut restored = self.stop_locked().await?;
        tokio::time::sleep(Duration::from_millis(self.core.config.load().restart_delay_ms)).await;

        {
            let mut subscribers = self.core.subscribers.write().await;
            restored.append(&mut subscribers);
            *subscribers = restored;
        }
        self.start_locked().await
    }

    /// Caller holds `transition`
    async fn start_locked(&self) -> Result<()> {
        let id = self.core.id.clone();

        {
            let mut status = self.core.status.write().await;
            if status.state == TriggerState::Running {
                return Err(TriggerError::lifecycle(&id, "already running").into());
            }
            status.state = TriggerState::Starting;
        }

        let config = self.core.config.load_full();
        tracing::info!(trigger_id = %id, kind = %self.kind(), "🚀 Starting trigger '{}'", config.name);

        match self.behavior.on_start(&config, self.handle()).await {
            Ok(()) => {
                let mut status = self.core.status.write().await;
                status.state = TriggerState::Running;
                status.started_at = Some(Utc::now());
                status.last_error = None;
                tracing::info!(trigger_id = %id, "✅ Trigger running");
                Ok(())
            }
            Err(e) => {
                let mut status = self.core.status.write().await;
                status.state = TriggerState::Error;
                status.last_error = Some(format!("{:#}", e));
                tracing::error!(trigger_id = %id, "❌ Trigger failed to start: {:#}", e);
                Err(e.context(TriggerError::lifecycle(&id, "start hook failed")))
            }
        }
    }

    /// Caller holds `transition`; returns the subscribers that were cleared
    async fn stop_locked(&self) -> Result<Vec<Arc<dyn TriggerSubscriber>>> {
        let id = self.core.id.clone();

        {
            let mut status = self.core.status.write().await;
            if status.state == TriggerState::Stopped {
                tracing::debug!(trigger_id = %id, "⏹️ Trigger already stopped");
                return Ok(Vec::new());
            }
            status.state = TriggerState::Stopping;
        }

        tracing::info!(trigger_id = %id, "⏹️ Stopping trigger");

        match self.behavior.on_stop().await {
            Ok(()) => {
                let cleared = std::mem::take(&mut *self.core.subscribers.write().await);
                let mut status = self.core.status.write().await;
                status.state = TriggerState::Stopped;
                status.stopped_at = Some(Utc::now());
                tracing::info!(trigger_id = %id, "✅ Trigger stopped");
                Ok(cleared)
            }
            Err(e) => {
                let mut status = self.core.status.write().await;
                status.state = TriggerState::Error;
                status.last_error = Some(format!("{:#}", e));
                tracing::error!(trigger_id = %id, "❌ Trigger failed to stop: {:#}", e);
                Err(e.context(TriggerError::lifecycle(&id, "stop hook failed")))
            }
        }
    }

    /// Dry run through the behavior; lifecycle state is left untouched
    pub async fn test(&self) -> TriggerTestResult {
        let config = self.core.config.load_full();
        match self.behavior.on_test(&config).await {
            Ok(result) => result,
            Err(e) => TriggerTestResult::failed(format!("{:#}", e)),
        }
    }

    /// Dispatch `payload` to every subscriber if enabled and running
    pub async fn fire(&self, payload: Value) -> FireReport {
        self.core.fire(payload).await
    }

    /// Validate and atomically swap the config; refused during a transition
    ///
    /// Resource settings (listener address, schedule) take effect on the next start.
    pub fn update_config(&self, config: TriggerConfig) -> Result<()> {
        let Ok(_guard) = self.transition.try_lock() else {
            return Err(TriggerError::lifecycle(&self.core.id, "cannot update config during a transition").into());
        };
        if config.id != self.core.id {
            return Err(TriggerError::config("id", "cannot be changed").into());
        }
        self.behavior.validate(&config)?;

        self.core.config.store(Arc::new(config));
        tracing::info!(trigger_id = %self.core.id, "🔧 Trigger config updated");
        Ok(())
    }
}
