/// Trigger manager
///
/// Owns every trigger of a process behind an async `RwLock`. The map lock is never held
/// across a lifecycle transition; triggers are cloned out as `Arc`s first.

use crate::error::TriggerError;
use crate::triggers::base::Trigger;
use crate::triggers::types::{TriggerConfig, TriggerState, TriggerStatus, TriggerTestResult};
use crate::triggers::{create_trigger, TriggerKind};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct TriggerManager {
    triggers: RwLock<HashMap<String, Arc<Trigger>>>,
}

impl TriggerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an already built trigger
    pub async fn register(&self, trigger: Trigger) -> Result<Arc<Trigger>> {
        let mut triggers = self.triggers.write().await;
        if triggers.contains_key(trigger.id()) {
            return Err(TriggerError::AlreadyRegistered(trigger.id().to_string()).into());
        }

        let trigger = Arc::new(trigger);
        triggers.insert(trigger.id().to_string(), Arc::clone(&trigger));
        tracing::info!(trigger_id = %trigger.id(), kind = %trigger.kind(), "📌 Registered trigger");
        Ok(trigger)
    }

    /// Build and register a trigger of `kind`
    pub async fn create(&self, kind: TriggerKind, config: TriggerConfig) -> Result<Arc<Trigger>> {
        let trigger = create_trigger(kind, config)?;
        self.register(trigger).await
    }

    /// Stop (if needed) and drop a trigger
    pub async fn remove(&self, id: &str) -> Result<()> {
        let trigger = self.require(id).await?;
        if trigger.state().await != TriggerState::Stopped {
            trigger.stop().await?;
        }

        self.triggers.write().await.remove(id);
        tracing::info!(trigger_id = %id, "🗑️ Removed trigger");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Trigger>> {
        self.triggers.read().await.get(id).cloned()
    }

    /// Registered ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.triggers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn start(&self, id: &str) -> Result<()> {
        self.require(id).await?.start().await
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        self.require(id).await?.stop().await
    }

    pub async fn restart(&self, id: &str) -> Result<()> {
        self.require(id).await?.restart().await
    }

    pub async fn test(&self, id: &str) -> Result<TriggerTestResult> {
        Ok(self.require(id).await?.test().await)
    }

    /// Start every registered trigger, returning the first failure after trying all
    pub async fn start_all(&self) -> Result<()> {
        self.for_each("start", |trigger| async move { trigger.start().await }).await
    }

    /// Stop every registered trigger, returning the first failure after trying all
    pub async fn stop_all(&self) -> Result<()> {
        self.for_each("stop", |trigger| async move { trigger.stop().await }).await
    }

    /// Status of every trigger keyed by id
    pub async fn statuses(&self) -> BTreeMap<String, TriggerStatus> {
        let triggers = self.snapshot().await;
        let mut statuses = BTreeMap::new();
        for trigger in triggers {
            statuses.insert(trigger.id().to_string(), trigger.status().await);
        }
        statuses
    }

    async fn require(&self, id: &str) -> Result<Arc<Trigger>> {
        self.get(id)
            .await
            .ok_or_else(|| TriggerError::NotFound(id.to_string()).into())
    }

    async fn snapshot(&self) -> Vec<Arc<Trigger>> {
        self.triggers.read().await.values().cloned().collect()
    }

    async fn for_each<F, Fut>(&self, action: &str, f: F) -> Result<()>
    where
        F: Fn(Arc<Trigger>) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let mut first_error = None;
        for trigger in self.snapshot().await {
            let id = trigger.id().to_string();
            if let Err(e) = f(trigger).await {
                tracing::error!(trigger_id = %id, "❌ Failed to {} trigger: {:#}", action, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
