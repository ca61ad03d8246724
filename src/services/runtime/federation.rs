//! Runtime Federation (C6, §4.6) — a single virtual provider over N
//! registered providers, with health-weighted placement and per-agent
//! routing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::ports::{
    AgentConfig, AgentHandle, AgentMessage, AgentMetrics, HealthStatus, ListFilter, MessageStream,
    RuntimeProvider, SendOptions, StopOptions,
};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

struct Registration {
    provider: Arc<dyn RuntimeProvider>,
    priority: i32,
    healthy: Arc<AtomicBool>,
}

/// Process-wide: registration is append-only for the process lifetime
/// (§9 "Global mutable state"). The `agentId -> providerName` index is the
/// only field mutated after registration besides each provider's `healthy`
/// flag.
pub struct RuntimeFederation {
    providers: DashMap<String, Registration>,
    agent_index: DashMap<String, String>,
}

impl Default for RuntimeFederation {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeFederation {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
            agent_index: DashMap::new(),
        }
    }

    /// Registers a provider and starts its health-polling loop.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn RuntimeProvider>, priority: i32) {
        let name = name.into();
        let healthy = Arc::new(AtomicBool::new(true));
        self.providers.insert(
            name.clone(),
            Registration {
                provider: provider.clone(),
                priority,
                healthy: healthy.clone(),
            },
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            loop {
                interval.tick().await;
                let is_healthy = provider.health_check().await.map(|h| h.healthy).unwrap_or(false);
                let was_healthy = healthy.swap(is_healthy, Ordering::SeqCst);
                if was_healthy && !is_healthy {
                    warn!(provider = %name, "runtime provider became unhealthy");
                } else if !was_healthy && is_healthy {
                    info!(provider = %name, "runtime provider recovered");
                }
            }
        });
    }

    fn healthy_providers_by_priority(&self) -> Vec<(String, Arc<dyn RuntimeProvider>)> {
        let mut candidates: Vec<_> = self
            .providers
            .iter()
            .filter(|entry| entry.healthy.load(Ordering::SeqCst))
            .map(|entry| (entry.key().clone(), entry.priority, entry.provider.clone()))
            .collect();
        candidates.sort_by_key(|(_, priority, _)| *priority);
        candidates
            .into_iter()
            .map(|(name, _, provider)| (name, provider))
            .collect()
    }

    fn lookup(&self, id: &str) -> Option<Arc<dyn RuntimeProvider>> {
        let name = self.agent_index.get(id)?;
        self.providers.get(name.as_str()).map(|r| r.provider.clone())
    }

    pub async fn spawn(
        &self,
        config: AgentConfig,
        preferred_runtime: Option<&str>,
    ) -> ConclaveResult<AgentHandle> {
        if let Some(preferred) = preferred_runtime {
            if let Some(entry) = self.providers.get(preferred) {
                if entry.healthy.load(Ordering::SeqCst) {
                    let provider = entry.provider.clone();
                    drop(entry);
                    let handle = provider.spawn(config).await?;
                    self.agent_index.insert(handle.id.clone(), preferred.to_string());
                    return Ok(handle);
                }
            }
        }

        for (name, provider) in self.healthy_providers_by_priority() {
            if let Ok(handle) = provider.spawn(config.clone()).await {
                self.agent_index.insert(handle.id.clone(), name);
                return Ok(handle);
            }
        }
        Err(ConclaveError::NoHealthyRuntime)
    }

    pub async fn stop(&self, id: &str, opts: StopOptions) -> ConclaveResult<()> {
        if let Some(provider) = self.lookup(id) {
            return provider.stop(id, opts).await;
        }
        for (_, provider) in self.healthy_providers_by_priority() {
            if provider.stop(id, opts.clone()).await.is_ok() {
                return Ok(());
            }
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> ConclaveResult<Option<AgentHandle>> {
        if let Some(provider) = self.lookup(id) {
            return provider.get(id).await;
        }
        for (name, provider) in self.healthy_providers_by_priority() {
            if let Ok(Some(handle)) = provider.get(id).await {
                self.agent_index.insert(id.to_string(), name);
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    pub async fn list(&self, filter: ListFilter) -> ConclaveResult<Vec<AgentHandle>> {
        let mut all = Vec::new();
        for (name, provider) in self.healthy_providers_by_priority() {
            match provider.list(filter.clone()).await {
                Ok(handles) => all.extend(handles),
                Err(err) => warn!(provider = %name, error = %err, "list failed, skipping provider"),
            }
        }
        Ok(all)
    }

    pub async fn send(
        &self,
        id: &str,
        message: serde_json::Value,
        opts: SendOptions,
    ) -> ConclaveResult<Option<AgentMessage>> {
        let provider = self
            .lookup(id)
            .ok_or_else(|| ConclaveError::AgentError(format!("no owning provider for agent {id}")))?;
        provider.send(id, message, opts).await
    }

    pub async fn subscribe(&self, id: &str) -> ConclaveResult<MessageStream> {
        let provider = self
            .lookup(id)
            .ok_or_else(|| ConclaveError::AgentError(format!("no owning provider for agent {id}")))?;
        provider.subscribe(id).await
    }

    pub async fn logs(&self, id: &str, tail: Option<u32>) -> ConclaveResult<Vec<String>> {
        let provider = self
            .lookup(id)
            .ok_or_else(|| ConclaveError::AgentError(format!("no owning provider for agent {id}")))?;
        provider.logs(id, tail).await
    }

    pub async fn metrics(&self, id: &str) -> ConclaveResult<Option<AgentMetrics>> {
        let provider = self
            .lookup(id)
            .ok_or_else(|| ConclaveError::AgentError(format!("no owning provider for agent {id}")))?;
        provider.metrics(id).await
    }

    pub async fn health_check(&self) -> HealthStatus {
        let healthy = self.providers.iter().any(|r| r.healthy.load(Ordering::SeqCst));
        HealthStatus {
            healthy,
            message: (!healthy).then(|| "no healthy runtime providers".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::runtime::local_provider::LocalRuntimeProvider;
    use std::collections::HashSet;

    fn config(role: &str) -> AgentConfig {
        AgentConfig {
            role_id: role.to_string(),
            agent_type: "custom".to_string(),
            display_name: format!("{role} 1"),
            capabilities: HashSet::new(),
            config_override: None,
        }
    }

    #[tokio::test]
    async fn spawn_picks_lowest_priority_healthy_provider() {
        let federation = RuntimeFederation::new();
        federation.register("a", Arc::new(LocalRuntimeProvider::new("a")), 10);
        federation.register("b", Arc::new(LocalRuntimeProvider::new("b")), 1);
        let handle = federation.spawn(config("architect"), None).await.unwrap();
        assert_eq!(federation.lookup(&handle.id).map(|p| p.name().to_string()), Some("b".to_string()));
    }

    #[tokio::test]
    async fn spawn_fails_with_no_healthy_runtime_when_nothing_registered() {
        let federation = RuntimeFederation::new();
        let result = federation.spawn(config("architect"), None).await;
        assert!(matches!(result, Err(ConclaveError::NoHealthyRuntime)));
    }

    #[tokio::test]
    async fn stop_routes_through_owning_provider_index() {
        let federation = RuntimeFederation::new();
        federation.register("a", Arc::new(LocalRuntimeProvider::new("a")), 1);
        let handle = federation.spawn(config("architect"), None).await.unwrap();
        federation.stop(&handle.id, StopOptions::default()).await.unwrap();
        assert!(federation.get(&handle.id).await.unwrap().is_none());
    }
}
