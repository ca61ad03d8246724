//! In-process `RuntimeProvider` (C5, §4.5). Used for tests and for
//! single-node deployments that don't need a separate runtime process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::ports::{
    AgentConfig, AgentHandle, AgentHandleStatus, AgentMessage, AgentMetrics, HealthStatus,
    ListFilter, MessageStream, ProviderEvent, RuntimeProvider, SendOptions, StopOptions,
};

struct Instance {
    handle: AgentHandle,
    spawned_at: Instant,
    subscribers: Vec<mpsc::UnboundedSender<ProviderEvent>>,
    messages_sent: u64,
    messages_received: u64,
}

/// Agents never actually execute anything; `send` echoes an acknowledgement
/// reply unless a test has pre-seeded a response via `queue_reply`.
pub struct LocalRuntimeProvider {
    name: String,
    instances: DashMap<String, Instance>,
    queued_replies: Mutex<HashMap<String, Vec<AgentMessage>>>,
}

impl LocalRuntimeProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: DashMap::new(),
            queued_replies: Mutex::new(HashMap::new()),
        }
    }

    /// Test hook: the next `send(..., expect_response=true)` to `agent_id`
    /// returns this message instead of the default acknowledgement.
    pub async fn queue_reply(&self, agent_id: &str, reply: AgentMessage) {
        self.queued_replies
            .lock()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .push(reply);
    }

    fn emit(&self, agent_id: &str, event: ProviderEvent) {
        if let Some(mut instance) = self.instances.get_mut(agent_id) {
            instance
                .subscribers
                .retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

#[async_trait]
impl RuntimeProvider for LocalRuntimeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn spawn(&self, config: AgentConfig) -> ConclaveResult<AgentHandle> {
        let id = Uuid::new_v4().to_string();
        let handle = AgentHandle {
            id: id.clone(),
            status: AgentHandleStatus::Ready,
            endpoint: None,
            capabilities: config.capabilities,
            role: config.role_id,
        };
        self.instances.insert(
            id.clone(),
            Instance {
                handle: handle.clone(),
                spawned_at: Instant::now(),
                subscribers: Vec::new(),
                messages_sent: 0,
                messages_received: 0,
            },
        );
        self.emit(&id, ProviderEvent::AgentStarted { agent_id: id.clone() });
        self.emit(&id, ProviderEvent::AgentReady { agent_id: id.clone() });
        Ok(handle)
    }

    async fn stop(&self, id: &str, _opts: StopOptions) -> ConclaveResult<()> {
        if let Some((_, mut instance)) = self.instances.remove(id) {
            instance.handle.status = AgentHandleStatus::Stopped;
            self.emit(id, ProviderEvent::AgentStopped { agent_id: id.to_string() });
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> ConclaveResult<Option<AgentHandle>> {
        Ok(self.instances.get(id).map(|i| i.handle.clone()))
    }

    async fn list(&self, filter: ListFilter) -> ConclaveResult<Vec<AgentHandle>> {
        Ok(self
            .instances
            .iter()
            .map(|e| e.handle.clone())
            .filter(|h| filter.matches(h))
            .collect())
    }

    async fn send(
        &self,
        id: &str,
        message: Value,
        opts: SendOptions,
    ) -> ConclaveResult<Option<AgentMessage>> {
        if !self.instances.contains_key(id) {
            return Err(ConclaveError::AgentError(format!("unknown agent {id}")));
        }
        if let Some(mut instance) = self.instances.get_mut(id) {
            instance.messages_sent += 1;
        }
        if !opts.expect_response {
            return Ok(None);
        }
        let queued = self.queued_replies.lock().await.get_mut(id).and_then(|q| {
            if q.is_empty() {
                None
            } else {
                Some(q.remove(0))
            }
        });
        if let Some(mut instance) = self.instances.get_mut(id) {
            instance.messages_received += 1;
        }
        Ok(Some(queued.unwrap_or(AgentMessage {
            from: id.to_string(),
            to: None,
            body: serde_json::json!({"ack": message}),
            timestamp: Utc::now(),
        })))
    }

    async fn subscribe(&self, id: &str) -> ConclaveResult<MessageStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.instances
            .get_mut(id)
            .ok_or_else(|| ConclaveError::AgentError(format!("unknown agent {id}")))?
            .subscribers
            .push(tx);
        Ok(rx)
    }

    async fn logs(&self, _id: &str, _tail: Option<u32>) -> ConclaveResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn metrics(&self, id: &str) -> ConclaveResult<Option<AgentMetrics>> {
        Ok(self.instances.get(id).map(|i| AgentMetrics {
            messages_sent: i.messages_sent,
            messages_received: i.messages_received,
            uptime_secs: i.spawned_at.elapsed().as_secs(),
        }))
    }

    async fn health_check(&self) -> ConclaveResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: None,
        })
    }
}

pub fn provider() -> Arc<LocalRuntimeProvider> {
    Arc::new(LocalRuntimeProvider::new("local"))
}
