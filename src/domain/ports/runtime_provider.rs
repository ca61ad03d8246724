//! Runtime Provider API (C5, §4.5) — the contract every concrete runtime
//! provider implements. The provider is unaware of workflows; it exposes
//! primitive lifecycle and I/O only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;

use crate::domain::errors::ConclaveResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role_id: String,
    pub agent_type: String,
    pub display_name: String,
    pub capabilities: HashSet<String>,
    pub config_override: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHandleStatus {
    Pending,
    Starting,
    Ready,
    Busy,
    Error,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHandle {
    pub id: String,
    pub status: AgentHandleStatus,
    pub endpoint: Option<String>,
    pub capabilities: HashSet<String>,
    pub role: String,
}

#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    pub force: bool,
    pub timeout: Option<std::time::Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<AgentHandleStatus>,
    pub agent_type: Option<String>,
    pub role: Option<String>,
    pub capabilities: HashSet<String>,
}

impl ListFilter {
    pub fn matches(&self, handle: &AgentHandle) -> bool {
        if let Some(status) = self.status {
            if handle.status != status {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if &handle.role != role {
                return false;
            }
        }
        self.capabilities.is_subset(&handle.capabilities)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub from: String,
    pub to: Option<String>,
    pub body: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub expect_response: bool,
    pub timeout: Option<std::time::Duration>,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub uptime_secs: u64,
}

/// Events a provider emits on its outbound stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProviderEvent {
    AgentStarted { agent_id: String },
    AgentReady { agent_id: String },
    AgentStopped { agent_id: String },
    AgentError { agent_id: String, error: String },
    Message { agent_id: String, message: AgentMessage },
    Question { agent_id: String, question: AgentMessage },
    LoginRequired { agent_id: String },
    BlockingPrompt { agent_id: String, prompt: String },
}

/// The unsubscribe handle MUST be released on all exit paths.
pub type MessageStream = mpsc::UnboundedReceiver<ProviderEvent>;

#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn spawn(&self, config: AgentConfig) -> ConclaveResult<AgentHandle>;

    /// Idempotent: stopping an already-stopped agent returns success.
    async fn stop(&self, id: &str, opts: StopOptions) -> ConclaveResult<()>;

    async fn get(&self, id: &str) -> ConclaveResult<Option<AgentHandle>>;

    async fn list(&self, filter: ListFilter) -> ConclaveResult<Vec<AgentHandle>>;

    /// At-most-once delivery; blocks until a reply or timeout when
    /// `expect_response` is set.
    async fn send(
        &self,
        id: &str,
        message: Value,
        opts: SendOptions,
    ) -> ConclaveResult<Option<AgentMessage>>;

    async fn subscribe(&self, id: &str) -> ConclaveResult<MessageStream>;

    async fn logs(&self, id: &str, tail: Option<u32>) -> ConclaveResult<Vec<String>>;

    async fn metrics(&self, id: &str) -> ConclaveResult<Option<AgentMetrics>>;

    async fn health_check(&self) -> ConclaveResult<HealthStatus>;
}
