//! HTTP-backed `RuntimeProvider`. Talks to a provider process over a REST
//! API for agent lifecycle and messaging.
//!
//! The provider's event stream is a `WS /ws` endpoint; this dependency stack
//! carries no websocket client, so `subscribe` is implemented by polling
//! `GET /api/agents/:id` on a short interval and synthesizing transition
//! events from observed status changes (see DESIGN.md). A deployment that
//! needs true push delivery would add a websocket client here without
//! changing the `RuntimeProvider` contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::ports::{
    AgentConfig, AgentHandle, AgentHandleStatus, AgentMessage, AgentMetrics, HealthStatus,
    ListFilter, MessageStream, ProviderEvent, RuntimeProvider, SendOptions, StopOptions,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct HttpRuntimeProvider {
    name: String,
    base_url: String,
    client: Client,
}

impl HttpRuntimeProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn rpc_error(err: reqwest::Error) -> ConclaveError {
        ConclaveError::ProviderRpcFailed(err.to_string())
    }
}

#[async_trait]
impl RuntimeProvider for HttpRuntimeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn spawn(&self, config: AgentConfig) -> ConclaveResult<AgentHandle> {
        let response = self
            .client
            .post(self.url("/api/agents"))
            .json(&config)
            .send()
            .await
            .map_err(Self::rpc_error)?;
        if !response.status().is_success() {
            return Err(ConclaveError::ProviderRpcFailed(format!(
                "spawn failed with status {}",
                response.status()
            )));
        }
        response.json().await.map_err(Self::rpc_error)
    }

    async fn stop(&self, id: &str, opts: StopOptions) -> ConclaveResult<()> {
        let mut request = self.client.delete(self.url(&format!("/api/agents/{id}")));
        if opts.force {
            request = request.query(&[("force", "true")]);
        }
        if let Some(timeout) = opts.timeout {
            request = request.query(&[("timeout", timeout.as_millis().to_string())]);
        }
        let response = request.send().await.map_err(Self::rpc_error)?;
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(ConclaveError::ProviderRpcFailed(format!(
            "stop failed with status {}",
            response.status()
        )))
    }

    async fn get(&self, id: &str) -> ConclaveResult<Option<AgentHandle>> {
        let response = self
            .client
            .get(self.url(&format!("/api/agents/{id}")))
            .send()
            .await
            .map_err(Self::rpc_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.json().await.map_err(Self::rpc_error)?))
    }

    async fn list(&self, filter: ListFilter) -> ConclaveResult<Vec<AgentHandle>> {
        #[derive(serde::Deserialize)]
        struct ListResponse {
            agents: Vec<AgentHandle>,
        }
        let mut request = self.client.get(self.url("/api/agents"));
        if let Some(role) = &filter.role {
            request = request.query(&[("role", role.as_str())]);
        }
        if let Some(agent_type) = &filter.agent_type {
            request = request.query(&[("type", agent_type.as_str())]);
        }
        let response: ListResponse = request.send().await.map_err(Self::rpc_error)?.json().await.map_err(Self::rpc_error)?;
        Ok(response.agents.into_iter().filter(|h| filter.matches(h)).collect())
    }

    async fn send(
        &self,
        id: &str,
        message: Value,
        opts: SendOptions,
    ) -> ConclaveResult<Option<AgentMessage>> {
        #[derive(serde::Serialize)]
        struct SendBody {
            message: Value,
            expect_response: bool,
            timeout: Option<u64>,
        }
        #[derive(serde::Deserialize)]
        struct SendResponse {
            response: Option<AgentMessage>,
        }
        let mut request = self
            .client
            .post(self.url(&format!("/api/agents/{id}/send")))
            .json(&SendBody {
                message,
                expect_response: opts.expect_response,
                timeout: opts.timeout.map(|t| t.as_millis() as u64),
            });
        if let Some(timeout) = opts.timeout {
            request = request.timeout(timeout);
        }
        let response: SendResponse = request.send().await.map_err(Self::rpc_error)?.json().await.map_err(Self::rpc_error)?;
        Ok(response.response)
    }

    async fn subscribe(&self, id: &str) -> ConclaveResult<MessageStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.url(&format!("/api/agents/{id}"));
        let agent_id = id.to_string();
        tokio::spawn(async move {
            let mut last_status: Option<AgentHandleStatus> = None;
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let Ok(response) = client.get(&url).send().await else {
                    continue;
                };
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    if tx.send(ProviderEvent::AgentStopped { agent_id: agent_id.clone() }).is_err() {
                        return;
                    }
                    return;
                }
                let Ok(handle) = response.json::<AgentHandle>().await else {
                    continue;
                };
                if last_status != Some(handle.status) {
                    let event = match handle.status {
                        AgentHandleStatus::Ready => ProviderEvent::AgentReady { agent_id: agent_id.clone() },
                        AgentHandleStatus::Error => ProviderEvent::AgentError {
                            agent_id: agent_id.clone(),
                            error: "provider reported error status".to_string(),
                        },
                        AgentHandleStatus::Stopped => ProviderEvent::AgentStopped { agent_id: agent_id.clone() },
                        _ => {
                            last_status = Some(handle.status);
                            continue;
                        }
                    };
                    last_status = Some(handle.status);
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn logs(&self, id: &str, tail: Option<u32>) -> ConclaveResult<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct LogsResponse {
            logs: Vec<String>,
        }
        let mut request = self.client.get(self.url(&format!("/api/agents/{id}/logs")));
        if let Some(tail) = tail {
            request = request.query(&[("tail", tail)]);
        }
        let response: LogsResponse = request.send().await.map_err(Self::rpc_error)?.json().await.map_err(Self::rpc_error)?;
        Ok(response.logs)
    }

    async fn metrics(&self, id: &str) -> ConclaveResult<Option<AgentMetrics>> {
        let response = self
            .client
            .get(self.url(&format!("/api/agents/{id}/metrics")))
            .send()
            .await
            .map_err(Self::rpc_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.json().await.map_err(Self::rpc_error)?))
    }

    async fn health_check(&self) -> ConclaveResult<HealthStatus> {
        let response = self
            .client
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(Self::rpc_error)?;
        response.json().await.map_err(Self::rpc_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn spawn_posts_agent_config_and_parses_handle() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/agents")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "a1",
                    "status": "ready",
                    "endpoint": null,
                    "capabilities": [],
                    "role": "architect"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let provider = HttpRuntimeProvider::new("http", server.url());
        let handle = provider
            .spawn(AgentConfig {
                role_id: "architect".to_string(),
                agent_type: "custom".to_string(),
                display_name: "architect 1".to_string(),
                capabilities: HashSet::new(),
                config_override: None,
            })
            .await
            .unwrap();
        assert_eq!(handle.id, "a1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_on_missing_agent_returns_none() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/api/agents/ghost").with_status(404).create_async().await;
        let provider = HttpRuntimeProvider::new("http", server.url());
        assert!(provider.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_on_missing_agent_is_idempotent_success() {
        let mut server = mockito::Server::new_async().await;
        server.mock("DELETE", "/api/agents/ghost").with_status(404).create_async().await;
        let provider = HttpRuntimeProvider::new("http", server.url());
        assert!(provider.stop("ghost", StopOptions::default()).await.is_ok());
    }
}
