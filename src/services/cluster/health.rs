//! Cluster Health (C4, §4.4) — per-node heartbeat and quorum view.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::ConclaveResult;
use crate::domain::models::{NodeInfo, NodeMetrics, NodeStatus};
use crate::services::cluster::consensus::ConsensusClient;
use crate::services::cluster::state_bus::StateBus;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HeartbeatRow {
    instance_id: String,
    hostname: String,
    port: u16,
    started_at: chrono::DateTime<Utc>,
    last_heartbeat: chrono::DateTime<Utc>,
    is_leader: bool,
    metrics: Option<NodeMetrics>,
}

pub struct ClusterHealth {
    state: Arc<StateBus>,
    consensus: Arc<ConsensusClient>,
    instance_id: String,
    hostname: String,
    port: u16,
    started_at: chrono::DateTime<Utc>,
    heartbeat_interval: Duration,
    health_timeout: Duration,
}

impl ClusterHealth {
    pub fn new(
        state: Arc<StateBus>,
        consensus: Arc<ConsensusClient>,
        instance_id: impl Into<String>,
        hostname: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            state,
            consensus,
            instance_id: instance_id.into(),
            hostname: hostname.into(),
            port,
            started_at: Utc::now(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_intervals(mut self, heartbeat_interval: Duration, health_timeout: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self.health_timeout = health_timeout;
        self
    }

    /// Spawns the heartbeat-writing loop; runs for the process lifetime.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.heartbeat_interval);
            loop {
                interval.tick().await;
                if let Err(err) = this.write_heartbeat(None).await {
                    debug!(error = %err, "heartbeat write failed");
                }
            }
        });
    }

    async fn write_heartbeat(&self, metrics: Option<NodeMetrics>) -> ConclaveResult<()> {
        let row = HeartbeatRow {
            instance_id: self.instance_id.clone(),
            hostname: self.hostname.clone(),
            port: self.port,
            started_at: self.started_at,
            last_heartbeat: Utc::now(),
            is_leader: self.consensus.is_leader(),
            metrics,
        };
        self.state
            .set(
                &format!("node:{}", self.instance_id),
                serde_json::to_value(&row)?,
                Some(self.health_timeout * 2),
            )
            .await
    }

    /// Every live node under `node:*`, classified by `now - lastHeartbeat`.
    pub async fn nodes(&self) -> ConclaveResult<Vec<NodeInfo>> {
        let now = Utc::now();
        let keys = self.state.keys("node:*").await?;
        let mut nodes = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(value) = self.state.get(&key).await? else {
                continue;
            };
            let Ok(row) = serde_json::from_value::<HeartbeatRow>(value) else {
                continue;
            };
            let timeout = chrono::Duration::from_std(self.health_timeout).unwrap_or_default();
            let status = if now - row.last_heartbeat <= timeout {
                NodeStatus::Healthy
            } else {
                NodeStatus::Unhealthy
            };
            nodes.push(NodeInfo {
                instance_id: row.instance_id,
                hostname: row.hostname,
                port: row.port,
                started_at: row.started_at,
                last_heartbeat: row.last_heartbeat,
                is_leader: row.is_leader,
                status,
                metrics: row.metrics,
            });
        }
        Ok(nodes)
    }

    pub async fn healthy_count(&self) -> ConclaveResult<usize> {
        Ok(self
            .nodes()
            .await?
            .into_iter()
            .filter(|n| n.status == NodeStatus::Healthy)
            .count())
    }

    pub async fn has_quorum(&self, min: usize) -> ConclaveResult<bool> {
        Ok(self.healthy_count().await? >= min && self.consensus.leader_id().await.is_some())
    }
}
