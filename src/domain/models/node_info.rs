//! Node liveness and lock value types (§3 NodeInfo, Lock).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub active_agents: u32,
    pub active_executions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub instance_id: String,
    pub hostname: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub is_leader: bool,
    pub status: NodeStatus,
    pub metrics: Option<NodeMetrics>,
}

impl NodeInfo {
    pub fn is_alive(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.last_heartbeat <= timeout
    }
}

/// The fencing token is globally unique per acquisition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lock {
    pub resource_key: String,
    pub fencing_token: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_is_alive_within_timeout() {
        let now = Utc::now();
        let node = NodeInfo {
            instance_id: "n1".into(),
            hostname: "h".into(),
            port: 8080,
            started_at: now,
            last_heartbeat: now - chrono::Duration::seconds(5),
            is_leader: false,
            status: NodeStatus::Healthy,
            metrics: None,
        };
        assert!(node.is_alive(now, chrono::Duration::seconds(15)));
    }

    #[test]
    fn node_is_dead_beyond_timeout() {
        let now = Utc::now();
        let node = NodeInfo {
            instance_id: "n1".into(),
            hostname: "h".into(),
            port: 8080,
            started_at: now,
            last_heartbeat: now - chrono::Duration::seconds(20),
            is_leader: false,
            status: NodeStatus::Healthy,
            metrics: None,
        };
        assert!(!node.is_alive(now, chrono::Duration::seconds(15)));
    }

    #[test]
    fn lock_expiry() {
        let now = Utc::now();
        let lock = Lock {
            resource_key: "r".into(),
            fencing_token: "t".into(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(10),
        };
        assert!(!lock.is_expired(now));
        assert!(lock.is_expired(now + chrono::Duration::seconds(11)));
    }
}
