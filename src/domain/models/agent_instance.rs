//! Agent instance and execution-context value types (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::role::RoleId;
use super::workflow::OrgPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Starting,
    Authenticating,
    Ready,
    Busy,
    Waiting,
    Error,
    Stopping,
    Stopped,
}

/// Owned exclusively by the execution context that spawned it; destroyed on
/// workflow end or explicit stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: String,
    pub role_id: RoleId,
    pub endpoint: Option<String>,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub provider_name: String,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl AgentInstance {
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Initializing,
    Running,
    Waiting,
    Completed,
    Failed,
}

/// Lifetime spans exactly one workflow invocation; cross-workflow sharing
/// of an `ExecutionContext` is forbidden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub id: Uuid,
    pub pattern: OrgPattern,
    pub agents: HashMap<String, AgentInstance>,
    pub role_assignments: HashMap<RoleId, Vec<String>>,
    pub state: ExecutionState,
    pub variables: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub current_step_index: usize,
}

impl ExecutionContext {
    pub fn new(pattern: OrgPattern, input: serde_json::Value) -> Self {
        let mut variables = HashMap::new();
        variables.insert("input".to_string(), input);
        Self {
            id: Uuid::new_v4(),
            pattern,
            agents: HashMap::new(),
            role_assignments: HashMap::new(),
            state: ExecutionState::Initializing,
            variables,
            started_at: Utc::now(),
            current_step_index: 0,
        }
    }

    pub fn agents_for_role(&self, role: &str) -> Vec<&AgentInstance> {
        self.role_assignments
            .get(role)
            .into_iter()
            .flatten()
            .filter_map(|id| self.agents.get(id))
            .collect()
    }

    pub fn first_agent_for_role(&self, role: &str) -> Option<&AgentInstance> {
        self.agents_for_role(role).into_iter().next()
    }
}
