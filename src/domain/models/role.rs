//! Role and org-structure value types (§3 Role, OrgStructure).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::domain::errors::{ConclaveError, ConclaveResult};

pub type RoleId = String;

/// A node in the organizational tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub agent_type: String,
    #[serde(default)]
    pub capabilities: HashSet<String>,
    pub reports_to: Option<RoleId>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default = "default_min_instances")]
    pub min_instances: u32,
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    #[serde(default)]
    pub expertise: HashSet<String>,
    #[serde(default)]
    pub agent_config_override: Option<serde_json::Value>,
}

const fn default_min_instances() -> u32 {
    1
}

const fn default_max_instances() -> u32 {
    1
}

impl Role {
    /// `singleton` implies `minInstances = maxInstances = 1`.
    pub fn normalized(mut self) -> Self {
        if self.singleton {
            self.min_instances = 1;
            self.max_instances = 1;
        }
        self
    }

    /// Number of agents to provision for this role at workflow start.
    pub fn provision_count(&self) -> u32 {
        if self.singleton {
            1
        } else {
            self.min_instances.max(1)
        }
    }
}

/// Escalation behavior when no routing rule matches an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationBehavior {
    RouteToReportsTo,
    Broadcast,
    SurfaceToUser,
}

/// What to do when an escalation's path exceeds `maxDepth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMaxDepth {
    SurfaceToUser,
    Fail,
    ReturnBestEffort,
}

/// An exact-match routing rule consulted before escalation defaults apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub from: Option<RoleId>,
    pub to: Option<RoleId>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub message_types: Vec<String>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub default_behavior: EscalationBehavior,
    pub timeout_ms: u64,
    pub max_depth: u32,
    pub on_max_depth: OnMaxDepth,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            default_behavior: EscalationBehavior::SurfaceToUser,
            timeout_ms: 30_000,
            max_depth: 5,
            on_max_depth: OnMaxDepth::SurfaceToUser,
        }
    }
}

/// Collection of roles plus optional routing rules and escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgStructure {
    pub roles: Vec<Role>,
    #[serde(default)]
    pub routing: Vec<RoutingRule>,
    #[serde(default)]
    pub escalation: EscalationPolicy,
}

impl OrgStructure {
    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Depth-first cycle detection over the `reportsTo` forest; also rejects
    /// chains whose depth exceeds `escalation.maxDepth`.
    pub fn validate(&self) -> ConclaveResult<()> {
        let by_id: HashMap<&str, &Role> =
            self.roles.iter().map(|r| (r.id.as_str(), r)).collect();

        for role in &self.roles {
            if let Some(parent) = &role.reports_to {
                if !by_id.contains_key(parent.as_str()) {
                    return Err(ConclaveError::UnknownRole(parent.clone()));
                }
            }
        }

        for role in &self.roles {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut cursor = role.id.as_str();
            let mut depth = 0u32;
            seen.insert(cursor);
            loop {
                let Some(current) = by_id.get(cursor) else {
                    break;
                };
                let Some(parent) = &current.reports_to else {
                    break;
                };
                depth += 1;
                if depth > self.escalation.max_depth {
                    return Err(ConclaveError::CyclicOrgStructure(role.id.clone()));
                }
                if !seen.insert(parent.as_str()) {
                    return Err(ConclaveError::CyclicOrgStructure(role.id.clone()));
                }
                cursor = parent.as_str();
            }
        }

        for role in &self.roles {
            if role.singleton && (role.min_instances != 1 || role.max_instances != 1) {
                return Err(ConclaveError::InvalidOrgStructure(format!(
                    "role {} is singleton but declares non-1 instance bounds",
                    role.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: &str, reports_to: Option<&str>) -> Role {
        Role {
            id: id.to_string(),
            agent_type: "custom".to_string(),
            capabilities: HashSet::new(),
            reports_to: reports_to.map(str::to_string),
            singleton: false,
            min_instances: 1,
            max_instances: 1,
            expertise: HashSet::new(),
            agent_config_override: None,
        }
    }

    #[test]
    fn accepts_acyclic_forest() {
        let structure = OrgStructure {
            roles: vec![role("architect", None), role("engineer", Some("architect"))],
            routing: vec![],
            escalation: EscalationPolicy::default(),
        };
        assert!(structure.validate().is_ok());
    }

    #[test]
    fn rejects_cycle() {
        let structure = OrgStructure {
            roles: vec![role("a", Some("b")), role("b", Some("a"))],
            routing: vec![],
            escalation: EscalationPolicy::default(),
        };
        assert!(matches!(
            structure.validate(),
            Err(ConclaveError::CyclicOrgStructure(_))
        ));
    }

    #[test]
    fn rejects_depth_beyond_max_depth() {
        let mut escalation = EscalationPolicy::default();
        escalation.max_depth = 1;
        let structure = OrgStructure {
            roles: vec![
                role("architect", None),
                role("tech_lead", Some("architect")),
                role("engineer", Some("tech_lead")),
            ],
            routing: vec![],
            escalation,
        };
        assert!(structure.validate().is_err());
    }

    #[test]
    fn rejects_unknown_reports_to() {
        let structure = OrgStructure {
            roles: vec![role("engineer", Some("ghost"))],
            routing: vec![],
            escalation: EscalationPolicy::default(),
        };
        assert!(matches!(
            structure.validate(),
            Err(ConclaveError::UnknownRole(_))
        ));
    }

    #[test]
    fn singleton_normalizes_instance_bounds() {
        let mut r = role("architect", None);
        r.singleton = true;
        r.min_instances = 5;
        r.max_instances = 5;
        let r = r.normalized();
        assert_eq!(r.min_instances, 1);
        assert_eq!(r.max_instances, 1);
    }
}
