//! Message Router (C7, §4.7) — routes peer messages and questions up the
//! org hierarchy, bounded by `maxDepth`.

use serde_json::Value;

use crate::domain::models::{AgentInstance, EscalationBehavior, ExecutionContext, OnMaxDepth, RoleId};

#[derive(Debug, Clone)]
pub enum RouterAction {
    SendQuestion {
        to_agent_id: String,
        question: Value,
        escalation_path: Vec<RoleId>,
    },
    SendAnswer {
        to_agent_id: String,
        answer: Value,
    },
    /// Fan-out delivery to every instance of a role, e.g. `broadcast` escalation.
    Broadcast {
        to_agent_ids: Vec<String>,
        message: Value,
    },
    SurfaceToUser {
        question: Value,
        reason: String,
    },
    /// The `fail` max-depth policy: escalation is abandoned and the caller
    /// must treat the message as failed rather than surfaced or answered.
    Fail {
        question: Value,
        reason: String,
    },
    /// The `return_best_effort` max-depth policy: escalation stops here and
    /// the message is resolved without further routing or a user prompt.
    ReturnBestEffort {
        question: Value,
        reason: String,
    },
}

pub struct MessageRouter;

impl MessageRouter {
    /// Routes one inbound message from `from_role`, first by exact-match
    /// routing rules, then by `escalation.defaultBehavior`.
    pub fn route(
        ctx: &ExecutionContext,
        from_role: &RoleId,
        message: Value,
        message_type: &str,
        topic: Option<&str>,
        mut escalation_path: Vec<RoleId>,
    ) -> RouterAction {
        let structure = &ctx.pattern.structure;

        if let Some(rule) = structure
            .routing
            .iter()
            .filter(|r| {
                r.from.as_deref().is_none_or(|f| f == from_role)
                    && (r.topics.is_empty() || topic.is_some_and(|t| r.topics.iter().any(|x| x == t)))
                    && (r.message_types.is_empty() || r.message_types.iter().any(|m| m == message_type))
            })
            .max_by_key(|r| r.priority)
        {
            if let Some(to_role) = &rule.to {
                return match ctx.first_agent_for_role(to_role) {
                    Some(agent) => RouterAction::SendQuestion {
                        to_agent_id: agent.id.clone(),
                        question: message,
                        escalation_path,
                    },
                    None => RouterAction::SurfaceToUser {
                        question: message,
                        reason: format!("routing rule target role {to_role} has no agent"),
                    },
                };
            }
        }

        match structure.escalation.default_behavior {
            EscalationBehavior::RouteToReportsTo => {
                Self::route_to_reports_to(ctx, from_role, message, &mut escalation_path)
            }
            EscalationBehavior::Broadcast => Self::broadcast(ctx, from_role, message),
            EscalationBehavior::SurfaceToUser => RouterAction::SurfaceToUser {
                question: message,
                reason: "escalation.defaultBehavior = surface_to_user".to_string(),
            },
        }
    }

    fn route_to_reports_to(
        ctx: &ExecutionContext,
        from_role: &RoleId,
        message: Value,
        escalation_path: &mut Vec<RoleId>,
    ) -> RouterAction {
        let structure = &ctx.pattern.structure;
        let Some(role) = structure.role(from_role) else {
            return RouterAction::SurfaceToUser {
                question: message,
                reason: format!("unknown role {from_role}"),
            };
        };
        let Some(manager_role) = &role.reports_to else {
            return RouterAction::SurfaceToUser {
                question: message,
                reason: format!("role {from_role} is a root; nowhere to escalate"),
            };
        };

        escalation_path.push(from_role.clone());
        if escalation_path.len() as u32 > structure.escalation.max_depth {
            return Self::on_max_depth(structure.escalation.on_max_depth, message);
        }

        match ctx.first_agent_for_role(manager_role) {
            Some(agent) => RouterAction::SendQuestion {
                to_agent_id: agent.id.clone(),
                question: message,
                escalation_path: escalation_path.clone(),
            },
            None => RouterAction::SurfaceToUser {
                question: message,
                reason: format!("reportsTo role {manager_role} has no live agent"),
            },
        }
    }

    /// Delivers to every instance of the source role's manager (or of the
    /// source role itself when it has no manager). A literal "deliver to
    /// every instance of the target role" needs a target; for default
    /// (rule-free) escalation, the manager role is the natural target.
    fn broadcast(ctx: &ExecutionContext, from_role: &RoleId, message: Value) -> RouterAction {
        let structure = &ctx.pattern.structure;
        let target_role = structure
            .role(from_role)
            .and_then(|r| r.reports_to.clone())
            .unwrap_or_else(|| from_role.clone());
        let recipients: Vec<&AgentInstance> = ctx.agents_for_role(&target_role);
        if recipients.is_empty() {
            return RouterAction::SurfaceToUser {
                question: message,
                reason: format!("broadcast target role {target_role} has no live agents"),
            };
        }
        RouterAction::Broadcast {
            to_agent_ids: recipients.into_iter().map(|a| a.id.clone()).collect(),
            message,
        }
    }

    fn on_max_depth(policy: OnMaxDepth, message: Value) -> RouterAction {
        match policy {
            OnMaxDepth::SurfaceToUser => RouterAction::SurfaceToUser {
                question: message,
                reason: "escalation exceeded maxDepth".to_string(),
            },
            OnMaxDepth::Fail => RouterAction::Fail {
                question: message,
                reason: "escalation exceeded maxDepth (fail policy)".to_string(),
            },
            OnMaxDepth::ReturnBestEffort => RouterAction::ReturnBestEffort {
                question: message,
                reason: "escalation exceeded maxDepth (best-effort policy)".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AgentInstance, AgentStatus, EscalationPolicy, OrgPattern, OrgStructure, Role, Workflow,
    };
    use chrono::Utc;
    use std::collections::HashSet;

    fn role(id: &str, reports_to: Option<&str>) -> Role {
        Role {
            id: id.to_string(),
            agent_type: "custom".to_string(),
            capabilities: HashSet::new(),
            reports_to: reports_to.map(str::to_string),
            singleton: true,
            min_instances: 1,
            max_instances: 1,
            expertise: HashSet::new(),
            agent_config_override: None,
        }
    }

    fn context_with(structure: OrgStructure) -> ExecutionContext {
        let pattern = OrgPattern {
            name: "p".into(),
            version: "1".into(),
            structure,
            workflow: Workflow { steps: vec![], output: None },
        };
        let mut ctx = ExecutionContext::new(pattern, serde_json::json!({}));
        for role_id in ["architect", "tech_lead", "engineer"] {
            let agent = AgentInstance {
                id: format!("{role_id}-1"),
                role_id: role_id.to_string(),
                endpoint: None,
                status: AgentStatus::Ready,
                current_task: None,
                provider_name: "local".into(),
                started_at: Utc::now(),
                last_activity_at: Utc::now(),
            };
            ctx.agents.insert(agent.id.clone(), agent);
            ctx.role_assignments.insert(role_id.to_string(), vec![format!("{role_id}-1")]);
        }
        ctx
    }

    #[test]
    fn root_role_with_no_manager_surfaces_to_user() {
        let structure = OrgStructure {
            roles: vec![role("architect", None)],
            routing: vec![],
            escalation: EscalationPolicy::default(),
        };
        let ctx = context_with(structure);
        let action = MessageRouter::route(
            &ctx,
            &"architect".to_string(),
            serde_json::json!("q"),
            "question",
            None,
            vec![],
        );
        assert!(matches!(action, RouterAction::SurfaceToUser { .. }));
    }

    #[test]
    fn escalates_to_reports_to_manager() {
        let mut escalation = EscalationPolicy::default();
        escalation.default_behavior = EscalationBehavior::RouteToReportsTo;
        let structure = OrgStructure {
            roles: vec![role("architect", None), role("tech_lead", Some("architect")), role("engineer", Some("tech_lead"))],
            routing: vec![],
            escalation,
        };
        let ctx = context_with(structure);
        let action = MessageRouter::route(
            &ctx,
            &"engineer".to_string(),
            serde_json::json!("need auth library choice?"),
            "question",
            None,
            vec![],
        );
        assert!(matches!(action, RouterAction::SendQuestion { to_agent_id, .. } if to_agent_id == "tech_lead-1"));
    }

    #[test]
    fn broadcast_delivers_to_every_instance_of_the_target_role() {
        let mut escalation = EscalationPolicy::default();
        escalation.default_behavior = EscalationBehavior::Broadcast;
        let structure = OrgStructure {
            roles: vec![role("architect", None), role("engineer", Some("architect"))],
            routing: vec![],
            escalation,
        };
        let mut ctx = context_with(structure);
        let second = AgentInstance {
            id: "architect-2".to_string(),
            role_id: "architect".to_string(),
            endpoint: None,
            status: AgentStatus::Ready,
            current_task: None,
            provider_name: "local".into(),
            started_at: Utc::now(),
            last_activity_at: Utc::now(),
        };
        ctx.agents.insert(second.id.clone(), second);
        ctx.role_assignments
            .entry("architect".to_string())
            .or_default()
            .push("architect-2".to_string());

        let action = MessageRouter::route(
            &ctx,
            &"engineer".to_string(),
            serde_json::json!("q"),
            "question",
            None,
            vec![],
        );
        match action {
            RouterAction::Broadcast { to_agent_ids, .. } => {
                let mut ids = to_agent_ids;
                ids.sort();
                assert_eq!(ids, vec!["architect-1".to_string(), "architect-2".to_string()]);
            }
            other => panic!("expected Broadcast, got {other:?}"),
        }
    }

    #[test]
    fn on_max_depth_fail_policy_produces_fail_action() {
        let message = serde_json::json!("q");
        let action = MessageRouter::on_max_depth(OnMaxDepth::Fail, message);
        assert!(matches!(action, RouterAction::Fail { .. }));
    }

    #[test]
    fn on_max_depth_return_best_effort_policy_produces_best_effort_action() {
        let message = serde_json::json!("q");
        let action = MessageRouter::on_max_depth(OnMaxDepth::ReturnBestEffort, message);
        assert!(matches!(action, RouterAction::ReturnBestEffort { .. }));
    }

    #[test]
    fn exceeding_max_depth_surfaces_to_user() {
        let mut escalation = EscalationPolicy::default();
        escalation.default_behavior = EscalationBehavior::RouteToReportsTo;
        escalation.max_depth = 0;
        let structure = OrgStructure {
            roles: vec![role("architect", None), role("engineer", Some("architect"))],
            routing: vec![],
            escalation,
        };
        let ctx = context_with(structure);
        let action = MessageRouter::route(
            &ctx,
            &"engineer".to_string(),
            serde_json::json!("q"),
            "question",
            None,
            vec![],
        );
        assert!(matches!(action, RouterAction::SurfaceToUser { .. }));
    }
}
