//! Shared fixtures for the scenario tests: org-pattern builders and a
//! federation pre-wired with a `LocalRuntimeProvider`.

use std::collections::HashSet;
use std::sync::Arc;

use conclave::domain::models::{
    EscalationPolicy, OrgPattern, OrgStructure, Role, RoutingRule, Workflow, WorkflowStep,
};
use conclave::services::orgchart::{PatternCatalog, WorkflowEngine};
use conclave::services::runtime::{LocalRuntimeProvider, RuntimeFederation};

pub fn role(id: &str, reports_to: Option<&str>) -> Role {
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

pub fn pattern(name: &str, roles: Vec<Role>, routing: Vec<RoutingRule>, steps: Vec<WorkflowStep>, output: Option<&str>) -> OrgPattern {
    OrgPattern {
        name: name.to_string(),
        version: "1".to_string(),
        structure: OrgStructure { roles, routing, escalation: EscalationPolicy::default() },
        workflow: Workflow { steps, output: output.map(str::to_string) },
    }
}

/// A federation with a single `LocalRuntimeProvider` registered at the
/// priority the engine always prefers when only one provider is healthy.
pub fn federation_with_local_provider() -> (Arc<RuntimeFederation>, Arc<LocalRuntimeProvider>) {
    let federation = Arc::new(RuntimeFederation::new());
    let provider = Arc::new(LocalRuntimeProvider::new("local"));
    federation.register("local", provider.clone(), 0);
    (federation, provider)
}

pub fn catalog_with_local_provider() -> (Arc<PatternCatalog>, Arc<LocalRuntimeProvider>) {
    let (federation, provider) = federation_with_local_provider();
    let engine = WorkflowEngine::new(federation);
    (Arc::new(PatternCatalog::new(engine)), provider)
}
