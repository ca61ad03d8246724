//! Workflow Engine (C8, §4.8) — the step interpreter. Provisions a role
//! population via the runtime federation, drives the pattern's workflow,
//! and guarantees agent cleanup on every exit path.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::models::{
    AgentInstance, AgentStatus, ExecutionContext, ExecutionState, OrgPattern, RoleId,
    SelectCriteria, WorkflowStep,
};
use crate::domain::ports::{AgentConfig, ProviderEvent, SendOptions};
use crate::services::orgchart::aggregate::{aggregate, require_array};
use crate::services::orgchart::router::{MessageRouter, RouterAction};
use crate::services::orgchart::variables::{resolve_value, substitute};
use crate::services::runtime::RuntimeFederation;

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

type SharedCtx = Arc<RwLock<ExecutionContext>>;
type StepFuture<'a> = Pin<Box<dyn Future<Output = ConclaveResult<Value>> + Send + 'a>>;

pub struct WorkflowOutcome {
    pub result: Value,
    pub agents_used: usize,
}

pub struct WorkflowEngine {
    federation: Arc<RuntimeFederation>,
    step_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(federation: Arc<RuntimeFederation>) -> Self {
        Self {
            federation,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub async fn execute(&self, pattern: OrgPattern, input: Value) -> ConclaveResult<WorkflowOutcome> {
        pattern.validate()?;
        let steps = pattern.workflow.steps.clone();
        let ctx: SharedCtx = Arc::new(RwLock::new(ExecutionContext::new(pattern, input)));

        if let Err(err) = self.initialize_agents(&ctx).await {
            self.cleanup_agents(&ctx).await;
            return Err(err);
        }

        let routing_handles = self.start_message_routing(&ctx);
        ctx.write().await.state = ExecutionState::Running;

        let run_result = self.run_steps(&ctx, &steps).await;

        for handle in routing_handles {
            handle.abort();
        }
        self.cleanup_agents(&ctx).await;

        let agents_used = ctx.read().await.agents.len();
        match run_result {
            Ok(()) => {
                ctx.write().await.state = ExecutionState::Completed;
                let output = self.extract_output(&ctx).await;
                Ok(WorkflowOutcome { result: output, agents_used })
            }
            Err(err) => {
                ctx.write().await.state = ExecutionState::Failed;
                Err(err)
            }
        }
    }

    /// Spawns `singleton ? 1 : max(minInstances, 1)` agents per role in
    /// parallel. On any failure, every already-spawned agent is stopped
    /// before the error propagates.
    async fn initialize_agents(&self, ctx: &SharedCtx) -> ConclaveResult<()> {
        let structure = ctx.read().await.pattern.structure.clone();
        let mut configs = Vec::new();
        for role in &structure.roles {
            for i in 0..role.provision_count() {
                configs.push((
                    role.id.clone(),
                    AgentConfig {
                        role_id: role.id.clone(),
                        agent_type: role.agent_type.clone(),
                        display_name: format!("{} {}", role.id, i + 1),
                        capabilities: role.capabilities.clone(),
                        config_override: role.agent_config_override.clone(),
                    },
                ));
            }
        }

        let spawns = configs
            .into_iter()
            .map(|(role_id, config)| async move { (role_id, self.federation.spawn(config, None).await) });

        // Every successful spawn is inserted into `ctx.agents` before any
        // error is returned, so a later `cleanup_agents` stops all of them
        // regardless of where in the result vector a failure landed.
        let mut first_error = None;
        for (role_id, spawned) in join_all(spawns).await {
            match spawned {
                Ok(handle) => {
                    let instance = AgentInstance {
                        id: handle.id.clone(),
                        role_id: role_id.clone(),
                        endpoint: handle.endpoint,
                        status: AgentStatus::Ready,
                        current_task: None,
                        provider_name: "federated".to_string(),
                        started_at: chrono::Utc::now(),
                        last_activity_at: chrono::Utc::now(),
                    };
                    let mut ctx = ctx.write().await;
                    ctx.role_assignments.entry(role_id).or_default().push(instance.id.clone());
                    ctx.agents.insert(instance.id.clone(), instance);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn cleanup_agents(&self, ctx: &SharedCtx) {
        let agent_ids: Vec<String> = ctx.read().await.agents.keys().cloned().collect();
        let stops = agent_ids.iter().map(|id| async move {
            (id.clone(), self.federation.stop(id, Default::default()).await)
        });
        for (id, result) in join_all(stops).await {
            if let Err(err) = result {
                warn!(agent_id = %id, error = %err, "agent stop failed during cleanup");
            }
        }
    }

    /// Subscribes to every agent's outbound stream and routes peer
    /// messages up the `reportsTo` hierarchy (§4.8 message-routing
    /// side-channel).
    fn start_message_routing(&self, ctx: &SharedCtx) -> Vec<tokio::task::JoinHandle<()>> {
        let federation = self.federation.clone();
        let ctx = ctx.clone();
        let agent_ids: Vec<String> = {
            // best-effort snapshot; provisioning has already completed.
            match ctx.try_read() {
                Ok(guard) => guard.agents.keys().cloned().collect(),
                Err(_) => Vec::new(),
            }
        };

        agent_ids
            .into_iter()
            .map(|agent_id| {
                let federation = federation.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let Ok(mut stream) = federation.subscribe(&agent_id).await else {
                        return;
                    };
                    while let Some(event) = stream.recv().await {
                        if let ProviderEvent::Message { agent_id: from, message } = event {
                            handle_outbound_message(&federation, &ctx, &from, message.body).await;
                        }
                    }
                })
            })
            .collect()
    }

    async fn run_steps(&self, ctx: &SharedCtx, steps: &[WorkflowStep]) -> ConclaveResult<()> {
        for (i, step) in steps.iter().enumerate() {
            ctx.write().await.current_step_index = i;
            let result = self.execute_step(ctx, step).await?;
            ctx.write().await.variables.insert(format!("step_{i}_result"), result);
        }
        Ok(())
    }

    fn execute_step<'a>(&'a self, ctx: &'a SharedCtx, step: &'a WorkflowStep) -> StepFuture<'a> {
        Box::pin(async move {
            match step {
                WorkflowStep::Assign { role, task, input } => {
                    self.execute_assign(ctx, role, task, input.as_ref()).await
                }
                WorkflowStep::Parallel { steps } => self.execute_parallel(ctx, steps).await,
                WorkflowStep::Sequential { steps } => self.execute_sequential(ctx, steps).await,
                WorkflowStep::Select { role, criteria } => self.execute_select(ctx, role, *criteria).await,
                WorkflowStep::Review { reviewer, subject } => {
                    self.execute_review_or_approve(ctx, reviewer, subject).await
                }
                WorkflowStep::Approve { approver, subject } => {
                    self.execute_review_or_approve(ctx, approver, subject).await
                }
                WorkflowStep::Aggregate { method } => self.execute_aggregate(ctx, *method).await,
                WorkflowStep::Condition { check, then, r#else } => {
                    self.execute_condition(ctx, check, then, r#else.as_deref()).await
                }
            }
        })
    }

    async fn execute_assign(
        &self,
        ctx: &SharedCtx,
        role: &RoleId,
        task: &str,
        input: Option<&Value>,
    ) -> ConclaveResult<Value> {
        let (agent_id, rendered_task) = {
            let mut guard = ctx.write().await;
            let variables = guard.variables.clone();
            let Some(agent) = guard.first_agent_for_role(role) else {
                return Err(ConclaveError::RoleNotProvisioned(role.clone()));
            };
            let agent_id = agent.id.clone();
            let rendered = substitute(&variables, task);
            if let Some(agent) = guard.agents.get_mut(&agent_id) {
                agent.status = AgentStatus::Busy;
                agent.current_task = Some(rendered.clone());
                agent.touch();
            }
            (agent_id, rendered)
        };

        let body = match input {
            Some(value) => serde_json::json!({"task": rendered_task, "input": value}),
            None => serde_json::json!({"task": rendered_task}),
        };

        let reply = self
            .federation
            .send(
                &agent_id,
                body,
                SendOptions {
                    expect_response: true,
                    timeout: Some(self.step_timeout),
                },
            )
            .await;

        {
            let mut guard = ctx.write().await;
            if let Some(agent) = guard.agents.get_mut(&agent_id) {
                agent.status = AgentStatus::Ready;
                agent.current_task = None;
                agent.touch();
            }
        }

        let message = reply?.ok_or_else(|| {
            ConclaveError::Timeout(self.step_timeout)
        })?;
        Ok(message.body)
    }

    async fn execute_parallel(&self, ctx: &SharedCtx, steps: &[WorkflowStep]) -> ConclaveResult<Value> {
        let futures = steps.iter().map(|step| self.execute_step(ctx, step));
        let results = join_all(futures).await;
        let mut values = Vec::with_capacity(results.len());
        for result in results {
            values.push(result?);
        }
        Ok(Value::Array(values))
    }

    async fn execute_sequential(&self, ctx: &SharedCtx, steps: &[WorkflowStep]) -> ConclaveResult<Value> {
        let mut last = Value::Null;
        for step in steps {
            last = self.execute_step(ctx, step).await?;
        }
        Ok(last)
    }

    async fn execute_select(&self, ctx: &SharedCtx, role: &RoleId, criteria: SelectCriteria) -> ConclaveResult<Value> {
        let guard = ctx.read().await;
        let agents = guard.agents_for_role(role);
        if agents.is_empty() {
            return Err(ConclaveError::RoleNotProvisioned(role.clone()));
        }
        let selected = match criteria {
            SelectCriteria::Availability => agents
                .iter()
                .find(|a| a.status == AgentStatus::Ready)
                .or_else(|| agents.first())
                .unwrap(),
            SelectCriteria::RoundRobin => {
                let index = guard.current_step_index % agents.len();
                agents[index]
            }
            SelectCriteria::Expertise => agents.first().unwrap(),
        };
        Ok(serde_json::json!(selected.id))
    }

    async fn execute_review_or_approve(
        &self,
        ctx: &SharedCtx,
        role: &RoleId,
        subject: &str,
    ) -> ConclaveResult<Value> {
        let (agent_id, rendered_subject) = {
            let guard = ctx.read().await;
            let Some(agent) = guard.first_agent_for_role(role) else {
                return Err(ConclaveError::RoleNotProvisioned(role.clone()));
            };
            (agent.id.clone(), substitute(&guard.variables, subject))
        };
        let reply = self
            .federation
            .send(
                &agent_id,
                serde_json::json!({"subject": rendered_subject}),
                SendOptions {
                    expect_response: true,
                    timeout: Some(self.step_timeout),
                },
            )
            .await?
            .ok_or(ConclaveError::Timeout(self.step_timeout))?;
        Ok(reply.body)
    }

    async fn execute_aggregate(&self, ctx: &SharedCtx, method: crate::domain::models::AggregateMethod) -> ConclaveResult<Value> {
        let guard = ctx.read().await;
        let previous_index = guard.current_step_index.checked_sub(1).ok_or_else(|| {
            ConclaveError::StepFailed("aggregate has no preceding step to operate on".to_string())
        })?;
        let operand = guard
            .variables
            .get(&format!("step_{previous_index}_result"))
            .cloned()
            .unwrap_or(Value::Null);
        let elements = require_array(&operand)?;
        aggregate(method, &elements)
    }

    async fn execute_condition(
        &self,
        ctx: &SharedCtx,
        check: &str,
        then: &WorkflowStep,
        r#else: Option<&WorkflowStep>,
    ) -> ConclaveResult<Value> {
        let truthy = {
            let guard = ctx.read().await;
            is_truthy(&resolve_value(&guard.variables, &format!("${check}")))
        };
        if truthy {
            self.execute_step(ctx, then).await
        } else if let Some(else_step) = r#else {
            self.execute_step(ctx, else_step).await
        } else {
            Ok(Value::Null)
        }
    }

    async fn extract_output(&self, ctx: &SharedCtx) -> Value {
        let guard = ctx.read().await;
        match &guard.pattern.workflow.output {
            Some(name) => resolve_value(&guard.variables, &format!("${name}")),
            None => {
                let last = guard.pattern.workflow.steps.len().saturating_sub(1);
                guard
                    .variables
                    .get(&format!("step_{last}_result"))
                    .cloned()
                    .unwrap_or(Value::Null)
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

async fn handle_outbound_message(
    federation: &Arc<RuntimeFederation>,
    ctx: &SharedCtx,
    from_agent_id: &str,
    body: Value,
) {
    let (from_role, manager) = {
        let guard = ctx.read().await;
        let Some(agent) = guard.agents.get(from_agent_id) else {
            return;
        };
        let role_id = agent.role_id.clone();
        let manager_role = guard.pattern.structure.role(&role_id).and_then(|r| r.reports_to.clone());
        (role_id, manager_role)
    };

    let Some(manager_role) = manager else {
        info!(agent_id = %from_agent_id, role = %from_role, "lead agent message surfaced to user");
        return;
    };

    let manager_agent_id = {
        let guard = ctx.read().await;
        guard.first_agent_for_role(&manager_role).map(|a| a.id.clone())
    };

    let Some(manager_agent_id) = manager_agent_id else {
        let action = {
            let guard = ctx.read().await;
            MessageRouter::route(&guard, &from_role, body, "message", None, vec![])
        };
        log_router_action(action);
        return;
    };

    let prefixed = serde_json::json!(format!(
        "Message from {from_role} ({from_role}):\n{body}"
    ));
    let reply = federation
        .send(
            &manager_agent_id,
            prefixed,
            SendOptions {
                expect_response: true,
                timeout: Some(Duration::from_secs(30)),
            },
        )
        .await;

    if let Ok(Some(answer)) = reply {
        let forwarded = serde_json::json!(format!("Response from {manager_role}:\n{}", answer.body));
        let _ = federation
            .send(
                from_agent_id,
                forwarded,
                SendOptions {
                    expect_response: false,
                    timeout: None,
                },
            )
            .await;
    }
}

fn log_router_action(action: RouterAction) {
    match action {
        RouterAction::SurfaceToUser { reason, .. } => warn!(reason, "message surfaced to user"),
        RouterAction::SendQuestion { to_agent_id, .. } => info!(to_agent_id, "question routed"),
        RouterAction::SendAnswer { to_agent_id, .. } => info!(to_agent_id, "answer routed"),
        RouterAction::Broadcast { to_agent_ids, .. } => {
            info!(count = to_agent_ids.len(), agents = ?to_agent_ids, "message broadcast to role");
        }
        RouterAction::Fail { reason, .. } => warn!(reason, "message routing failed"),
        RouterAction::ReturnBestEffort { reason, .. } => {
            info!(reason, "escalation stopped with best-effort result")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EscalationPolicy, OrgStructure, Role, Workflow};
    use crate::services::runtime::local_provider::LocalRuntimeProvider;
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

    fn federation() -> Arc<RuntimeFederation> {
        let federation = RuntimeFederation::new();
        federation.register("local", Arc::new(LocalRuntimeProvider::new("local")), 1);
        Arc::new(federation)
    }

    #[tokio::test]
    async fn two_level_org_happy_path() {
        let federation = federation();
        let engine = WorkflowEngine::new(federation);
        let pattern = OrgPattern {
            name: "startup-team".into(),
            version: "1".into(),
            structure: OrgStructure {
                roles: vec![role("architect", None), role("engineer", Some("architect"))],
                routing: vec![],
                escalation: EscalationPolicy::default(),
            },
            workflow: Workflow {
                steps: vec![
                    WorkflowStep::Assign {
                        role: "architect".into(),
                        task: "Design: ${input.task}".into(),
                        input: None,
                    },
                    WorkflowStep::Assign {
                        role: "engineer".into(),
                        task: "Implement: ${step_0_result}".into(),
                        input: None,
                    },
                ],
                output: None,
            },
        };
        let outcome = engine
            .execute(pattern, serde_json::json!({"task": "auth"}))
            .await
            .unwrap();
        assert_eq!(outcome.agents_used, 2);
    }

    #[tokio::test]
    async fn execute_rejects_pattern_referencing_unknown_role() {
        let federation = federation();
        let engine = WorkflowEngine::new(federation);
        let pattern = OrgPattern {
            name: "p".into(),
            version: "1".into(),
            structure: OrgStructure {
                roles: vec![role("architect", None)],
                routing: vec![],
                escalation: EscalationPolicy::default(),
            },
            workflow: Workflow {
                steps: vec![WorkflowStep::Assign {
                    role: "ghost".into(),
                    task: "x".into(),
                    input: None,
                }],
                output: None,
            },
        };
        let result = engine.execute(pattern, serde_json::json!({})).await;
        assert!(matches!(result, Err(ConclaveError::UnknownRole(_))));
    }
}
