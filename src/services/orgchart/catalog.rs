//! Pattern catalog and executor: the narrow seam the scheduler (C9) and
//! trigger dispatcher (C10) use to invoke a workflow by name without
//! depending on `WorkflowEngine` directly.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::models::OrgPattern;
use crate::services::orgchart::engine::WorkflowEngine;

#[async_trait]
pub trait PatternExecutor: Send + Sync {
    async fn execute_pattern(&self, pattern_name: &str, input: Value) -> ConclaveResult<Value>;
}

/// In-memory registry of loaded `OrgPattern`s, paired with the engine that
/// runs them. Patterns are loaded once at bootstrap; this process does not
/// itself implement hot reload.
pub struct PatternCatalog {
    engine: WorkflowEngine,
    patterns: DashMap<String, OrgPattern>,
}

impl PatternCatalog {
    pub fn new(engine: WorkflowEngine) -> Self {
        Self {
            engine,
            patterns: DashMap::new(),
        }
    }

    pub fn register(&self, pattern: OrgPattern) -> ConclaveResult<()> {
        pattern.validate()?;
        self.patterns.insert(pattern.name.clone(), pattern);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<OrgPattern> {
        self.patterns.get(name).map(|entry| entry.clone())
    }
}

#[async_trait]
impl PatternExecutor for PatternCatalog {
    async fn execute_pattern(&self, pattern_name: &str, input: Value) -> ConclaveResult<Value> {
        let pattern = self
            .get(pattern_name)
            .ok_or_else(|| ConclaveError::PatternNotFound(pattern_name.to_string()))?;
        let outcome = self.engine.execute(pattern, input).await?;
        Ok(outcome.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EscalationPolicy, OrgStructure, Workflow};
    use crate::services::runtime::RuntimeFederation;
    use std::sync::Arc;

    fn empty_pattern(name: &str) -> OrgPattern {
        OrgPattern {
            name: name.to_string(),
            version: "1".into(),
            structure: OrgStructure {
                roles: vec![],
                routing: vec![],
                escalation: EscalationPolicy::default(),
            },
            workflow: Workflow { steps: vec![], output: None },
        }
    }

    #[tokio::test]
    async fn execute_pattern_fails_for_unknown_name() {
        let catalog = PatternCatalog::new(WorkflowEngine::new(Arc::new(RuntimeFederation::new())));
        let result = catalog.execute_pattern("ghost", serde_json::json!({})).await;
        assert!(matches!(result, Err(ConclaveError::PatternNotFound(_))));
    }

    #[tokio::test]
    async fn registers_and_executes_empty_pattern() {
        let catalog = PatternCatalog::new(WorkflowEngine::new(Arc::new(RuntimeFederation::new())));
        catalog.register(empty_pattern("noop")).unwrap();
        let result = catalog.execute_pattern("noop", serde_json::json!({})).await.unwrap();
        assert_eq!(result, Value::Null);
    }
}
