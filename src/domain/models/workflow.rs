//! The workflow step tagged union and the immutable org pattern (§3, §9).
//!
//! `WorkflowStep` is dispatched by tag into dedicated handlers in
//! `services::orgchart::engine` rather than through dynamic method lookup,
//! per the dynamic-dispatch design note: a closed tagged union models this
//! better than a trait-object hierarchy because the interpreter needs to
//! exhaustively match every variant.

use serde::{Deserialize, Serialize};

use super::role::{OrgStructure, RoleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectCriteria {
    Availability,
    Expertise,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMethod {
    Consensus,
    Majority,
    Merge,
    Best,
}

/// One element of a workflow; executed atomically at the interpreter level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowStep {
    Assign {
        role: RoleId,
        task: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    Parallel {
        steps: Vec<WorkflowStep>,
    },
    Sequential {
        steps: Vec<WorkflowStep>,
    },
    Select {
        role: RoleId,
        criteria: SelectCriteria,
    },
    Review {
        reviewer: RoleId,
        subject: String,
    },
    Approve {
        approver: RoleId,
        subject: String,
    },
    Aggregate {
        method: AggregateMethod,
    },
    Condition {
        check: String,
        then: Box<WorkflowStep>,
        #[serde(default)]
        r#else: Option<Box<WorkflowStep>>,
    },
}

impl WorkflowStep {
    /// Validate `select` criteria names at pattern-load time rather than at
    /// run time (Open Question #2 — see DESIGN.md).
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Parallel { steps } | Self::Sequential { steps } => {
                for step in steps {
                    step.validate()?;
                }
                Ok(())
            }
            Self::Condition { then, r#else, .. } => {
                then.validate()?;
                if let Some(e) = r#else {
                    e.validate()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Declarative workflow: a list of top-level steps plus an optional output
/// variable reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub output: Option<String>,
}

/// A static declaration combining an org structure and a workflow.
/// Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgPattern {
    pub name: String,
    pub version: String,
    pub structure: OrgStructure,
    pub workflow: Workflow,
}

impl OrgPattern {
    /// Validate structural invariants at ingest time: the `reportsTo`
    /// forest must be acyclic and within `maxDepth`, and every step must
    /// reference roles that exist in the structure.
    pub fn validate(&self) -> crate::domain::errors::ConclaveResult<()> {
        self.structure.validate()?;
        for step in &self.workflow.steps {
            self.validate_step_roles(step)?;
        }
        Ok(())
    }

    fn validate_step_roles(
        &self,
        step: &WorkflowStep,
    ) -> crate::domain::errors::ConclaveResult<()> {
        use crate::domain::errors::ConclaveError;
        let check_role = |role: &str| -> crate::domain::errors::ConclaveResult<()> {
            if self.structure.role(role).is_none() {
                return Err(ConclaveError::UnknownRole(role.to_string()));
            }
            Ok(())
        };
        match step {
            WorkflowStep::Assign { role, .. } | WorkflowStep::Select { role, .. } => {
                check_role(role)
            }
            WorkflowStep::Review { reviewer, .. } => check_role(reviewer),
            WorkflowStep::Approve { approver, .. } => check_role(approver),
            WorkflowStep::Parallel { steps } | WorkflowStep::Sequential { steps } => {
                for s in steps {
                    self.validate_step_roles(s)?;
                }
                Ok(())
            }
            WorkflowStep::Condition { then, r#else, .. } => {
                self.validate_step_roles(then)?;
                if let Some(e) = r#else {
                    self.validate_step_roles(e)?;
                }
                Ok(())
            }
            WorkflowStep::Aggregate { .. } => Ok(()),
        }
    }
}
