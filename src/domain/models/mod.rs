//! Domain models.
//!
//! Pure value types with no infrastructure dependency, shared across every
//! component.

pub mod agent_instance;
pub mod node_info;
pub mod role;
pub mod schedule;
pub mod trigger;
pub mod workflow;

pub use agent_instance::{AgentInstance, AgentStatus, ExecutionContext, ExecutionState};
pub use node_info::{Lock, NodeInfo, NodeMetrics, NodeStatus};
pub use role::{EscalationBehavior, EscalationPolicy, OnMaxDepth, OrgStructure, Role, RoleId, RoutingRule};
pub use schedule::{RetryPolicy, RunStatus, Schedule, ScheduleRun, ScheduleSpec, ScheduleStatus};
pub use trigger::{
    EventFilter, FilterOperators, FilterValue, InputMapping, Trigger, TriggerStatus, TriggerType,
};
pub use workflow::{AggregateMethod, OrgPattern, SelectCriteria, Workflow, WorkflowStep};
