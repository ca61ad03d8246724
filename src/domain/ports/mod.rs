//! Domain ports (interfaces) for the control plane.

pub mod audit_sink;
pub mod kv_store;
pub mod runtime_provider;
pub mod schedule_repository;
pub mod trigger_repository;

pub use audit_sink::{AuditEvent, AuditSink};
pub use kv_store::{KvEvent, KvEventReceiver, KvStore};
pub use runtime_provider::{
    AgentConfig, AgentHandle, AgentHandleStatus, AgentMessage, AgentMetrics, HealthStatus,
    ListFilter, MessageStream, ProviderEvent, RuntimeProvider, SendOptions, StopOptions,
};
pub use schedule_repository::{ScheduleFilter, ScheduleRepository};
pub use trigger_repository::{TriggerFilter, TriggerRepository};
