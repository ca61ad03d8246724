//! Conclave - a control plane for multi-agent orchestration:
//! - Leader election and distributed locking over a pluggable `KvStore`
//! - Runtime federation across heterogeneous agent providers
//! - An org-chart workflow engine (roles, routing, escalation)
//! - Cron/interval schedules and webhook/event triggers

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{ConclaveError, ConclaveResult};
pub use infrastructure::Application;
