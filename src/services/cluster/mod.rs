//! Cluster coordination: leader election (C1), distributed locking (C2),
//! shared state (C3), and node health (C4) — all built over one
//! `KvStore` implementation (see DESIGN.md).

pub mod consensus;
pub mod health;
pub mod lock_service;
pub mod state_bus;

pub use consensus::{ClusterEvent, ConsensusClient};
pub use health::ClusterHealth;
pub use lock_service::LockService;
pub use state_bus::StateBus;
