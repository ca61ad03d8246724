//! Org-chart workflow engine: message routing (C7) and the step
//! interpreter (C8), plus their supporting variable-scope and aggregation
//! helpers.

pub mod aggregate;
pub mod catalog;
pub mod engine;
pub mod router;
pub mod variables;

pub use catalog::{PatternCatalog, PatternExecutor};
pub use engine::{WorkflowEngine, WorkflowOutcome};
pub use router::{MessageRouter, RouterAction};
