//! Adapters implementing the domain ports against concrete backing systems.

pub mod memory;
pub mod sqlite;
