//! Infrastructure: configuration, logging, database bootstrap, and the
//! top-level `Application` wiring that owns every long-lived component.

pub mod config;
pub mod database;
pub mod logging;
pub mod setup;

pub use setup::Application;
