//! Logging infrastructure built on `tracing` + `tracing-subscriber` +
//! `tracing-appender`, with secret scrubbing and file rotation.

pub mod config;
pub mod logger;
pub mod rotation;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use rotation::LogRotator;
pub use secret_scrubbing::SecretScrubbingLayer;
