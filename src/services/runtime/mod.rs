//! Runtime Provider API consumers: a local in-process provider (C5, used
//! for tests and single-node deployments), an HTTP-backed provider client
//! (C5, §6 REST shape), and multi-provider federation (C6).

pub mod federation;
pub mod http_provider;
pub mod local_provider;

pub use federation::RuntimeFederation;
pub use http_provider::HttpRuntimeProvider;
pub use local_provider::LocalRuntimeProvider;
