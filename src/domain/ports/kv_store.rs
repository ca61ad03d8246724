//! The single low-level primitive underlying the consensus client, lock
//! service, and state bus (see DESIGN.md for why these three components
//! share one port instead of three bespoke backing-store clients).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use crate::domain::errors::ConclaveResult;

/// A change notification published on every `set`/`delete`.
#[derive(Debug, Clone)]
pub struct KvEvent {
    pub key: String,
    pub value: Option<Value>,
    pub is_delete: bool,
    pub source_instance: String,
    pub timestamp: DateTime<Utc>,
}

/// Receiver half of a subscription to key-space change events.
pub type KvEventReceiver = tokio::sync::broadcast::Receiver<KvEvent>;

/// Async contract for the backing key/value store. `*_if` variants provide
/// the atomic compare-and-swap primitives the lock service and consensus
/// client build their invariants on.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> ConclaveResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> ConclaveResult<()>;

    async fn delete(&self, key: &str) -> ConclaveResult<bool>;

    async fn exists(&self, key: &str) -> ConclaveResult<bool>;

    /// Glob match: `*` matches any substring except the `:` namespace
    /// separator is itself matchable — callers scope by prefix.
    async fn keys(&self, pattern: &str) -> ConclaveResult<Vec<String>>;

    /// Set only if absent (compare against `None`); returns `true` if this
    /// call won the race.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> ConclaveResult<bool>;

    /// Atomic compare-and-swap: succeeds only if the current value equals
    /// `expected`. `None` for `expected` means "key must not exist".
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new_value: Value,
        ttl: Option<Duration>,
    ) -> ConclaveResult<bool>;

    /// Atomic compare-and-delete: deletes only if the current value equals
    /// `expected`.
    async fn compare_and_delete(&self, key: &str, expected: Value) -> ConclaveResult<bool>;

    /// Subscribe to every `set`/`delete` on the logical `state` channel.
    /// `source_instance` identifies this process for self-echo suppression
    /// (§4.3 invariant 4, §8 property 4) — done by the caller, which knows
    /// its own instance id and filters events whose `source_instance`
    /// matches it.
    fn subscribe(&self) -> KvEventReceiver;

    /// Identity this process stamps onto events it publishes.
    fn instance_id(&self) -> &str;
}
