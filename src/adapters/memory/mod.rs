//! In-process `KvStore` backed by `DashMap`. This is the default backing
//! store for the consensus client, lock service, and state bus in a
//! single-replica or test deployment; a real deployment would swap this
//! adapter for a client of whatever consensus store the operator runs,
//! without touching `services::cluster` (see DESIGN.md).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::domain::errors::ConclaveResult;
use crate::domain::ports::{KvEvent, KvEventReceiver, KvStore};

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

pub struct MemoryKvStore {
    instance_id: String,
    data: DashMap<String, Entry>,
    events: broadcast::Sender<KvEvent>,
}

impl MemoryKvStore {
    pub fn new(instance_id: impl Into<String>) -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            instance_id: instance_id.into(),
            data: DashMap::new(),
            events: tx,
        }
    }

    fn publish(&self, key: &str, value: Option<Value>, is_delete: bool) {
        let _ = self.events.send(KvEvent {
            key: key.to_string(),
            value,
            is_delete,
            source_instance: self.instance_id.clone(),
            timestamp: Utc::now(),
        });
    }

    fn read_live(&self, key: &str) -> Option<Value> {
        match self.data.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                self.data.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> ConclaveResult<Option<Value>> {
        Ok(self.read_live(key))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> ConclaveResult<()> {
        self.data.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        self.publish(key, Some(value), false);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ConclaveResult<bool> {
        let existed = self.data.remove(key).is_some();
        if existed {
            self.publish(key, None, true);
        }
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> ConclaveResult<bool> {
        Ok(self.read_live(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> ConclaveResult<Vec<String>> {
        let matcher = GlobMatcher::new(pattern);
        Ok(self
            .data
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.key().clone())
            .filter(|key| matcher.matches(key))
            .collect())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> ConclaveResult<bool> {
        if self.read_live(key).is_some() {
            return Ok(false);
        }
        self.data.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        self.publish(key, Some(value), false);
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new_value: Value,
        ttl: Option<Duration>,
    ) -> ConclaveResult<bool> {
        let current = self.read_live(key);
        if current != expected {
            return Ok(false);
        }
        self.data.insert(
            key.to_string(),
            Entry {
                value: new_value.clone(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        self.publish(key, Some(new_value), false);
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: Value) -> ConclaveResult<bool> {
        let current = self.read_live(key);
        if current.as_ref() != Some(&expected) {
            return Ok(false);
        }
        self.data.remove(key);
        self.publish(key, None, true);
        Ok(true)
    }

    fn subscribe(&self) -> KvEventReceiver {
        self.events.subscribe()
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

/// Glob semantics: `*` matches any substring except the `:` namespace
/// separator, so a pattern matches component-for-component across `:`.
struct GlobMatcher {
    components: Vec<Vec<String>>,
}

impl GlobMatcher {
    fn new(pattern: &str) -> Self {
        Self {
            components: pattern
                .split(':')
                .map(|component| component.split('*').map(str::to_string).collect())
                .collect(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        let candidate_components: Vec<&str> = candidate.split(':').collect();
        if candidate_components.len() != self.components.len() {
            return false;
        }
        self.components
            .iter()
            .zip(candidate_components.iter())
            .all(|(segments, component)| Self::matches_component(segments, component))
    }

    fn matches_component(segments: &[String], candidate: &str) -> bool {
        if segments.len() == 1 {
            return candidate == segments[0];
        }
        let mut rest = candidate;
        for (i, segment) in segments.iter().enumerate() {
            if i == 0 {
                if !rest.starts_with(segment.as_str()) {
                    return false;
                }
                rest = &rest[segment.len()..];
            } else if i == segments.len() - 1 {
                return rest.ends_with(segment.as_str());
            } else if let Some(pos) = rest.find(segment.as_str()) {
                rest = &rest[pos + segment.len()..];
            } else {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryKvStore::new("n1");
        store.set("k", serde_json::json!("v"), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!("v")));
    }

    #[tokio::test]
    async fn set_if_absent_only_wins_once() {
        let store = MemoryKvStore::new("n1");
        assert!(store
            .set_if_absent("lock:r", serde_json::json!("t1"), None)
            .await
            .unwrap());
        assert!(!store
            .set_if_absent("lock:r", serde_json::json!("t2"), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn compare_and_delete_requires_matching_value() {
        let store = MemoryKvStore::new("n1");
        store.set("k", serde_json::json!("t1"), None).await.unwrap();
        assert!(!store
            .compare_and_delete("k", serde_json::json!("wrong"))
            .await
            .unwrap());
        assert!(store
            .compare_and_delete("k", serde_json::json!("t1"))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let store = MemoryKvStore::new("n1");
        store
            .set("k", serde_json::json!("v"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn glob_keys_match_prefix_pattern() {
        let store = MemoryKvStore::new("n1");
        store.set("node:a", serde_json::json!(1), None).await.unwrap();
        store.set("node:b", serde_json::json!(2), None).await.unwrap();
        store.set("state:x", serde_json::json!(3), None).await.unwrap();
        let mut keys = store.keys("node:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["node:a".to_string(), "node:b".to_string()]);
    }

    #[tokio::test]
    async fn glob_star_does_not_cross_namespace_separator() {
        let store = MemoryKvStore::new("n1");
        store.set("node:a", serde_json::json!(1), None).await.unwrap();
        store.set("node:a:b", serde_json::json!(2), None).await.unwrap();
        let keys = store.keys("node:*").await.unwrap();
        assert_eq!(keys, vec!["node:a".to_string()]);
    }

    #[tokio::test]
    async fn subscriber_receives_set_and_delete_events() {
        let store = MemoryKvStore::new("n1");
        let mut rx = store.subscribe();
        store.set("k", serde_json::json!(1), None).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, "k");
        assert!(!event.is_delete);
    }
}
