//! State Bus (C3, §4.3) — shared key/value state with TTL and change
//! pub/sub. A thin, prefix-scoping wrapper over `KvStore`; self-echo
//! suppression is applied by callers of `subscribe` comparing
//! `source_instance` against `instance_id()`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::domain::errors::ConclaveResult;
use crate::domain::ports::{KvEvent, KvEventReceiver, KvStore};

pub struct StateBus {
    store: Arc<dyn KvStore>,
    app_prefix: String,
}

impl StateBus {
    pub fn new(store: Arc<dyn KvStore>, app_prefix: impl Into<String>) -> Self {
        Self {
            store,
            app_prefix: app_prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:state:{}", self.app_prefix, key)
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> ConclaveResult<()> {
        self.store.set(&self.key(key), value, ttl).await
    }

    pub async fn get(&self, key: &str) -> ConclaveResult<Option<Value>> {
        self.store.get(&self.key(key)).await
    }

    pub async fn delete(&self, key: &str) -> ConclaveResult<bool> {
        self.store.delete(&self.key(key)).await
    }

    pub async fn exists(&self, key: &str) -> ConclaveResult<bool> {
        self.store.exists(&self.key(key)).await
    }

    pub async fn keys(&self, pattern: &str) -> ConclaveResult<Vec<String>> {
        let prefixed = self.key(pattern);
        let prefix_len = self.app_prefix.len() + ":state:".len();
        Ok(self
            .store
            .keys(&prefixed)
            .await?
            .into_iter()
            .map(|k| k[prefix_len..].to_string())
            .collect())
    }

    pub async fn get_many(&self, keys: &[String]) -> ConclaveResult<Vec<Option<Value>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    pub async fn set_many(&self, entries: Vec<(String, Value, Option<Duration>)>) -> ConclaveResult<()> {
        for (key, value, ttl) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    /// Raw subscription; events for keys outside this bus's `state:` prefix
    /// are filtered out, but self-echo is left to the caller per §4.3.
    pub fn subscribe(&self) -> StateBusSubscription {
        StateBusSubscription {
            inner: self.store.subscribe(),
            prefix: format!("{}:state:", self.app_prefix),
        }
    }

    pub fn instance_id(&self) -> &str {
        self.store.instance_id()
    }
}

pub struct StateBusSubscription {
    inner: KvEventReceiver,
    prefix: String,
}

impl StateBusSubscription {
    /// Awaits the next state-scoped change, excluding self-originated ones.
    pub async fn recv(&mut self, self_instance: &str) -> Option<KvEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) if event.source_instance == self_instance => continue,
                Ok(event) if event.key.starts_with(&self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}
