//! Trigger Dispatcher (C10, §4.10) — webhook and event-bus entry points
//! into the pattern engine. No inbound HTTP/WS server is built here; an
//! out-of-scope transport layer calls `handle_webhook`/`emit_event`.

pub mod events;
pub mod webhook;

use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::ConclaveResult;
use crate::domain::models::trigger::resolve_path;
use crate::domain::models::{Trigger, TriggerStatus};
use crate::domain::ports::{TriggerFilter, TriggerRepository};
use crate::services::orgchart::PatternExecutor;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("no trigger registered at this path")]
    NotFound,
    #[error("trigger is not active")]
    Forbidden,
    #[error("signature verification failed")]
    Unauthorized,
    #[error(transparent)]
    Execution(#[from] crate::domain::errors::ConclaveError),
}

pub struct TriggerDispatcher {
    repo: Arc<dyn TriggerRepository>,
    executor: Arc<dyn PatternExecutor>,
    event_index: DashMap<String, Vec<Trigger>>,
}

impl TriggerDispatcher {
    pub fn new(repo: Arc<dyn TriggerRepository>, executor: Arc<dyn PatternExecutor>) -> Self {
        Self { repo, executor, event_index: DashMap::new() }
    }

    /// Populates the `eventType -> triggers[]` multimap from durable
    /// storage. Call once at bootstrap.
    pub async fn load(&self) -> ConclaveResult<()> {
        self.event_index.clear();
        for trigger in self.repo.list_active_event_triggers().await? {
            if let Some(event_type) = trigger.event_type.clone() {
                self.event_index.entry(event_type).or_default().push(trigger);
            }
        }
        Ok(())
    }

    pub async fn register(&self, trigger: Trigger) -> ConclaveResult<()> {
        self.repo.create(&trigger).await?;
        self.index_if_active_event(&trigger);
        Ok(())
    }

    pub async fn pause(&self, id: Uuid) -> ConclaveResult<()> {
        self.set_status(id, TriggerStatus::Paused).await
    }

    pub async fn resume(&self, id: Uuid) -> ConclaveResult<()> {
        self.set_status(id, TriggerStatus::Active).await
    }

    async fn set_status(&self, id: Uuid, status: TriggerStatus) -> ConclaveResult<()> {
        let Some(mut trigger) = self.repo.get(id).await? else {
            return Ok(());
        };
        trigger.status = status;
        self.repo.update(&trigger).await?;
        self.reindex(&trigger);
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> ConclaveResult<bool> {
        let deleted = self.repo.delete(id).await?;
        self.event_index.iter_mut().for_each(|mut entry| entry.retain(|t| t.id != id));
        Ok(deleted)
    }

    pub async fn list(&self, filter: TriggerFilter) -> ConclaveResult<Vec<Trigger>> {
        self.repo.list(filter).await
    }

    fn index_if_active_event(&self, trigger: &Trigger) {
        if trigger.status == TriggerStatus::Active {
            if let Some(event_type) = &trigger.event_type {
                self.event_index.entry(event_type.clone()).or_default().push(trigger.clone());
            }
        }
    }

    fn reindex(&self, trigger: &Trigger) {
        if let Some(event_type) = &trigger.event_type {
            if let Some(mut bucket) = self.event_index.get_mut(event_type) {
                bucket.retain(|t| t.id != trigger.id);
            }
            self.index_if_active_event(trigger);
        }
    }

    /// §4.10 webhook path: lookup, signature check, input mapping,
    /// invocation, bookkeeping.
    pub async fn handle_webhook(
        &self,
        path: &str,
        headers: &StdHashMap<String, String>,
        body: Value,
    ) -> Result<Value, WebhookError> {
        let mut trigger = self.repo.get_by_webhook_path(path).await?.ok_or(WebhookError::NotFound)?;
        if trigger.status != TriggerStatus::Active {
            return Err(WebhookError::Forbidden);
        }

        if let Some(secret) = &trigger.webhook_secret {
            let raw = serde_json::to_vec(&body).unwrap_or_default();
            let signature = headers
                .get(webhook::SIGNATURE_HEADER)
                .or_else(|| headers.get(webhook::COMPAT_SIGNATURE_HEADER))
                .ok_or(WebhookError::Unauthorized)?;
            if !webhook::verify(&raw, secret, signature) {
                return Err(WebhookError::Unauthorized);
            }
        }

        let input = apply_mapping(trigger.input_mapping.as_ref(), &body);
        let result = self.executor.execute_pattern(&trigger.pattern_name, input).await?;

        trigger.record_fire(Utc::now());
        self.repo.update(&trigger).await?;
        info!(trigger_id = %trigger.id, "webhook trigger fired");
        Ok(result)
    }

    /// `emitEvent(eventType, payload)` (§4.10 "Event"). Every matching
    /// trigger runs independently; one failing invocation does not block
    /// the others.
    pub async fn emit_event(&self, event_type: &str, payload: Value) -> Vec<ConclaveResult<Value>> {
        let candidates: Vec<Trigger> = self
            .event_index
            .get(event_type)
            .map(|bucket| bucket.clone())
            .unwrap_or_default();

        let mut results = Vec::with_capacity(candidates.len());
        for mut trigger in candidates {
            if let Some(filter) = &trigger.event_filter {
                if !events::matches(filter, &payload) {
                    continue;
                }
            }
            let input = apply_mapping(trigger.input_mapping.as_ref(), &payload);
            let outcome = self.executor.execute_pattern(&trigger.pattern_name, input).await;
            if let Err(err) = &outcome {
                warn!(trigger_id = %trigger.id, error = %err, "event trigger invocation failed");
            } else {
                trigger.record_fire(Utc::now());
                if let Err(err) = self.repo.update(&trigger).await {
                    warn!(trigger_id = %trigger.id, error = %err, "failed to persist trigger fire bookkeeping");
                }
            }
            results.push(outcome);
        }
        results
    }
}

/// `target <- sourcePath`; an absent source path resolves to `null` rather
/// than erroring or omitting the key.
fn apply_mapping(mapping: Option<&crate::domain::models::InputMapping>, body: &Value) -> Value {
    let Some(mapping) = mapping else {
        return body.clone();
    };
    let mut object = serde_json::Map::new();
    for (target, source_path) in mapping {
        let value = resolve_path(body, source_path).cloned().unwrap_or(Value::Null);
        object.insert(target.clone(), value);
    }
    Value::Object(object)
}
