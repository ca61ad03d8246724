//! Persistence port for `Trigger` (C10, §6 logical schema).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::ConclaveResult;
use crate::domain::models::{Trigger, TriggerType};

#[derive(Debug, Clone, Default)]
pub struct TriggerFilter {
    pub trigger_type: Option<TriggerType>,
    pub pattern_name: Option<String>,
}

#[async_trait]
pub trait TriggerRepository: Send + Sync {
    async fn create(&self, trigger: &Trigger) -> ConclaveResult<()>;
    async fn get(&self, id: Uuid) -> ConclaveResult<Option<Trigger>>;
    async fn get_by_webhook_path(&self, path: &str) -> ConclaveResult<Option<Trigger>>;
    async fn update(&self, trigger: &Trigger) -> ConclaveResult<()>;
    async fn delete(&self, id: Uuid) -> ConclaveResult<bool>;
    async fn list(&self, filter: TriggerFilter) -> ConclaveResult<Vec<Trigger>>;
    /// Every active event trigger, for populating the in-memory
    /// `eventType -> triggers[]` multimap at startup.
    async fn list_active_event_triggers(&self) -> ConclaveResult<Vec<Trigger>>;
}
