//! Audit Sink contract (C11, §1 out-of-scope collaborator). Consumed as a
//! fire-and-forget sink: failures never block the main operation (§7).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub category: String,
    pub action: String,
    pub detail: Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(category: impl Into<String>, action: impl Into<String>, detail: Value) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            detail,
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Best-effort; implementations must not propagate failures to the
    /// caller. A logging-backed default lives in `services::audit`.
    async fn record(&self, event: AuditEvent);
}
