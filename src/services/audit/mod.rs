//! Audit Sink (C11) consumer-side default: logs every event at `info`
//! level and never fails the caller (§7 fire-and-forget contract).

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{AuditEvent, AuditSink};

pub struct LoggingAuditSink;

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            category = %event.category,
            action = %event.action,
            detail = %event.detail,
            at = %event.at,
            "audit event"
        );
    }
}

/// Broadcasts to every configured sink; a failing sink never blocks the
/// others or the caller.
pub struct FanOutAuditSink {
    sinks: Vec<std::sync::Arc<dyn AuditSink>>,
}

impl FanOutAuditSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanOutAuditSink {
    async fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_sink_never_panics_on_arbitrary_event() {
        let sink = LoggingAuditSink;
        sink.record(AuditEvent::new("schedule", "fired", serde_json::json!({"id": "x"})))
            .await;
    }

    #[tokio::test]
    async fn fan_out_sink_dispatches_to_every_member() {
        let sink = FanOutAuditSink::new(vec![
            std::sync::Arc::new(LoggingAuditSink),
            std::sync::Arc::new(LoggingAuditSink),
        ]);
        sink.record(AuditEvent::new("trigger", "fired", serde_json::json!({})))
            .await;
    }
}
