//! Trigger domain model and the event-filter grammar (§3 Trigger, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Webhook,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Paused,
}

impl TriggerStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// `target <- sourcePath` mapping applied to an inbound body before
/// invoking the pattern engine; undefined source paths resolve to
/// undefined rather than erroring.
pub type InputMapping = HashMap<String, String>;

/// Filter grammar: a field maps to either a direct-equality value or an
/// operator object. Nested fields use dot-paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Operators(FilterOperators),
    Literal(Value),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOperators {
    #[serde(rename = "$eq", default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<Value>,
    #[serde(rename = "$ne", default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<Value>,
    #[serde(rename = "$gt", default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(rename = "$gte", default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(rename = "$lt", default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(rename = "$lte", default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(rename = "$in", default, skip_serializing_if = "Option::is_none")]
    pub r#in: Option<Vec<Value>>,
    #[serde(rename = "$nin", default, skip_serializing_if = "Option::is_none")]
    pub nin: Option<Vec<Value>>,
    #[serde(rename = "$exists", default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

pub type EventFilter = HashMap<String, FilterValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub trigger_type: TriggerType,
    pub pattern_name: String,
    pub status: TriggerStatus,
    pub input_mapping: Option<InputMapping>,
    pub webhook_path: Option<String>,
    pub webhook_secret: Option<String>,
    pub event_type: Option<String>,
    pub event_filter: Option<EventFilter>,
    pub trigger_count: u64,
    pub last_triggered: Option<DateTime<Utc>>,
}

impl Trigger {
    /// A unique random 16-hex-byte webhook path per trigger.
    pub fn generate_webhook_path() -> String {
        let bytes: [u8; 16] = rand_bytes();
        hex::encode(bytes)
    }

    /// A 32-hex-byte webhook secret enabling HMAC-SHA256 verification.
    pub fn generate_webhook_secret() -> String {
        let bytes: [u8; 32] = rand_bytes();
        hex::encode(bytes)
    }

    pub fn new_webhook(pattern_name: impl Into<String>, with_secret: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_type: TriggerType::Webhook,
            pattern_name: pattern_name.into(),
            status: TriggerStatus::Active,
            input_mapping: None,
            webhook_path: Some(Self::generate_webhook_path()),
            webhook_secret: with_secret.then(Self::generate_webhook_secret),
            event_type: None,
            event_filter: None,
            trigger_count: 0,
            last_triggered: None,
        }
    }

    pub fn new_event(
        pattern_name: impl Into<String>,
        event_type: impl Into<String>,
        event_filter: Option<EventFilter>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_type: TriggerType::Event,
            pattern_name: pattern_name.into(),
            status: TriggerStatus::Active,
            input_mapping: None,
            webhook_path: None,
            webhook_secret: None,
            event_type: Some(event_type.into()),
            event_filter,
            trigger_count: 0,
            last_triggered: None,
        }
    }

    pub fn record_fire(&mut self, at: DateTime<Utc>) {
        self.trigger_count += 1;
        self.last_triggered = Some(at);
    }
}

/// Walk a dot-separated path through a JSON value; absence of any segment
/// resolves to `None` rather than erroring.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = value;
    for segment in path.split('.') {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

fn rand_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    for chunk in bytes.chunks_mut(16) {
        let uuid_bytes = Uuid::new_v4().into_bytes();
        let len = chunk.len().min(uuid_bytes.len());
        chunk[..len].copy_from_slice(&uuid_bytes[..len]);
    }
    bytes
}
