//! SQLite adapter for `TriggerRepository`.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_optional_datetime, parse_uuid};
use crate::domain::errors::ConclaveResult;
use crate::domain::models::{EventFilter, InputMapping, Trigger, TriggerStatus, TriggerType};
use crate::domain::ports::{TriggerFilter, TriggerRepository};

#[derive(Clone)]
pub struct SqliteTriggerRepository {
    pool: SqlitePool,
}

impl SqliteTriggerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TriggerRow {
    id: String,
    trigger_type: String,
    pattern_name: String,
    status: String,
    input_mapping: Option<String>,
    webhook_path: Option<String>,
    webhook_secret: Option<String>,
    event_type: Option<String>,
    event_filter: Option<String>,
    trigger_count: i64,
    last_triggered: Option<String>,
}

fn row_to_trigger(row: TriggerRow) -> ConclaveResult<Trigger> {
    let input_mapping: Option<InputMapping> = row.input_mapping.map(|s| serde_json::from_str(&s)).transpose()?;
    let event_filter: Option<EventFilter> = row.event_filter.map(|s| serde_json::from_str(&s)).transpose()?;

    Ok(Trigger {
        id: parse_uuid(&row.id)?,
        trigger_type: match row.trigger_type.as_str() {
            "webhook" => TriggerType::Webhook,
            _ => TriggerType::Event,
        },
        pattern_name: row.pattern_name,
        status: TriggerStatus::from_str(&row.status).unwrap_or(TriggerStatus::Paused),
        input_mapping,
        webhook_path: row.webhook_path,
        webhook_secret: row.webhook_secret,
        event_type: row.event_type,
        event_filter,
        trigger_count: row.trigger_count as u64,
        last_triggered: parse_optional_datetime(row.last_triggered)?,
    })
}

fn trigger_type_str(trigger_type: TriggerType) -> &'static str {
    match trigger_type {
        TriggerType::Webhook => "webhook",
        TriggerType::Event => "event",
    }
}

#[async_trait]
impl TriggerRepository for SqliteTriggerRepository {
    async fn create(&self, trigger: &Trigger) -> ConclaveResult<()> {
        let input_mapping = trigger.input_mapping.as_ref().map(serde_json::to_string).transpose()?;
        let event_filter = trigger.event_filter.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            "INSERT INTO triggers
             (id, trigger_type, pattern_name, status, input_mapping, webhook_path, webhook_secret,
              event_type, event_filter, trigger_count, last_triggered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(trigger.id.to_string())
        .bind(trigger_type_str(trigger.trigger_type))
        .bind(&trigger.pattern_name)
        .bind(trigger.status.as_str())
        .bind(&input_mapping)
        .bind(&trigger.webhook_path)
        .bind(&trigger.webhook_secret)
        .bind(&trigger.event_type)
        .bind(&event_filter)
        .bind(trigger.trigger_count as i64)
        .bind(trigger.last_triggered.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> ConclaveResult<Option<Trigger>> {
        let row: Option<TriggerRow> = sqlx::query_as("SELECT * FROM triggers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_trigger).transpose()
    }

    async fn get_by_webhook_path(&self, path: &str) -> ConclaveResult<Option<Trigger>> {
        let row: Option<TriggerRow> = sqlx::query_as("SELECT * FROM triggers WHERE webhook_path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_trigger).transpose()
    }

    async fn update(&self, trigger: &Trigger) -> ConclaveResult<()> {
        let input_mapping = trigger.input_mapping.as_ref().map(serde_json::to_string).transpose()?;
        let event_filter = trigger.event_filter.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            "UPDATE triggers SET
             trigger_type = ?2, pattern_name = ?3, status = ?4, input_mapping = ?5,
             webhook_path = ?6, webhook_secret = ?7, event_type = ?8, event_filter = ?9,
             trigger_count = ?10, last_triggered = ?11
             WHERE id = ?1",
        )
        .bind(trigger.id.to_string())
        .bind(trigger_type_str(trigger.trigger_type))
        .bind(&trigger.pattern_name)
        .bind(trigger.status.as_str())
        .bind(&input_mapping)
        .bind(&trigger.webhook_path)
        .bind(&trigger.webhook_secret)
        .bind(&trigger.event_type)
        .bind(&event_filter)
        .bind(trigger.trigger_count as i64)
        .bind(trigger.last_triggered.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> ConclaveResult<bool> {
        let result = sqlx::query("DELETE FROM triggers WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: TriggerFilter) -> ConclaveResult<Vec<Trigger>> {
        let rows: Vec<TriggerRow> = match (filter.trigger_type, filter.pattern_name) {
            (Some(trigger_type), Some(pattern_name)) => {
                sqlx::query_as("SELECT * FROM triggers WHERE trigger_type = ?1 AND pattern_name = ?2")
                    .bind(trigger_type_str(trigger_type))
                    .bind(pattern_name)
                    .fetch_all(&self.pool)
                    .await?
            }
            (Some(trigger_type), None) => {
                sqlx::query_as("SELECT * FROM triggers WHERE trigger_type = ?")
                    .bind(trigger_type_str(trigger_type))
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, Some(pattern_name)) => {
                sqlx::query_as("SELECT * FROM triggers WHERE pattern_name = ?")
                    .bind(pattern_name)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => sqlx::query_as("SELECT * FROM triggers").fetch_all(&self.pool).await?,
        };
        rows.into_iter().map(row_to_trigger).collect()
    }

    async fn list_active_event_triggers(&self) -> ConclaveResult<Vec<Trigger>> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            "SELECT * FROM triggers WHERE status = 'active' AND trigger_type = 'event' AND event_type IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_trigger).collect()
    }
}
