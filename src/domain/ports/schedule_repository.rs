//! Persistence port for `Schedule` and `ScheduleRun` (C9, §6 logical schema).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::ConclaveResult;
use crate::domain::models::{Schedule, ScheduleRun, ScheduleStatus};

#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub status: Option<ScheduleStatus>,
    pub due_before: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: &Schedule) -> ConclaveResult<()>;
    async fn get(&self, id: Uuid) -> ConclaveResult<Option<Schedule>>;
    async fn update(&self, schedule: &Schedule) -> ConclaveResult<()>;
    async fn delete(&self, id: Uuid) -> ConclaveResult<bool>;
    async fn list(&self, filter: ScheduleFilter) -> ConclaveResult<Vec<Schedule>>;
    /// `status='active' AND nextRunAt <= now AND (endAt IS NULL OR endAt > now)`.
    async fn list_due(&self, now: DateTime<Utc>) -> ConclaveResult<Vec<Schedule>>;

    async fn record_run(&self, run: &ScheduleRun) -> ConclaveResult<()>;
    async fn update_run(&self, run: &ScheduleRun) -> ConclaveResult<()>;
}
