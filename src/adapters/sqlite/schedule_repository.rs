//! SQLite adapter for `ScheduleRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::ConclaveResult;
use crate::domain::models::{RetryPolicy, RunStatus, Schedule, ScheduleRun, ScheduleSpec, ScheduleStatus};
use crate::domain::ports::{ScheduleFilter, ScheduleRepository};

#[derive(Clone)]
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: String,
    pattern_name: String,
    #[allow(dead_code)]
    spec_type: String,
    spec_data: String,
    timezone: String,
    input: String,
    start_at: Option<String>,
    end_at: Option<String>,
    max_runs: Option<i64>,
    run_count: i64,
    next_run_at: String,
    last_run_at: Option<String>,
    last_run_status: Option<String>,
    status: String,
    retry_policy: Option<String>,
}

fn row_to_schedule(row: ScheduleRow) -> ConclaveResult<Schedule> {
    let spec: ScheduleSpec = serde_json::from_str(&row.spec_data)?;
    let input = serde_json::from_str(&row.input)?;
    let retry_policy: Option<RetryPolicy> = row.retry_policy.map(|s| serde_json::from_str(&s)).transpose()?;

    Ok(Schedule {
        id: parse_uuid(&row.id)?,
        pattern_name: row.pattern_name,
        spec,
        timezone: row.timezone,
        input,
        start_at: parse_optional_datetime(row.start_at)?,
        end_at: parse_optional_datetime(row.end_at)?,
        max_runs: row.max_runs.map(|n| n as u64),
        run_count: row.run_count as u64,
        next_run_at: parse_datetime(&row.next_run_at)?,
        last_run_at: parse_optional_datetime(row.last_run_at)?,
        last_run_status: row.last_run_status.and_then(|s| match s.as_str() {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failure" => Some(RunStatus::Failure),
            _ => None,
        }),
        status: ScheduleStatus::from_str(&row.status).unwrap_or(ScheduleStatus::Active),
        retry_policy,
    })
}

fn spec_type(spec: &ScheduleSpec) -> &'static str {
    match spec {
        ScheduleSpec::Cron { .. } => "cron",
        ScheduleSpec::Interval { .. } => "interval",
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn create(&self, schedule: &Schedule) -> ConclaveResult<()> {
        let id = schedule.id.to_string();
        let spec_data = serde_json::to_string(&schedule.spec)?;
        let input = serde_json::to_string(&schedule.input)?;
        let retry_policy = schedule.retry_policy.as_ref().map(serde_json::to_string).transpose()?;
        let start_at = schedule.start_at.map(|dt| dt.to_rfc3339());
        let end_at = schedule.end_at.map(|dt| dt.to_rfc3339());

        sqlx::query(
            "INSERT INTO schedules
             (id, pattern_name, spec_type, spec_data, timezone, input, start_at, end_at,
              max_runs, run_count, next_run_at, last_run_at, last_run_status, status, retry_policy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(&id)
        .bind(&schedule.pattern_name)
        .bind(spec_type(&schedule.spec))
        .bind(&spec_data)
        .bind(&schedule.timezone)
        .bind(&input)
        .bind(&start_at)
        .bind(&end_at)
        .bind(schedule.max_runs.map(|n| n as i64))
        .bind(schedule.run_count as i64)
        .bind(schedule.next_run_at.to_rfc3339())
        .bind(schedule.last_run_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.last_run_status.map(RunStatus::as_str))
        .bind(schedule.status.as_str())
        .bind(&retry_policy)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> ConclaveResult<Option<Schedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as("SELECT * FROM schedules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_schedule).transpose()
    }

    async fn update(&self, schedule: &Schedule) -> ConclaveResult<()> {
        let spec_data = serde_json::to_string(&schedule.spec)?;
        let input = serde_json::to_string(&schedule.input)?;
        let retry_policy = schedule.retry_policy.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            "UPDATE schedules SET
             pattern_name = ?2, spec_type = ?3, spec_data = ?4, timezone = ?5, input = ?6,
             start_at = ?7, end_at = ?8, max_runs = ?9, run_count = ?10, next_run_at = ?11,
             last_run_at = ?12, last_run_status = ?13, status = ?14, retry_policy = ?15
             WHERE id = ?1",
        )
        .bind(schedule.id.to_string())
        .bind(&schedule.pattern_name)
        .bind(spec_type(&schedule.spec))
        .bind(&spec_data)
        .bind(&schedule.timezone)
        .bind(&input)
        .bind(schedule.start_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.end_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.max_runs.map(|n| n as i64))
        .bind(schedule.run_count as i64)
        .bind(schedule.next_run_at.to_rfc3339())
        .bind(schedule.last_run_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.last_run_status.map(RunStatus::as_str))
        .bind(schedule.status.as_str())
        .bind(&retry_policy)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> ConclaveResult<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: ScheduleFilter) -> ConclaveResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = match filter.status {
            Some(status) => {
                sqlx::query_as("SELECT * FROM schedules WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query_as("SELECT * FROM schedules").fetch_all(&self.pool).await?,
        };
        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn list_due(&self, now: DateTime<Utc>) -> ConclaveResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT * FROM schedules WHERE status = 'active' AND next_run_at <= ?1
             AND (end_at IS NULL OR end_at > ?1)",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn record_run(&self, run: &ScheduleRun) -> ConclaveResult<()> {
        sqlx::query(
            "INSERT INTO schedule_runs
             (id, schedule_id, scheduled_for, started_at, completed_at, duration_ms, status, execution_id, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(run.id.to_string())
        .bind(run.schedule_id.to_string())
        .bind(run.scheduled_for.to_rfc3339())
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(run.duration_ms)
        .bind(run.status.as_str())
        .bind(run.execution_id.map(|id| id.to_string()))
        .bind(&run.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_run(&self, run: &ScheduleRun) -> ConclaveResult<()> {
        sqlx::query(
            "UPDATE schedule_runs SET
             completed_at = ?2, duration_ms = ?3, status = ?4, execution_id = ?5, error = ?6
             WHERE id = ?1",
        )
        .bind(run.id.to_string())
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(run.duration_ms)
        .bind(run.status.as_str())
        .bind(run.execution_id.map(|id| id.to_string()))
        .bind(&run.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::ports::ScheduleFilter;

    async fn setup_test_repo() -> SqliteScheduleRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteScheduleRepository::new(pool)
    }

    fn sample_schedule() -> Schedule {
        Schedule::new(
            "startup-team",
            ScheduleSpec::Interval { interval_ms: 5000 },
            "UTC",
            serde_json::json!({"task": "auth"}),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_get_round_trips_fields() {
        let repo = setup_test_repo().await;
        let schedule = sample_schedule();
        repo.create(&schedule).await.unwrap();

        let fetched = repo.get(schedule.id).await.unwrap().unwrap();
        assert_eq!(fetched.pattern_name, "startup-team");
        assert_eq!(fetched.status, ScheduleStatus::Active);
        assert!(matches!(fetched.spec, ScheduleSpec::Interval { interval_ms: 5000 }));
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_id() {
        let repo = setup_test_repo().await;
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_persists_status_and_run_count() {
        let repo = setup_test_repo().await;
        let mut schedule = sample_schedule();
        repo.create(&schedule).await.unwrap();

        schedule.record_run(Utc::now(), RunStatus::Completed, Utc::now());
        repo.update(&schedule).await.unwrap();

        let fetched = repo.get(schedule.id).await.unwrap().unwrap();
        assert_eq!(fetched.run_count, 1);
        assert_eq!(fetched.last_run_status, Some(RunStatus::Completed));
    }

    #[tokio::test]
    async fn delete_removes_row_and_reports_whether_one_existed() {
        let repo = setup_test_repo().await;
        let schedule = sample_schedule();
        repo.create(&schedule).await.unwrap();

        assert!(repo.delete(schedule.id).await.unwrap());
        assert!(!repo.delete(schedule.id).await.unwrap());
        assert!(repo.get(schedule.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let repo = setup_test_repo().await;
        let active = sample_schedule();
        let mut paused = sample_schedule();
        paused.status = ScheduleStatus::Paused;
        repo.create(&active).await.unwrap();
        repo.create(&paused).await.unwrap();

        let active_only = repo
            .list(ScheduleFilter { status: Some(ScheduleStatus::Active), due_before: None })
            .await
            .unwrap();
        assert_eq!(active_only.len(), 1);
        assert_eq!(active_only[0].id, active.id);
    }

    #[tokio::test]
    async fn list_due_excludes_future_and_expired_schedules() {
        let repo = setup_test_repo().await;
        let now = Utc::now();

        let due = Schedule::new(
            "p", ScheduleSpec::Interval { interval_ms: 1000 }, "UTC",
            serde_json::json!({}), now - chrono::Duration::seconds(1),
        ).unwrap();
        let not_yet = Schedule::new(
            "p", ScheduleSpec::Interval { interval_ms: 1000 }, "UTC",
            serde_json::json!({}), now + chrono::Duration::hours(1),
        ).unwrap();
        let expired = Schedule::new(
            "p", ScheduleSpec::Interval { interval_ms: 1000 }, "UTC",
            serde_json::json!({}), now - chrono::Duration::seconds(1),
        ).unwrap().with_end_at(now - chrono::Duration::seconds(2));

        repo.create(&due).await.unwrap();
        repo.create(&not_yet).await.unwrap();
        repo.create(&expired).await.unwrap();

        let due_rows = repo.list_due(now).await.unwrap();
        assert_eq!(due_rows.len(), 1);
        assert_eq!(due_rows[0].id, due.id);
    }

    #[tokio::test]
    async fn record_and_update_run_round_trips() {
        let repo = setup_test_repo().await;
        let schedule = sample_schedule();
        repo.create(&schedule).await.unwrap();

        let mut run = ScheduleRun::start(schedule.id, Utc::now());
        repo.record_run(&run).await.unwrap();

        run.status = RunStatus::Completed;
        run.completed_at = Some(Utc::now());
        run.duration_ms = Some(42);
        repo.update_run(&run).await.unwrap();
    }
}
