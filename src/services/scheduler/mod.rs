//! Scheduler (C9, §4.9) — cron/interval polling with leader-gated,
//! cluster-wide at-most-once-per-tick execution.

pub mod cron;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::ConclaveResult;
use crate::domain::models::{RunStatus, Schedule, ScheduleRun, ScheduleStatus};
use crate::domain::ports::{ScheduleFilter, ScheduleRepository};
use crate::services::cluster::{ConsensusClient, LockService};
use crate::services::orgchart::PatternExecutor;

pub const SCHEDULER_LOCK_RESOURCE: &str = "SCHEDULER_RUN";
const SCHEDULER_LOCK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Truncate stored error messages so a runaway pattern failure can't bloat
/// the `schedule_run` table.
const ERROR_MESSAGE_MAX_LEN: usize = 2048;

pub struct Scheduler {
    repo: Arc<dyn ScheduleRepository>,
    consensus: Arc<ConsensusClient>,
    locks: Arc<LockService>,
    executor: Arc<dyn PatternExecutor>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        repo: Arc<dyn ScheduleRepository>,
        consensus: Arc<ConsensusClient>,
        locks: Arc<LockService>,
        executor: Arc<dyn PatternExecutor>,
    ) -> Self {
        Self {
            repo,
            consensus,
            locks,
            executor,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawns the poll loop; the returned handle should be aborted on
    /// shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                if let Err(err) = self.tick().await {
                    error!(error = %err, "scheduler tick failed");
                }
            }
        })
    }

    async fn tick(&self) -> ConclaveResult<()> {
        if !self.consensus.is_leader() {
            return Ok(());
        }
        let repo = self.repo.clone();
        let executor = self.executor.clone();
        self.locks
            .try_with_lock(SCHEDULER_LOCK_RESOURCE, SCHEDULER_LOCK_TTL, || async move {
                run_due(&repo, &executor).await
            })
            .await?;
        Ok(())
    }

    /// `triggerSchedule(id)`: a manual run with `scheduledFor = now`,
    /// advancing `nextRunAt` as usual on completion.
    pub async fn trigger_schedule(&self, id: Uuid) -> ConclaveResult<()> {
        let Some(mut schedule) = self.repo.get(id).await? else {
            return Ok(());
        };
        execute_one(&self.repo, &self.executor, &mut schedule).await
    }
}

async fn run_due(repo: &Arc<dyn ScheduleRepository>, executor: &Arc<dyn PatternExecutor>) -> ConclaveResult<()> {
    let now = Utc::now();
    let due = repo.list_due(now).await?;
    for mut schedule in due {
        if schedule.has_exhausted_runs() {
            schedule.status = ScheduleStatus::Completed;
            repo.update(&schedule).await?;
            continue;
        }
        execute_one(repo, executor, &mut schedule).await?;
    }
    Ok(())
}

async fn execute_one(
    repo: &Arc<dyn ScheduleRepository>,
    executor: &Arc<dyn PatternExecutor>,
    schedule: &mut Schedule,
) -> ConclaveResult<()> {
    let now = Utc::now();
    let mut run = ScheduleRun::start(schedule.id, now);
    repo.record_run(&run).await?;

    let status = match executor.execute_pattern(&schedule.pattern_name, schedule.input.clone()).await {
        Ok(_) => {
            info!(schedule_id = %schedule.id, "schedule run completed");
            run.status = RunStatus::Completed;
            RunStatus::Completed
        }
        Err(err) => {
            warn!(schedule_id = %schedule.id, error = %err, "schedule run failed");
            let mut message = err.to_string();
            message.truncate(ERROR_MESSAGE_MAX_LEN);
            run.error = Some(message);
            run.status = RunStatus::Failure;
            RunStatus::Failure
        }
    };
    run.completed_at = Some(Utc::now());
    run.duration_ms = Some((run.completed_at.unwrap() - run.started_at).num_milliseconds());
    repo.update_run(&run).await?;

    let next_run_at = cron::next_run_after(&schedule.spec, &schedule.timezone, now)?;
    schedule.record_run(next_run_at, status, now);
    repo.update(schedule).await
}
