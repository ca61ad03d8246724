//! Schedule domain model (§3 Schedule, §4.9, §6 logical schema).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{ConclaveError, ConclaveResult};

/// Exactly one of `cron_expression`, `interval_ms` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    Cron { expression: String },
    Interval { interval_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Completed,
}

impl ScheduleStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failure,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub pattern_name: String,
    pub spec: ScheduleSpec,
    pub timezone: String,
    pub input: serde_json::Value,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub max_runs: Option<u64>,
    pub run_count: u64,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub status: ScheduleStatus,
    pub retry_policy: Option<RetryPolicy>,
}

impl Schedule {
    /// Construct and validate the invariants from §3/§8: interval must be
    /// `>= 1000ms`; `maxRuns = 0` is invalid.
    pub fn new(
        pattern_name: impl Into<String>,
        spec: ScheduleSpec,
        timezone: impl Into<String>,
        input: serde_json::Value,
        next_run_at: DateTime<Utc>,
    ) -> ConclaveResult<Self> {
        if let ScheduleSpec::Interval { interval_ms } = &spec {
            if *interval_ms < 1000 {
                return Err(ConclaveError::InvalidSchedule(
                    "intervalMs must be >= 1000".to_string(),
                ));
            }
        }
        Ok(Self {
            id: Uuid::new_v4(),
            pattern_name: pattern_name.into(),
            spec,
            timezone: timezone.into(),
            input,
            start_at: None,
            end_at: None,
            max_runs: None,
            run_count: 0,
            next_run_at,
            last_run_at: None,
            last_run_status: None,
            status: ScheduleStatus::Active,
            retry_policy: None,
        })
    }

    pub fn with_max_runs(mut self, max_runs: u64) -> ConclaveResult<Self> {
        if max_runs == 0 {
            return Err(ConclaveError::InvalidSchedule(
                "maxRuns = 0 is invalid".to_string(),
            ));
        }
        self.max_runs = Some(max_runs);
        Ok(self)
    }

    pub fn with_end_at(mut self, end_at: DateTime<Utc>) -> Self {
        self.end_at = Some(end_at);
        self
    }

    /// True when this schedule is due to fire: active, past its next run
    /// time, and not past its end time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active
            && self.next_run_at <= now
            && self.end_at.is_none_or(|end| end > now)
    }

    pub fn has_exhausted_runs(&self) -> bool {
        self.max_runs.is_some_and(|max| self.run_count >= max)
    }

    pub fn record_run(&mut self, next_run_at: DateTime<Utc>, status: RunStatus, now: DateTime<Utc>) {
        self.run_count += 1;
        self.last_run_at = Some(now);
        self.last_run_status = Some(status);
        self.next_run_at = next_run_at;
        if self.has_exhausted_runs() {
            self.status = ScheduleStatus::Completed;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: RunStatus,
    pub execution_id: Option<Uuid>,
    pub error: Option<String>,
}

impl ScheduleRun {
    pub fn start(schedule_id: Uuid, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            scheduled_for,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            status: RunStatus::Running,
            execution_id: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sub_second_interval() {
        let result = Schedule::new(
            "p",
            ScheduleSpec::Interval { interval_ms: 500 },
            "UTC",
            serde_json::json!({}),
            Utc::now(),
        );
        assert!(matches!(result, Err(ConclaveError::InvalidSchedule(_))));
    }

    #[test]
    fn rejects_zero_max_runs() {
        let schedule = Schedule::new(
            "p",
            ScheduleSpec::Interval { interval_ms: 5000 },
            "UTC",
            serde_json::json!({}),
            Utc::now(),
        )
        .unwrap();
        assert!(schedule.with_max_runs(0).is_err());
    }

    #[test]
    fn completes_after_exhausting_max_runs() {
        let mut schedule = Schedule::new(
            "p",
            ScheduleSpec::Interval { interval_ms: 5000 },
            "UTC",
            serde_json::json!({}),
            Utc::now(),
        )
        .unwrap()
        .with_max_runs(1)
        .unwrap();
        let now = Utc::now();
        schedule.record_run(now, RunStatus::Completed, now);
        assert_eq!(schedule.status, ScheduleStatus::Completed);
    }

    #[test]
    fn end_at_in_past_never_fires() {
        let now = Utc::now();
        let schedule = Schedule::new(
            "p",
            ScheduleSpec::Interval { interval_ms: 5000 },
            "UTC",
            serde_json::json!({}),
            now - chrono::Duration::seconds(10),
        )
        .unwrap()
        .with_end_at(now - chrono::Duration::seconds(1));
        assert!(!schedule.is_due(now));
    }
}
