//! Cron/interval advance (§4.9 "Cron semantics"). Standard 5/6-field cron,
//! timezone-aware; invalid expressions are rejected eagerly so they never
//! reach the poll loop.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::models::ScheduleSpec;

pub fn validate_spec(spec: &ScheduleSpec, timezone: &str) -> ConclaveResult<()> {
    parse_timezone(timezone)?;
    match spec {
        ScheduleSpec::Cron { expression } => {
            cron::Schedule::from_str(expression)
                .map(|_| ())
                .map_err(|err| ConclaveError::InvalidCronExpression(err.to_string()))
        }
        ScheduleSpec::Interval { interval_ms } => {
            if *interval_ms < 1000 {
                return Err(ConclaveError::InvalidSchedule("intervalMs must be >= 1000".to_string()));
            }
            Ok(())
        }
    }
}

fn parse_timezone(timezone: &str) -> ConclaveResult<Tz> {
    Tz::from_str(timezone).map_err(|_| ConclaveError::InvalidSchedule(format!("unknown timezone {timezone}")))
}

/// Computes the next fire time strictly after `now`.
pub fn next_run_after(spec: &ScheduleSpec, timezone: &str, now: DateTime<Utc>) -> ConclaveResult<DateTime<Utc>> {
    match spec {
        ScheduleSpec::Interval { interval_ms } => Ok(now + chrono::Duration::milliseconds(*interval_ms as i64)),
        ScheduleSpec::Cron { expression } => {
            let tz = parse_timezone(timezone)?;
            let schedule = cron::Schedule::from_str(expression)
                .map_err(|err| ConclaveError::InvalidCronExpression(err.to_string()))?;
            let now_in_tz = now.with_timezone(&tz);
            schedule
                .after(&now_in_tz)
                .next()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ConclaveError::InvalidCronExpression(expression.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_cron_expression() {
        let spec = ScheduleSpec::Cron { expression: "not a cron".to_string() };
        assert!(validate_spec(&spec, "UTC").is_err());
    }

    #[test]
    fn interval_advances_by_exact_duration() {
        let spec = ScheduleSpec::Interval { interval_ms: 60_000 };
        let now = Utc::now();
        let next = next_run_after(&spec, "UTC", now).unwrap();
        assert_eq!((next - now).num_milliseconds(), 60_000);
    }

    #[test]
    fn cron_advances_to_a_later_instant() {
        let spec = ScheduleSpec::Cron { expression: "0 0 * * * *".to_string() };
        let now = Utc::now();
        let next = next_run_after(&spec, "UTC", now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let spec = ScheduleSpec::Interval { interval_ms: 5000 };
        assert!(validate_spec(&spec, "Mars/Olympus").is_err());
    }
}
