//! Cron readiness (spec §9, "Cron scheduling").
//!
//! "Ready" means the first scheduled occurrence strictly after `last_run`
//! is `<= now`; a task with no `last_run` yet is always ready. Schedules are
//! the standard 5-field form (minute hour day-of-month month day-of-week,
//! spec §6.3); the `cron` crate parses 6-field expressions with a leading
//! seconds column, so a fixed `"0 "` is prepended before parsing.
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::errors::ConfigError;

pub fn parse_schedule(expr: &str) -> Result<Schedule, ConfigError> {
    let six_field = format!("0 {expr}");
    Schedule::from_str(&six_field).map_err(|_| ConfigError::InvalidSchedule(expr.to_string()))
}

/// Is a `Cron` task with the given `schedule`/`last_run` ready to spawn at `now`?
pub fn is_ready(schedule: &str, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<bool, ConfigError> {
    let schedule = parse_schedule(schedule)?;
    match last_run {
        None => Ok(true),
        Some(last) => Ok(schedule.after(&last).next().is_some_and(|next| next <= now)),
    }
}
