//! Weekly timetable service.
//!
//! Firing times are computed in Korea Standard Time. The loop naps in
//! bounded steps so a suspended host or a clock jump is corrected on the
//! next wake-up.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, TimeDelta, Weekday};
use lotto645_core::tasks::{self, TaskEnv, kst_now};
use lotto645_core::{Config, ScheduleEntry};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

const MAX_NAP: Duration = Duration::from_secs(600);

/// The first instant strictly after `now` that falls on `weekday` at `time`.
pub fn next_fire(
    now: DateTime<FixedOffset>,
    weekday: Weekday,
    time: NaiveTime,
) -> DateTime<FixedOffset> {
    let local = now.naive_local();
    let days_ahead = (i64::from(weekday.num_days_from_monday())
        - i64::from(local.weekday().num_days_from_monday()))
    .rem_euclid(7);
    let mut at = (local.date() + TimeDelta::days(days_ahead)).and_time(time);
    if at <= local {
        at += TimeDelta::days(7);
    }
    now + (at - local)
}

/// The entry that fires soonest after `now`, with its firing time. Ties go
/// to the entry listed first.
pub fn next_due(
    schedule: &[ScheduleEntry],
    now: DateTime<FixedOffset>,
) -> Option<(ScheduleEntry, DateTime<FixedOffset>)> {
    schedule
        .iter()
        .map(|entry| (*entry, next_fire(now, entry.weekday, entry.time)))
        .min_by_key(|(_, at)| *at)
}

/// Runs scheduled tasks until SIGINT or SIGTERM. A task already running
/// when the signal arrives is allowed to finish.
pub async fn run(config: Arc<Config>, env: Arc<TaskEnv>) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT")?;

    for entry in &config.schedule {
        info!(task = %entry.task, weekday = %entry.weekday, time = %entry.time, "scheduled");
    }

    loop {
        let now = kst_now();
        let Some((entry, at)) = next_due(&config.schedule, now) else {
            bail!("schedule has no entries");
        };
        let wait = (at - now).to_std().unwrap_or_default();
        let nap = wait.min(MAX_NAP);
        if nap == wait {
            info!(task = %entry.task, at = %at.to_rfc3339(), "next run");
        }

        tokio::select! {
            () = tokio::time::sleep(nap) => {},
            _ = sigterm.recv() => {
                info!("received SIGTERM, stopping");
                break;
            },
            _ = sigint.recv() => {
                info!("received SIGINT, stopping");
                break;
            },
        }
        if nap < wait {
            continue;
        }

        let config = Arc::clone(&config);
        let env = Arc::clone(&env);
        let kind = entry.task;
        match tokio::task::spawn_blocking(move || tasks::run(kind, &config.accounts, &env)).await
        {
            Ok(summary) => info!(
                task = %kind,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "scheduled run complete"
            ),
            Err(err) => error!(task = %kind, error = %err, "scheduled run aborted"),
        }
    }

    info!("scheduler stopped");
    Ok(())
}
