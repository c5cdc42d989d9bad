//! Background Maintenance Scheduler
//!
//! Drives the retention service on a fixed local-time cadence: the
//! sourcemap sweep daily at 02:00, columnar table optimization weekly on
//! Monday at 03:00. No cron dependency; the loop computes the next
//! occurrence and sleeps until it.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveTime, Weekday};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use beacon_application::RetentionService;

/// Daily sweep time
const SWEEP_TIME: (u32, u32) = (2, 0);
/// Weekly optimize time, on Monday
const OPTIMIZE_TIME: (u32, u32) = (3, 0);
/// Table optimized weekly
const OPTIMIZE_TABLE: &str = "error_logs";

/// Next occurrence of `hh:mm` local time, strictly after `now`
fn next_daily(now: DateTime<Local>, hh: u32, mm: u32) -> DateTime<Local> {
    let time = NaiveTime::from_hms_opt(hh, mm, 0).unwrap_or_default();
    let today = now.date_naive().and_time(time);
    let candidate = today
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or(now);
    if candidate > now {
        candidate
    } else {
        (today + ChronoDuration::days(1))
            .and_local_timezone(Local)
            .earliest()
            .unwrap_or(now + ChronoDuration::days(1))
    }
}

/// Next occurrence of `weekday hh:mm` local time, strictly after `now`
fn next_weekly(now: DateTime<Local>, weekday: Weekday, hh: u32, mm: u32) -> DateTime<Local> {
    let mut candidate = next_daily(now, hh, mm);
    while candidate.weekday() != weekday {
        candidate += ChronoDuration::days(1);
    }
    candidate
}

/// Spawn both maintenance loops; they stop when `shutdown` fires
pub fn spawn_maintenance(
    retention: Arc<RetentionService>,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let sweep_retention = Arc::clone(&retention);
    let sweep_shutdown = shutdown.clone();
    let sweep = tokio::spawn(async move {
        loop {
            let now = Local::now();
            let next = next_daily(now, SWEEP_TIME.0, SWEEP_TIME.1);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(at = %next, "next sourcemap sweep scheduled");
            tokio::select! {
                () = sweep_shutdown.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            if let Err(e) = sweep_retention.sweep_sourcemaps().await {
                warn!(error = %e, "scheduled sourcemap sweep failed");
            }
        }
    });

    let optimize_shutdown = shutdown;
    let optimize = tokio::spawn(async move {
        loop {
            let now = Local::now();
            let next = next_weekly(now, Weekday::Mon, OPTIMIZE_TIME.0, OPTIMIZE_TIME.1);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(at = %next, "next table optimization scheduled");
            tokio::select! {
                () = optimize_shutdown.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            if let Err(e) = retention.optimize_table(OPTIMIZE_TABLE).await {
                warn!(error = %e, "scheduled optimization failed");
            }
        }
    });

    vec![sweep, optimize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .earliest()
            .expect("valid local time")
    }

    #[test]
    fn daily_rolls_to_tomorrow_after_the_slot() {
        let before = local(2026, 3, 10, 1, 30);
        let next = next_daily(before, 2, 0);
        assert_eq!((next.day(), next.hour(), next.minute()), (10, 2, 0));

        let after = local(2026, 3, 10, 2, 30);
        let next = next_daily(after, 2, 0);
        assert_eq!((next.day(), next.hour()), (11, 2));
    }

    #[test]
    fn weekly_lands_on_monday() {
        // 2026-03-10 is a Tuesday
        let now = local(2026, 3, 10, 12, 0);
        let next = next_weekly(now, Weekday::Mon, 3, 0);
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!((next.day(), next.hour()), (16, 3));

        // already Monday before 03:00 stays on the same day
        let monday_early = local(2026, 3, 16, 1, 0);
        let next = next_weekly(monday_early, Weekday::Mon, 3, 0);
        assert_eq!((next.day(), next.hour()), (16, 3));
    }
}
