use anyhow::Result;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime};
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

// Upper bound on one sleep, so an edited summary_time is picked up quickly.
const RECHECK_SECONDS: u64 = 30;

/// First local instant strictly after `now` whose wall-clock time is `at`.
///
/// A day where `at` falls into a DST gap is skipped; an ambiguous time takes
/// the earlier of the two instants.
pub fn next_run_after(now: DateTime<Local>, at: NaiveTime) -> Option<DateTime<Local>> {
    (0..=2_u64)
        .filter_map(|offset| now.date_naive().checked_add_days(Days::new(offset)))
        .filter_map(|day| day.and_time(at).and_local_timezone(Local).earliest())
        .find(|candidate| *candidate > now)
}

/// Runs `job` once per day at the time returned by `summary_time`.
///
/// `summary_time` is consulted again before every wait, so config edits apply
/// without a restart. `job` receives the calendar day it fired on; a failure
/// is logged and the next day is scheduled as usual.
pub async fn run_daily<T, F, Fut>(mut summary_time: T, mut job: F) -> Result<()>
where
    T: FnMut() -> Result<NaiveTime>,
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut announced: Option<DateTime<Local>> = None;
    let mut last_fired: Option<NaiveDate> = None;

    loop {
        let at = match summary_time() {
            Ok(at) => at,
            Err(error) => {
                error!(error = %error, "summary_time is unusable; retrying");
                sleep(Duration::from_secs(RECHECK_SECONDS)).await;
                continue;
            }
        };

        let now = Local::now();
        let Some(next) = next_run_after(now, at) else {
            error!(at = %at, "no upcoming local time for summary_time");
            sleep(Duration::from_secs(RECHECK_SECONDS)).await;
            continue;
        };

        if announced != Some(next) {
            info!(next_run = %next.format("%Y-%m-%d %H:%M"), "daily summary scheduled");
            announced = Some(next);
        }

        let wait = (next - now).to_std().unwrap_or_default();
        if wait > Duration::from_secs(RECHECK_SECONDS) {
            sleep(Duration::from_secs(RECHECK_SECONDS)).await;
            continue;
        }

        sleep(wait).await;

        let day = next.date_naive();
        if last_fired == Some(day) {
            continue;
        }
        last_fired = Some(day);

        if let Err(error) = job(day).await {
            error!(error = %error, date = %day, "scheduled summary failed");
        }
    }
}
