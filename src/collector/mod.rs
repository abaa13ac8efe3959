pub mod input;
pub mod sampler;
pub mod tracker;
pub mod x11;

use crate::collector::sampler::Sampler;
use crate::collector::tracker::{Tracker, Transition};
use crate::config::Config;
use crate::db::EventStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// xprintidle, xdotool name, wmctrl fallback, xdotool pid
const PROBES_PER_TICK: u32 = 4;

/// Polls `sampler` every `polling_seconds` until `cancel` fires, then closes
/// the open interval. `now` yields the epoch second stamped on each sample.
pub async fn run_activity_collector<S, C>(
    config: Arc<Config>,
    store: Arc<EventStore>,
    mut sampler: S,
    now: C,
    cancel: CancellationToken,
) -> Result<()>
where
    S: Sampler,
    C: Fn() -> i64,
{
    let mut ticker = interval(Duration::from_secs(config.polling_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let tick_budget = Duration::from_millis(config.sampler_timeout_ms) * PROBES_PER_TICK;
    let mut tracker = Tracker::new(config.idle_threshold_seconds);

    info!(
        polling_seconds = config.polling_seconds,
        idle_threshold_seconds = config.idle_threshold_seconds,
        "activity collector started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sample = match timeout(tick_budget, sampler.sample()).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(error)) => {
                warn!(error = %error, "no sample this tick");
                continue;
            }
            Err(_) => {
                warn!(budget_ms = tick_budget.as_millis() as u64, "sampler timed out; no sample this tick");
                continue;
            }
        };

        match tracker.observe(store.as_ref(), now(), sample) {
            Transition::Opened {
                kind,
                label,
                closed_duration,
            } => {
                debug!(
                    kind = %kind,
                    label = %label,
                    id = ?tracker.open_id(),
                    started_at = ?tracker.open_started_at(),
                    idle = tracker.is_idle(),
                    closed_duration = ?closed_duration,
                    "interval opened"
                );
            }
            Transition::Refreshed { duration_seconds } => {
                debug!(duration_seconds, "open interval refreshed");
            }
            Transition::Nothing => {}
        }

        if tracker.pending_writes() > 0 {
            debug!(pending = tracker.pending_writes(), "writes waiting for the store");
        }
    }

    let unflushed = tracker.flush(store.as_ref(), now());
    if unflushed > 0 {
        warn!(unflushed, "collector stopped with uncommitted writes");
    }
    info!(label = tracker.open_label().unwrap_or("none"), "activity collector stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::run_activity_collector;
    use crate::collector::sampler::scripted::ScriptedSampler;
    use crate::collector::sampler::{Sample, SamplerError};
    use crate::config::Config;
    use crate::db::{EventStore, IntervalKind};
    use std::sync::Arc;
    use tokio::time::{Duration, Instant, sleep};
    use tokio_util::sync::CancellationToken;

    const T0: i64 = 1_771_400_000;

    #[tokio::test(start_paused = true)]
    async fn loop_skips_failed_ticks_and_flushes_on_cancel() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(EventStore::open(&dir.path().join("activity.db")).expect("store"));
        let config = Arc::new(Config {
            polling_seconds: 5,
            ..Config::default()
        });

        let sampler = ScriptedSampler::new(vec![
            Ok(Sample::active("Editor", "pid:1")),
            Err(SamplerError::Timeout {
                probe: "xprintidle".to_string(),
            }),
            Ok(Sample::active("Editor", "pid:1")),
            Ok(Sample::idle(120)),
        ]);

        let base = Instant::now();
        let clock = move || T0 + base.elapsed().as_secs() as i64;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_activity_collector(
            config,
            Arc::clone(&store),
            sampler,
            clock,
            cancel.clone(),
        ));

        sleep(Duration::from_secs(17)).await;
        cancel.cancel();
        handle.await.expect("join").expect("collector");

        let rows = store.query(None, None, 100).expect("query");
        let kinds = rows.iter().map(|row| row.kind.clone()).collect::<Vec<_>>();
        assert_eq!(kinds, vec![IntervalKind::Window, IntervalKind::Idle]);
        assert_eq!(rows[0].label, "Editor");
        assert_eq!((rows[0].started_at, rows[0].duration_seconds), (T0, 15));
        // closed by the flush at cancel time, two seconds after it opened
        assert_eq!((rows[1].started_at, rows[1].duration_seconds), (T0 + 15, 2));
    }
}
