use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ScheduleSettings;
use crate::db::Database;

use super::collect::Collector;
use super::window::ActiveWindow;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Source of local wall-clock time; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlSettings {
    pub window: ActiveWindow,
    pub cycle_interval: Duration,
    pub error_backoff: Duration,
}

impl From<&ScheduleSettings> for CrawlSettings {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            window: ActiveWindow::from(settings),
            cycle_interval: Duration::from_secs(settings.cycle_interval_secs),
            error_backoff: Duration::from_secs(settings.error_backoff_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub saved: usize,
    pub failed: usize,
}

/// Load active locations, collect them, append the successes.
/// Only storage failures surface as errors; provider failures are counted.
pub async fn run_cycle(
    db: &Database,
    collector: &Collector,
    captured_at: NaiveDateTime,
) -> Result<CycleSummary> {
    let cycle_start = Instant::now();

    let locations = db
        .list_active_locations()
        .await
        .context("failed to load active locations")?;

    let outcome = collector.collect(&locations, captured_at).await;

    let saved = db
        .insert_traffic_readings(&outcome.readings)
        .await
        .context("failed to persist traffic readings")?;

    log_info!(
        "cycle at {} saved {} rows, {} locations failed ({}ms)",
        captured_at.format("%H:%M:%S"),
        saved,
        outcome.failures.len(),
        cycle_start.elapsed().as_millis()
    );

    Ok(CycleSummary {
        saved,
        failed: outcome.failures.len(),
    })
}

/// Returns true when cancelled before `duration` elapsed.
async fn sleep_or_cancel(duration: Duration, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = cancel_token.cancelled() => true,
    }
}

/// Main crawler loop. Outside the active window it sleeps until the next
/// window start and then re-checks the clock; inside it runs one cycle and
/// sleeps the cycle interval. Cycle errors back off and continue. Every
/// sleep wakes immediately on cancellation.
pub async fn crawl_loop(
    db: Database,
    collector: Arc<Collector>,
    settings: CrawlSettings,
    clock: Clock,
    cancel_token: CancellationToken,
) {
    let mut current_date: Option<NaiveDate> = None;

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        let now = clock();
        if current_date != Some(now.date()) {
            log_info!("collection day {}", now.format("%d/%m/%Y"));
            current_date = Some(now.date());
        }

        if !settings.window.contains(now) {
            let wait_secs = settings.window.seconds_until_start(now).max(1);
            log_info!(
                "outside active hours [{}:00, {}:00), sleeping {}s",
                settings.window.start_hour,
                settings.window.end_hour,
                wait_secs
            );
            if sleep_or_cancel(Duration::from_secs(wait_secs), &cancel_token).await {
                break;
            }
            continue;
        }

        let pause = match run_cycle(&db, &collector, now).await {
            Ok(_) => settings.cycle_interval,
            Err(err) => {
                log_error!(
                    "collection cycle failed, retrying in {}s: {err:?}",
                    settings.error_backoff.as_secs()
                );
                settings.error_backoff
            }
        };

        if sleep_or_cancel(pause, &cancel_token).await {
            break;
        }
    }

    log_info!("crawl loop shutting down");
}
