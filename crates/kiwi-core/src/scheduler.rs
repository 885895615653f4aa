//! Background daily ticker.
//!
//! Materialization and rollover are idempotent for a given date, so the
//! ticker simply runs [`TaskEngine::run_daily`] for the clock's current date
//! on every tick. A new calendar day is picked up within one interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::engine::{DailyRun, TaskEngine};
use crate::error::Result;
use crate::storage::TaskStore;

/// Run one daily pass on a blocking thread.
///
/// # Errors
/// Returns the engine's error, or a panic in the pass as an I/O error.
pub async fn run_daily_once<S, C>(engine: Arc<TaskEngine<S>>, clock: Arc<C>) -> Result<DailyRun>
where
    S: TaskStore + 'static,
    C: Clock + ?Sized + 'static,
{
    let (today, now) = (clock.today(), clock.now());
    tokio::task::spawn_blocking(move || engine.run_daily(today, now))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?
}

/// Spawn a loop running the daily pass every `interval` until `shutdown`
/// is notified.
pub fn spawn_daily_ticker<S, C>(
    engine: Arc<TaskEngine<S>>,
    clock: Arc<C>,
    interval: Duration,
    shutdown: Arc<Notify>,
) -> JoinHandle<()>
where
    S: TaskStore + 'static,
    C: Clock + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "daily ticker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = shutdown.notified() => break,
            }

            match run_daily_once(Arc::clone(&engine), Arc::clone(&clock)).await {
                Ok(run) if !run.events.is_empty() => tracing::info!(
                    as_of = %run.as_of,
                    created = run.materialized.occurrences_created,
                    misses = run.misses_recorded,
                    "daily pass applied changes"
                ),
                Ok(run) => tracing::debug!(as_of = %run.as_of, "daily pass found nothing to do"),
                Err(e) => tracing::warn!(error = %e, "daily pass failed"),
            }
        }

        tracing::info!("daily ticker stopped");
    })
}
