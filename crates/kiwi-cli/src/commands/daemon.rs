//! Foreground daemon: runs the daily pass on a fixed interval until Ctrl-C.

use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use kiwi_core::scheduler::{run_daily_once, spawn_daily_ticker};
use kiwi_core::Config;

use crate::context::{CmdResult, Context};

#[derive(Args)]
pub struct DaemonArgs {
    /// Seconds between passes (default: scheduler.interval_secs)
    #[arg(long)]
    interval: Option<u64>,
}

pub fn run(args: DaemonArgs, config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;
    let interval = args
        .interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.scheduler_interval());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let engine = Arc::new(ctx.engine);
        let clock = Arc::new(ctx.clock);

        // catch up before waiting on the first interval
        let first = run_daily_once(Arc::clone(&engine), Arc::clone(&clock)).await?;
        tracing::info!(
            as_of = %first.as_of,
            created = first.materialized.occurrences_created,
            misses = first.misses_recorded,
            "startup pass complete"
        );

        let shutdown = Arc::new(Notify::new());
        let ticker = spawn_daily_ticker(engine, clock, interval, Arc::clone(&shutdown));

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutting down");
        shutdown.notify_one();
        ticker.await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
