//! Materialization and day rollover. Dates default to today in the
//! configured timezone.

use chrono::NaiveDate;
use clap::Args;

use kiwi_core::recurrence::parse_date;
use kiwi_core::{Clock, Config};

use crate::context::{print_json, with_retry, CmdResult, Context};

#[derive(Args)]
pub struct MaterializeArgs {
    /// Only this template (default: every template)
    #[arg(long)]
    template: Option<String>,
    /// Generate occurrences due on or before this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    as_of: Option<NaiveDate>,
}

#[derive(Args)]
pub struct RolloverArgs {
    /// The new day (YYYY-MM-DD); occurrences due before it count as missed
    #[arg(long, value_parser = parse_date)]
    today: Option<NaiveDate>,
}

#[derive(Args)]
pub struct DailyArgs {
    /// Run as if this were today (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    as_of: Option<NaiveDate>,
}

pub fn materialize(args: MaterializeArgs, config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;
    let as_of = args.as_of.unwrap_or_else(|| ctx.clock.today());

    match args.template {
        Some(id) => {
            let result = with_retry(|| ctx.engine.materialize(&id, as_of, ctx.clock.now()))?;
            print_json(&result)
        }
        None => {
            let result = ctx.engine.materialize_all(as_of, ctx.clock.now())?;
            print_json(&result)
        }
    }
}

pub fn rollover(args: RolloverArgs, config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;
    let today = args.today.unwrap_or_else(|| ctx.clock.today());
    let events = ctx.engine.day_rollover(today, ctx.clock.now())?;
    print_json(&events)
}

pub fn daily(args: DailyArgs, config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;
    let as_of = args.as_of.unwrap_or_else(|| ctx.clock.today());
    let run = ctx.engine.run_daily(as_of, ctx.clock.now())?;
    print_json(&run)
}
