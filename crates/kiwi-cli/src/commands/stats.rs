use clap::Subcommand;

use kiwi_core::stats;
use kiwi_core::{Clock, Config, TaskStore};

use crate::context::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Task counts by status and priority
    Summary,
    /// Share of tasks completed
    Rate,
    /// Completions per day
    Daily {
        /// Number of days ending today
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Completions per Monday-based week
    Weekly {
        /// Number of weeks ending with the current one
        #[arg(long, default_value_t = 12)]
        weeks: u32,
    },
    /// Completed today, this week and this month
    Productivity,
    /// Average hours from creation to completion
    Time,
}

pub fn run(action: StatsAction, config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;
    let tasks = ctx.engine.store().all_tasks()?;
    let today = ctx.clock.today();
    let offset = ctx.clock.offset();

    match action {
        StatsAction::Summary => print_json(&stats::summary(&tasks)),
        StatsAction::Rate => print_json(&stats::completion_rate(&tasks)),
        StatsAction::Daily { days } => {
            print_json(&stats::daily_completions(&tasks, today, days, offset))
        }
        StatsAction::Weekly { weeks } => {
            print_json(&stats::weekly_completions(&tasks, today, weeks, offset))
        }
        StatsAction::Productivity => print_json(&stats::productivity(&tasks, today, offset)),
        StatsAction::Time => print_json(&stats::average_completion_hours(&tasks)),
    }
}
