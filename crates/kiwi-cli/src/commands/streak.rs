use clap::Subcommand;

use kiwi_core::{Clock, Config};

use crate::context::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum StreakAction {
    /// Show a template's streak and 7-day grid
    Show {
        /// Template ID
        id: String,
    },
}

pub fn run(action: StreakAction, config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;

    match action {
        StreakAction::Show { id } => {
            let state = ctx.engine.streak(&id)?;
            print_json(&state)?;
        }
    }
    Ok(())
}

pub fn profile(config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;
    print_json(&ctx.engine.profile(ctx.clock.now())?)
}
