//! Shared plumbing for commands: opening the engine, reading the clock and
//! printing results.

use serde::Serialize;

use kiwi_core::engine::DEFAULT_RETRIES;
use kiwi_core::{retry_on_conflict, Clock, Config, CoreError, SystemClock, TaskDb, TaskEngine};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// An engine over the default database plus the configured wall clock.
pub struct Context {
    pub engine: TaskEngine<TaskDb>,
    pub clock: SystemClock,
}

impl Context {
    pub fn open(config: &Config) -> Result<Self, CoreError> {
        let clock = config.clock()?;
        let engine = TaskEngine::new(TaskDb::open()?, config.gamification, clock.offset());
        Ok(Context { engine, clock })
    }
}

/// Run a write, retrying when another process won the race.
pub fn with_retry<T>(op: impl FnMut() -> Result<T, CoreError>) -> Result<T, CoreError> {
    retry_on_conflict(DEFAULT_RETRIES, op)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
