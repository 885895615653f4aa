//! # Kiwi Core Library
//!
//! Core logic for kiwi, a personal task tracker with recurring tasks,
//! habit streaks and XP. Everything is available through the `kiwi` CLI,
//! which is a thin layer over this library.
//!
//! ## Architecture
//!
//! - **Recurrence**: pure date arithmetic turning a rule into a series of
//!   due dates
//! - **Materializer**: plans the occurrences a template still owes up to a
//!   given date; the template's `last_materialized_date` is the only record
//!   of what was already generated
//! - **Gamification**: streak, XP, level and badge rules applied on
//!   completion and on day rollover
//! - **Storage**: SQLite task store with atomic compound writes and
//!   compare-and-set checks, plus TOML configuration
//! - **Engine**: ties the above together and serializes work per template
//!
//! No computation here reads the wall clock; callers pass "now" and "today"
//! explicitly, usually from a [`Clock`].
//!
//! ## Key Components
//!
//! - [`TaskEngine`]: entry point for every operation
//! - [`TaskDb`]: SQLite implementation of [`TaskStore`]
//! - [`Config`]: application configuration management

pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod gamification;
pub mod materializer;
pub mod recurrence;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod task;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{retry_on_conflict, DailyRun, Profile, TaskEngine, TaskUpdate};
pub use error::{ConfigError, CoreError, DatabaseError, InvalidRuleError, ValidationError};
pub use events::Event;
pub use gamification::{Badge, GamificationConfig, GamificationState, StreakState};
pub use materializer::{materialize_due, Materialization, RollforwardStats};
pub use recurrence::{next_occurrence, Frequency, RecurrenceRule};
pub use storage::{Config, TaskDb, TaskStore};
pub use task::{NewTask, Priority, Task, TaskFilter, TaskPatch, TaskStatus};
