//! Habit streaks, XP, levels and badges.
//!
//! Streaks are tracked per template; XP, level and badges live in a single
//! per-user [`GamificationState`] record. Both are only ever changed by the
//! [`Reconciler`].

mod badges;
mod reconciler;
mod streak;
mod xp;

pub use badges::{Badge, Progress};
pub use reconciler::{Completion, ReconcileOutcome, Reconciler, RolloverOutcome};
pub use streak::{CompletionGrid, StreakChange, StreakDelta, StreakState, GRID_SLOTS};
pub use xp::{GamificationConfig, GamificationState};
