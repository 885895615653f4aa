//! Per-template habit streaks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of slots in the completion grid.
pub const GRID_SLOTS: usize = 7;

/// Fixed-size window of the most recent completion results, oldest first.
///
/// Pushing a value evicts the oldest slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionGrid([bool; GRID_SLOTS]);

impl CompletionGrid {
    pub fn push(&mut self, completed: bool) {
        self.0.rotate_left(1);
        self.0[GRID_SLOTS - 1] = completed;
    }

    pub fn slots(&self) -> &[bool; GRID_SLOTS] {
        &self.0
    }

    /// Compact `0`/`1` form used for storage, e.g. `"0011011"`.
    pub fn to_bits(&self) -> String {
        self.0.iter().map(|slot| if *slot { '1' } else { '0' }).collect()
    }

    /// Parse the form produced by [`to_bits`](Self::to_bits).
    pub fn from_bits(bits: &str) -> Option<Self> {
        if bits.len() != GRID_SLOTS {
            return None;
        }
        let mut grid = [false; GRID_SLOTS];
        for (slot, c) in grid.iter_mut().zip(bits.chars()) {
            *slot = match c {
                '1' => true,
                '0' => false,
                _ => return None,
            };
        }
        Some(CompletionGrid(grid))
    }
}

impl fmt::Display for CompletionGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for slot in self.0 {
            f.write_str(if slot { "■" } else { "□" })?;
        }
        Ok(())
    }
}

/// Streak bookkeeping for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub template_id: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completed_date: Option<NaiveDate>,
    /// Latest due date already counted as missed by a rollover
    pub last_missed_due_date: Option<NaiveDate>,
    pub grid: CompletionGrid,
    /// Row version for compare-and-set writes; 0 until first stored
    pub version: i64,
}

/// How a reconciliation step moved the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// On-time completion continued the run
    Extended,
    /// Late or out-of-sequence completion started a new run at 1
    Restarted,
    /// A due occurrence passed without completion
    Broken,
}

/// Before/after view of a streak update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakDelta {
    pub template_id: String,
    pub change: StreakChange,
    pub previous_streak: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl StreakState {
    pub fn new(template_id: impl Into<String>) -> Self {
        StreakState {
            template_id: template_id.into(),
            current_streak: 0,
            longest_streak: 0,
            last_completed_date: None,
            last_missed_due_date: None,
            grid: CompletionGrid::default(),
            version: 0,
        }
    }

    /// Record completion of the occurrence due on `due` on day `completed_on`.
    ///
    /// `previous_done` says whether the template's previous due occurrence
    /// was completed; pass `true` when there is none.
    pub fn record_completion(
        &mut self,
        due: NaiveDate,
        completed_on: NaiveDate,
        previous_done: bool,
    ) -> StreakDelta {
        let before = self.current_streak;
        let change = if completed_on <= due && previous_done {
            self.current_streak = self.current_streak.saturating_add(1);
            StreakChange::Extended
        } else {
            self.current_streak = 1;
            StreakChange::Restarted
        };
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_completed_date = Some(
            self.last_completed_date
                .map_or(completed_on, |last| last.max(completed_on)),
        );
        self.grid.push(true);
        self.delta(change, before)
    }

    /// Record that the occurrence due on `due` passed uncompleted.
    ///
    /// Returns `None` if that due date was already counted, so repeated
    /// rollovers for the same day do not push extra misses.
    pub fn record_miss(&mut self, due: NaiveDate) -> Option<StreakDelta> {
        if self.last_missed_due_date.is_some_and(|last| due <= last) {
            return None;
        }
        let before = self.current_streak;
        self.current_streak = 0;
        self.last_missed_due_date = Some(due);
        self.grid.push(false);
        Some(self.delta(StreakChange::Broken, before))
    }

    fn delta(&self, change: StreakChange, before: u32) -> StreakDelta {
        StreakDelta {
            template_id: self.template_id.clone(),
            change,
            previous_streak: before,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
        }
    }
}
