//! The persistence boundary used by the engine.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{CoreError, InvalidRuleError, Result};
use crate::gamification::{GamificationState, StreakState};
use crate::task::{Task, TaskFilter};

/// A completion and its streak/XP effects, written in one transaction.
#[derive(Debug, Clone, Copy)]
pub struct CompletionCommit<'a> {
    /// Task row as it should be stored (status `done`, `completed_at` set)
    pub task: &'a Task,
    /// `updated_at` observed when the task was read
    pub expected_updated_at: DateTime<Utc>,
    pub streak: Option<&'a StreakState>,
    pub gamification: Option<&'a GamificationState>,
    /// XP credited to the task; a ledger row is written when `gamification` is set
    pub xp_awarded: u64,
}

/// Transactional task, streak and gamification storage.
///
/// Compound writes are all-or-nothing. Writes that depend on a value read
/// earlier compare it in the same transaction and fail with
/// [`CoreError::ConcurrentModification`] if it changed:
///
/// - template cursor: `last_materialized_date`
/// - task rows: `updated_at`
/// - streak and gamification rows: `version`
pub trait TaskStore: Send + Sync {
    fn insert_task(&self, task: &Task) -> Result<()>;

    fn get_task(&self, id: &str) -> Result<Option<Task>>;

    /// Overwrite a task if its stored `updated_at` still equals `expected_updated_at`.
    fn update_task(&self, task: &Task, expected_updated_at: DateTime<Utc>) -> Result<()>;

    /// Delete a task. A plain task takes its subtasks with it; a template's
    /// occurrences are kept. Returns the number of rows removed.
    fn delete_task(&self, id: &str) -> Result<usize>;

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Every task, unpaged. Used by analytics.
    fn all_tasks(&self) -> Result<Vec<Task>>;

    /// Sorted, de-duplicated tags across all tasks.
    fn all_tags(&self) -> Result<Vec<String>>;

    /// Load a template.
    ///
    /// # Errors
    /// [`CoreError::NotFound`] if absent, [`InvalidRuleError::NotATemplate`]
    /// if the task has no recurrence rule.
    fn get_template(&self, id: &str) -> Result<Task> {
        let task = self
            .get_task(id)?
            .ok_or_else(|| CoreError::not_found("task", id))?;
        if !task.is_template() {
            return Err(InvalidRuleError::NotATemplate(id.to_string()).into());
        }
        Ok(task)
    }

    /// Ids of every template, oldest first.
    fn template_ids(&self) -> Result<Vec<String>>;

    /// Insert `occurrences` and move the template's cursor from
    /// `expected_last` to `new_last`, atomically.
    fn save_occurrences_and_advance(
        &self,
        template_id: &str,
        expected_last: Option<NaiveDate>,
        new_last: NaiveDate,
        occurrences: &[Task],
    ) -> Result<()>;

    fn get_streak_state(&self, template_id: &str) -> Result<Option<StreakState>>;

    /// Store a streak, comparing its `version` with the stored row (0 means
    /// the row must not exist yet).
    fn save_streak_state(&self, state: &StreakState) -> Result<()>;

    fn get_gamification(&self) -> Result<Option<GamificationState>>;

    /// The template's occurrence with the latest due date before `due`.
    fn previous_occurrence(&self, template_id: &str, due: NaiveDate) -> Result<Option<Task>>;

    /// Open occurrences of the template due strictly before `date`.
    fn open_occurrences_due_before(&self, template_id: &str, date: NaiveDate) -> Result<Vec<Task>>;

    /// Whether the task already earned XP.
    fn is_credited(&self, task_id: &str) -> Result<bool>;

    /// Write a completion together with its streak, gamification and ledger rows.
    fn commit_completion(&self, commit: CompletionCommit<'_>) -> Result<()>;

    /// Persist a rollover's streak update.
    fn commit_rollover(&self, streak: &StreakState) -> Result<()> {
        self.save_streak_state(streak)
    }
}
