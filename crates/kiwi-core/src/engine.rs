//! Task engine.
//!
//! Orchestrates task CRUD, completion scoring, materialization and day
//! rollover over a [`TaskStore`]. The store makes every compound write
//! atomic and rejects stale writes; the engine additionally serializes
//! read-modify-write sequences in-process:
//!
//! - one lock per template, so materialization, rollover and completion of
//!   the same template's occurrences never interleave while different
//!   templates proceed in parallel
//! - one lock for the gamification record
//!
//! Locks are always taken in the order template, then gamification.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::local_date;
use crate::error::{CoreError, Result, ValidationError};
use crate::events::Event;
use crate::gamification::{
    Completion, GamificationConfig, GamificationState, Reconciler, StreakState,
};
use crate::materializer::{materialize_due, RollforwardStats};
use crate::storage::{CompletionCommit, TaskStore};
use crate::task::{
    normalize_description, validate_title, NewTask, StatusChange, Task, TaskFilter, TaskPatch,
    TaskStatus,
};

/// Attempts made by [`retry_on_conflict`] by default.
pub const DEFAULT_RETRIES: u32 = 3;

/// A task after an update, with everything the update triggered.
#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdate {
    pub task: Task,
    pub events: Vec<Event>,
}

/// Result of deleting several tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkDelete {
    /// Rows removed, subtasks included
    pub deleted: usize,
    pub not_found: Vec<String>,
}

/// One template's materialization.
#[derive(Debug, Clone, Serialize)]
pub struct Materialized {
    pub template_id: String,
    pub created: Vec<Task>,
    pub last_materialized_date: Option<NaiveDate>,
}

/// Outcome of a bulk pass over every template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Rollforward {
    pub stats: RollforwardStats,
    pub events: Vec<Event>,
}

/// Outcome of [`TaskEngine::run_daily`].
#[derive(Debug, Clone, Serialize)]
pub struct DailyRun {
    pub as_of: NaiveDate,
    pub materialized: RollforwardStats,
    /// Missed due dates counted against streaks
    pub misses_recorded: usize,
    pub events: Vec<Event>,
}

/// XP, level and badges, with progress toward the next level.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub state: GamificationState,
    pub next_level_xp: Option<u64>,
    pub xp_to_next_level: Option<u64>,
}

/// Run `op`, retrying while it fails with a retryable error.
///
/// `op` must re-read everything it depends on; a retry starts over from
/// persisted state.
///
/// # Errors
/// Returns the last error once `attempts` are used up, or the first
/// non-retryable error.
pub fn retry_on_conflict<T>(attempts: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::debug!(attempt, error = %e, "retrying after conflict");
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn guard(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    // The guarded value is (), so a poisoned lock carries no broken state.
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recurring-task engine over a [`TaskStore`].
pub struct TaskEngine<S: TaskStore> {
    store: S,
    reconciler: Reconciler,
    offset: FixedOffset,
    template_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    gamification_lock: Mutex<()>,
}

impl<S: TaskStore> TaskEngine<S> {
    /// `offset` is the user's timezone, used to turn completion instants
    /// into calendar dates.
    pub fn new(store: S, config: GamificationConfig, offset: FixedOffset) -> Self {
        TaskEngine {
            store,
            reconciler: Reconciler::new(config),
            offset,
            template_locks: Mutex::new(HashMap::new()),
            gamification_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn template_lock(&self, template_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .template_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(template_id.to_string()).or_default())
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create a task or template.
    ///
    /// # Errors
    /// Validation errors for a bad title or a template parent,
    /// [`InvalidRuleError`](crate::error::InvalidRuleError) for a malformed
    /// rule, `NotFound` for a missing parent.
    pub fn create(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task> {
        let title = validate_title(&new.title)?;
        let mut task = Task::new(title, now)
            .with_priority(new.priority)
            .with_tags(new.tags);
        task.description = normalize_description(new.description);
        task.due_date = new.due_date;
        if let Some(rule) = new.recurrence {
            rule.validate()?;
            task = task.with_recurrence(rule);
        }
        if let Some(parent_id) = new.parent_task_id {
            match self.store.get_task(&parent_id)? {
                None => return Err(CoreError::not_found("parent task", parent_id)),
                // occurrences only come from materialization
                Some(parent) if parent.is_template() => {
                    return Err(ValidationError::invalid(
                        "parent_task_id",
                        format!(
                            "'{parent_id}' is a recurring template; its occurrences are generated"
                        ),
                    )
                    .into());
                }
                Some(_) => {}
            }
            task = task.with_parent(parent_id);
        }

        self.store.insert_task(&task)?;
        tracing::info!(
            task_id = %task.id,
            template = task.is_template(),
            "created task"
        );
        Ok(task)
    }

    /// # Errors
    /// `NotFound` if there is no such task.
    pub fn get(&self, id: &str) -> Result<Task> {
        self.store
            .get_task(id)?
            .ok_or_else(|| CoreError::not_found("task", id))
    }

    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.list_tasks(filter)
    }

    pub fn all_tags(&self) -> Result<Vec<String>> {
        self.store.all_tags()
    }

    /// The template `task` was generated from, if its parent is one.
    fn parent_template(&self, task: &Task) -> Result<Option<String>> {
        let Some(parent_id) = task.parent_task_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_task(parent_id)?
            .filter(Task::is_template)
            .map(|t| t.id))
    }

    fn has_children(&self, id: &str) -> Result<bool> {
        let filter = TaskFilter {
            parent_task_id: Some(id.to_string()),
            limit: 1,
            ..TaskFilter::default()
        };
        Ok(!self.store.list_tasks(&filter)?.is_empty())
    }

    /// Apply a patch. Entering `done` scores the completion in the same
    /// transaction as the task write.
    ///
    /// # Errors
    /// - `NotFound` if there is no such task
    /// - [`ValidationError::TemplateCompletion`] when asked to complete a template
    /// - `ConcurrentModification` if the task or a score record changed meanwhile
    pub fn update(&self, id: &str, patch: TaskPatch, now: DateTime<Utc>) -> Result<TaskUpdate> {
        let task = self.get(id)?;
        let template_id = self.parent_template(&task)?;
        let lock_key = if task.is_template() {
            Some(task.id.clone())
        } else {
            template_id.clone()
        };
        let lock = lock_key.as_deref().map(|key| self.template_lock(key));
        let _template_guard = lock.as_deref().map(guard);

        // Re-read now that no other writer for this template is active.
        let task = self.get(id)?;
        let expected = task.updated_at;
        if patch.recurrence.is_some() && !task.is_template() && self.has_children(&task.id)? {
            return Err(ValidationError::invalid(
                "recurrence",
                "a task with subtasks cannot become a recurring template",
            )
            .into());
        }
        let mut next = task;
        apply_patch(&mut next, &patch, template_id.is_some())?;

        let change = match patch.status {
            Some(status) => next.set_status(status, now),
            None => StatusChange::Unchanged,
        };
        next.updated_at = now;

        match change {
            StatusChange::Completed => {
                let _gamification_guard = guard(&self.gamification_lock);
                let events = self.commit_completion(&next, expected, template_id.as_deref(), now)?;
                Ok(TaskUpdate { task: next, events })
            }
            StatusChange::Reopened => {
                self.store.update_task(&next, expected)?;
                tracing::info!(task_id = %next.id, "reopened task");
                let events = vec![Event::TaskReopened {
                    task_id: next.id.clone(),
                    at: now,
                }];
                Ok(TaskUpdate { task: next, events })
            }
            StatusChange::Moved | StatusChange::Unchanged => {
                self.store.update_task(&next, expected)?;
                tracing::debug!(task_id = %next.id, "updated task");
                Ok(TaskUpdate {
                    task: next,
                    events: Vec::new(),
                })
            }
        }
    }

    /// Mark a task done.
    ///
    /// # Errors
    /// See [`TaskEngine::update`].
    pub fn complete(&self, id: &str, now: DateTime<Utc>) -> Result<TaskUpdate> {
        self.update(id, TaskPatch::status(TaskStatus::Done), now)
    }

    /// Move a task back to `todo`. XP already earned is kept and the task
    /// will not earn it again.
    ///
    /// # Errors
    /// See [`TaskEngine::update`].
    pub fn reopen(&self, id: &str, now: DateTime<Utc>) -> Result<TaskUpdate> {
        self.update(id, TaskPatch::status(TaskStatus::Todo), now)
    }

    /// Score and store a completion. Caller holds the template and
    /// gamification locks.
    fn commit_completion(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
        template_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let previous = match (template_id, task.due_date) {
            (Some(tid), Some(due)) => self.store.previous_occurrence(tid, due)?,
            _ => None,
        };
        let streak = match template_id {
            Some(tid) => self.store.get_streak_state(tid)?,
            None => None,
        };
        let already_credited = self.store.is_credited(&task.id)?;
        let gamification = self.store.get_gamification()?;

        let completion = Completion {
            task,
            template_id,
            previous: previous.as_ref(),
            completed_at: now,
            offset: self.offset,
            already_credited,
        };
        let outcome = self.reconciler.on_completed(completion, streak, gamification);

        self.store.commit_completion(CompletionCommit {
            task,
            expected_updated_at,
            streak: outcome.streak.as_ref(),
            gamification: outcome.gamification.as_ref(),
            xp_awarded: outcome.xp_awarded,
        })?;
        tracing::info!(
            task_id = %task.id,
            template_id = template_id.unwrap_or("-"),
            xp = outcome.xp_awarded,
            credited = !already_credited,
            "completed task"
        );

        let mut events = vec![Event::TaskCompleted {
            task_id: task.id.clone(),
            template_id: template_id.map(str::to_string),
            due_date: task.due_date,
            completed_on: local_date(now, self.offset),
            at: now,
        }];
        events.extend(outcome.events);
        Ok(events)
    }

    /// Delete a task. Subtasks of a plain task go with it; a template's
    /// occurrences stay. Returns the number of rows removed.
    ///
    /// # Errors
    /// `NotFound` if there is no such task.
    pub fn delete(&self, id: &str) -> Result<usize> {
        let task = self.get(id)?;
        let lock = task.is_template().then(|| self.template_lock(id));
        let _template_guard = lock.as_deref().map(guard);
        let removed = self.store.delete_task(id)?;
        tracing::info!(task_id = %id, removed, "deleted task");
        Ok(removed)
    }

    /// Delete each id in turn. Missing ids are reported, not fatal.
    ///
    /// # Errors
    /// Any failure other than a missing id.
    pub fn bulk_delete(&self, ids: &[String]) -> Result<BulkDelete> {
        let mut report = BulkDelete::default();
        for id in ids {
            match self.delete(id) {
                Ok(n) => report.deleted += n,
                Err(CoreError::NotFound { .. }) => report.not_found.push(id.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    /// Generate every occurrence of one template due on or before `as_of`.
    ///
    /// Calling this again with the same `as_of` creates nothing.
    ///
    /// # Errors
    /// `NotFound`, [`InvalidRuleError`](crate::error::InvalidRuleError), or
    /// `ConcurrentModification` if another process advanced the template.
    pub fn materialize(
        &self,
        template_id: &str,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Materialized> {
        let lock = self.template_lock(template_id);
        let _template_guard = guard(&lock);

        let template = self.store.get_template(template_id)?;
        let plan = materialize_due(&template, as_of, now)?;
        let last = plan.new_last;
        match plan.new_last {
            Some(new_last) if !plan.is_empty() => {
                self.store.save_occurrences_and_advance(
                    template_id,
                    plan.expected_last,
                    new_last,
                    &plan.occurrences,
                )?;
                tracing::info!(
                    template_id,
                    created = plan.len(),
                    last_materialized_date = %new_last,
                    "materialized occurrences"
                );
            }
            _ => tracing::debug!(template_id, %as_of, "nothing to materialize"),
        }
        Ok(Materialized {
            template_id: plan.template_id,
            created: plan.occurrences,
            last_materialized_date: last,
        })
    }

    /// Materialize every template. A template that still conflicts after
    /// [`DEFAULT_RETRIES`] attempts, or fails otherwise, is logged and
    /// skipped; the rest still run.
    ///
    /// # Errors
    /// Only if the template list itself cannot be read.
    pub fn materialize_all(&self, as_of: NaiveDate, now: DateTime<Utc>) -> Result<Rollforward> {
        let mut out = Rollforward::default();
        for template_id in self.store.template_ids()? {
            let attempt = || self.materialize(&template_id, as_of, now);
            match retry_on_conflict(DEFAULT_RETRIES, attempt) {
                Ok(m) => {
                    out.stats.record(m.created.len());
                    if !m.created.is_empty() {
                        out.events.push(Event::OccurrencesMaterialized {
                            template_id: m.template_id,
                            due_dates: m.created.iter().filter_map(|t| t.due_date).collect(),
                            last_materialized_date: m.last_materialized_date,
                            at: now,
                        });
                    }
                }
                Err(e @ CoreError::ConcurrentModification { .. }) => {
                    out.stats.templates_scanned += 1;
                    out.stats.conflicts += 1;
                    tracing::warn!(template_id, error = %e, "skipped template");
                }
                Err(e) => {
                    out.stats.templates_scanned += 1;
                    out.stats.errors += 1;
                    tracing::warn!(template_id, error = %e, "skipped template");
                }
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Streaks
    // =========================================================================

    /// Count occurrences due before `today` that are still open as misses.
    ///
    /// Each missed due date breaks its template's streak once, no matter
    /// how many times this runs.
    ///
    /// # Errors
    /// Only if the template list itself cannot be read. Conflicts are
    /// retried per template; other failures are logged and skipped.
    pub fn day_rollover(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for template_id in self.store.template_ids()? {
            let attempt = || self.rollover_template(&template_id, today, now);
            match retry_on_conflict(DEFAULT_RETRIES, attempt) {
                Ok(mut e) => events.append(&mut e),
                Err(e) => tracing::warn!(template_id, error = %e, "rollover skipped template"),
            }
        }
        Ok(events)
    }

    fn rollover_template(
        &self,
        template_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let lock = self.template_lock(template_id);
        let _template_guard = guard(&lock);

        let open = self.store.open_occurrences_due_before(template_id, today)?;
        if open.is_empty() {
            return Ok(Vec::new());
        }
        let streak = self
            .store
            .get_streak_state(template_id)?
            .unwrap_or_else(|| StreakState::new(template_id));
        let Some(outcome) = self.reconciler.on_day_rollover(streak, &open, today, now) else {
            return Ok(Vec::new());
        };
        self.store.commit_rollover(&outcome.streak)?;
        tracing::info!(
            template_id,
            missed = outcome.deltas.len(),
            "streak broken by missed occurrences"
        );
        Ok(outcome.events)
    }

    /// Materialize everything due by `as_of`, then run the day rollover.
    ///
    /// # Errors
    /// See [`TaskEngine::materialize_all`] and [`TaskEngine::day_rollover`].
    pub fn run_daily(&self, as_of: NaiveDate, now: DateTime<Utc>) -> Result<DailyRun> {
        let rollforward = self.materialize_all(as_of, now)?;
        let rollover = self.day_rollover(as_of, now)?;
        let misses_recorded = rollover
            .iter()
            .filter(|e| matches!(e, Event::StreakChanged { .. }))
            .count();

        let mut events = rollforward.events;
        events.extend(rollover);
        tracing::info!(
            %as_of,
            created = rollforward.stats.occurrences_created,
            misses_recorded,
            "daily run finished"
        );
        Ok(DailyRun {
            as_of,
            materialized: rollforward.stats,
            misses_recorded,
            events,
        })
    }

    /// A template's streak; a fresh zero streak if it has none yet.
    ///
    /// # Errors
    /// `NotFound` or `NotATemplate`.
    pub fn streak(&self, template_id: &str) -> Result<StreakState> {
        self.store.get_template(template_id)?;
        Ok(self
            .store
            .get_streak_state(template_id)?
            .unwrap_or_else(|| StreakState::new(template_id)))
    }

    /// The gamification record, or an empty one before the first completion.
    pub fn profile(&self, now: DateTime<Utc>) -> Result<Profile> {
        let state = self
            .store
            .get_gamification()?
            .unwrap_or_else(|| GamificationState::new(now));
        let config = self.reconciler.config();
        Ok(Profile {
            next_level_xp: config.xp_for_level(state.level.saturating_add(1)),
            xp_to_next_level: state.xp_to_next_level(config),
            state,
        })
    }
}

fn apply_patch(task: &mut Task, patch: &TaskPatch, is_occurrence: bool) -> Result<()> {
    if let Some(title) = patch.title.as_deref() {
        task.title = validate_title(title)?;
    }
    if let Some(description) = patch.description.clone() {
        task.description = normalize_description(Some(description));
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = Some(due_date);
    }
    if let Some(tags) = patch.tags.clone() {
        task.tags = tags;
    }
    if let Some(rule) = patch.recurrence {
        if is_occurrence {
            return Err(ValidationError::invalid(
                "recurrence",
                "an occurrence cannot carry its own rule",
            )
            .into());
        }
        rule.validate()?;
        task.recurrence = Some(rule);
    }
    let completes = patch.status == Some(TaskStatus::Done)
        || (patch.status.is_none() && task.status == TaskStatus::Done);
    if task.is_template() && completes {
        return Err(ValidationError::TemplateCompletion(task.id.clone()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamification::{Badge, StreakChange};
    use crate::recurrence::{Frequency, RecurrenceRule};
    use crate::storage::TaskDb;
    use chrono::{Duration, TimeZone};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    /// Noon UTC on the given day of May 2024.
    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    fn engine() -> TaskEngine<TaskDb> {
        TaskEngine::new(
            TaskDb::open_memory().unwrap(),
            GamificationConfig::default(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    fn daily(engine: &TaskEngine<TaskDb>, anchor: NaiveDate) -> Task {
        let mut new = NewTask::titled("Stretch");
        new.recurrence = Some(RecurrenceRule::new(Frequency::Daily, anchor));
        engine.create(new, noon(1)).unwrap()
    }

    fn occurrence_due(engine: &TaskEngine<TaskDb>, template_id: &str, due: NaiveDate) -> Task {
        let mut filter = TaskFilter::default();
        filter.parent_task_id = Some(template_id.to_string());
        engine
            .list(&filter)
            .unwrap()
            .into_iter()
            .find(|t| t.due_date == Some(due))
            .unwrap()
    }

    #[test]
    fn create_validates_input() {
        let engine = engine();
        assert!(matches!(
            engine.create(NewTask::titled("   "), noon(1)),
            Err(CoreError::Validation(_))
        ));

        let mut bad_rule = NewTask::titled("Bad");
        bad_rule.recurrence = Some(RecurrenceRule::new(Frequency::Daily, d(1)).every(0));
        assert!(matches!(
            engine.create(bad_rule, noon(1)),
            Err(CoreError::InvalidRule(_))
        ));

        let mut orphan = NewTask::titled("Orphan");
        orphan.parent_task_id = Some("missing".into());
        assert!(matches!(
            engine.create(orphan, noon(1)),
            Err(CoreError::NotFound { .. })
        ));

        let mut described = NewTask::titled("  Trimmed  ");
        described.description = Some("   ".into());
        let task = engine.create(described, noon(1)).unwrap();
        assert_eq!(task.title, "Trimmed");
        assert_eq!(task.description, None);
    }

    #[test]
    fn subtasks_cannot_be_added_under_a_template() {
        let engine = engine();
        let template = daily(&engine, d(1));
        engine.materialize(&template.id, d(1), noon(1)).unwrap();

        let mut manual = NewTask::titled("Extra stretch");
        manual.parent_task_id = Some(template.id.clone());
        manual.due_date = Some(d(1));
        assert!(matches!(
            engine.create(manual, noon(1)),
            Err(CoreError::Validation(ValidationError::InvalidValue { .. }))
        ));

        let occ = occurrence_due(&engine, &template.id, d(1));
        engine.complete(&occ.id, noon(1)).unwrap();
        let events = engine.day_rollover(d(2), noon(2)).unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.streak(&template.id).unwrap().current_streak, 1);
    }

    #[test]
    fn a_parent_task_cannot_become_a_template() {
        let engine = engine();
        let parent = engine.create(NewTask::titled("Project"), noon(1)).unwrap();
        let mut child = NewTask::titled("Step");
        child.parent_task_id = Some(parent.id.clone());
        engine.create(child, noon(1)).unwrap();

        let patch = TaskPatch {
            recurrence: Some(RecurrenceRule::new(Frequency::Daily, d(1))),
            ..TaskPatch::default()
        };
        assert!(matches!(
            engine.update(&parent.id, patch, noon(2)),
            Err(CoreError::Validation(_))
        ));
        assert!(!engine.get(&parent.id).unwrap().is_template());
    }

    #[test]
    fn materialize_is_idempotent() {
        let engine = engine();
        let template = daily(&engine, d(1));

        let first = engine.materialize(&template.id, d(5), noon(5)).unwrap();
        assert_eq!(first.created.len(), 5);
        assert_eq!(first.last_materialized_date, Some(d(5)));

        let second = engine.materialize(&template.id, d(5), noon(5)).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(engine.store().count_tasks().unwrap(), 6);
        assert_eq!(engine.get(&template.id).unwrap().last_materialized_date, Some(d(5)));
    }

    #[test]
    fn completing_a_template_is_rejected() {
        let engine = engine();
        let template = daily(&engine, d(1));
        assert!(matches!(
            engine.complete(&template.id, noon(1)),
            Err(CoreError::Validation(ValidationError::TemplateCompletion(_)))
        ));
        assert_eq!(engine.get(&template.id).unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn completing_an_occurrence_leaves_the_template_alone() {
        let engine = engine();
        let template = daily(&engine, d(1));
        engine.materialize(&template.id, d(1), noon(1)).unwrap();
        let occ = occurrence_due(&engine, &template.id, d(1));

        let update = engine.complete(&occ.id, noon(1)).unwrap();
        assert_eq!(update.task.status, TaskStatus::Done);
        assert!(update.task.completed_at.is_some());
        assert!(matches!(update.events[0], Event::TaskCompleted { .. }));

        let stored = engine.get(&template.id).unwrap();
        assert_eq!(stored.status, TaskStatus::Todo);
        assert_eq!(stored.completed_at, None);
        assert_eq!(engine.streak(&template.id).unwrap().current_streak, 1);
    }

    #[test]
    fn on_time_completions_extend_the_streak_and_award_bonus_xp() {
        let engine = engine();
        let template = daily(&engine, d(1));
        engine.materialize(&template.id, d(3), noon(3)).unwrap();

        for day in 1..=3 {
            let occ = occurrence_due(&engine, &template.id, d(day));
            engine.complete(&occ.id, noon(day)).unwrap();
        }

        let streak = engine.streak(&template.id).unwrap();
        assert_eq!(streak.current_streak, 3);
        assert_eq!(streak.longest_streak, 3);
        let profile = engine.profile(noon(3)).unwrap();
        // 10 + 2, 10 + 4, 10 + 6
        assert_eq!(profile.state.xp, 42);
        assert_eq!(profile.state.completions, 3);
        assert!(profile.state.badges.contains(&Badge::FirstCompletion));
        assert!(profile.state.badges.contains(&Badge::StreakThree));
    }

    #[test]
    fn plain_task_earns_base_xp_only() {
        let engine = engine();
        let task = engine.create(NewTask::titled("Taxes"), noon(1)).unwrap();
        let update = engine.complete(&task.id, noon(2)).unwrap();
        assert!(update
            .events
            .iter()
            .any(|e| matches!(e, Event::XpAwarded { amount: 10, .. })));
        assert!(!update
            .events
            .iter()
            .any(|e| matches!(e, Event::StreakChanged { .. })));
    }

    #[test]
    fn recompleting_does_not_award_twice() {
        let engine = engine();
        let task = engine.create(NewTask::titled("Dishes"), noon(1)).unwrap();
        engine.complete(&task.id, noon(1)).unwrap();
        engine.reopen(&task.id, noon(1) + Duration::minutes(1)).unwrap();
        assert_eq!(engine.get(&task.id).unwrap().completed_at, None);

        let again = engine
            .complete(&task.id, noon(1) + Duration::minutes(2))
            .unwrap();
        assert_eq!(again.events.len(), 1);
        let profile = engine.profile(noon(1)).unwrap();
        assert_eq!(profile.state.xp, 10);
        assert_eq!(profile.state.completions, 1);
    }

    #[test]
    fn rollover_breaks_the_streak_once() {
        let engine = engine();
        let template = daily(&engine, d(1));
        engine.materialize(&template.id, d(2), noon(2)).unwrap();
        let first = occurrence_due(&engine, &template.id, d(1));
        engine.complete(&first.id, noon(1)).unwrap();

        let events = engine.day_rollover(d(3), noon(3)).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::StreakChanged { change: StreakChange::Broken, current_streak: 0, .. }
        ));

        assert!(engine.day_rollover(d(3), noon(3)).unwrap().is_empty());
        let streak = engine.streak(&template.id).unwrap();
        assert_eq!(streak.current_streak, 0);
        assert_eq!(streak.longest_streak, 1);
    }

    #[test]
    fn update_keeps_the_cursor_when_the_rule_changes() {
        let engine = engine();
        let template = daily(&engine, d(1));
        engine.materialize(&template.id, d(4), noon(4)).unwrap();

        let mut patch = TaskPatch::default();
        patch.recurrence = Some(RecurrenceRule::new(Frequency::Daily, d(1)).every(2));
        let updated = engine.update(&template.id, patch, noon(4)).unwrap().task;
        assert_eq!(updated.last_materialized_date, Some(d(4)));

        let next = engine.materialize(&template.id, d(8), noon(8)).unwrap();
        let due: Vec<_> = next.created.iter().filter_map(|t| t.due_date).collect();
        assert_eq!(due, vec![d(5), d(7)]);
    }

    #[test]
    fn occurrences_cannot_get_a_rule() {
        let engine = engine();
        let template = daily(&engine, d(1));
        engine.materialize(&template.id, d(1), noon(1)).unwrap();
        let occ = occurrence_due(&engine, &template.id, d(1));

        let mut patch = TaskPatch::default();
        patch.recurrence = Some(RecurrenceRule::new(Frequency::Weekly, d(1)));
        assert!(matches!(
            engine.update(&occ.id, patch, noon(1)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn bulk_delete_reports_missing_ids() {
        let engine = engine();
        let parent = engine.create(NewTask::titled("Move"), noon(1)).unwrap();
        let mut child = NewTask::titled("Pack");
        child.parent_task_id = Some(parent.id.clone());
        engine.create(child, noon(1)).unwrap();

        let report = engine
            .bulk_delete(&[parent.id.clone(), "ghost".to_string()])
            .unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(report.not_found, vec!["ghost".to_string()]);
    }

    #[test]
    fn run_daily_materializes_then_rolls_over() {
        let engine = engine();
        let template = daily(&engine, d(1));
        let run = engine.run_daily(d(3), noon(3)).unwrap();
        assert_eq!(run.materialized.occurrences_created, 3);
        // the 1st and 2nd are open and already past
        assert_eq!(run.misses_recorded, 2);
        assert_eq!(engine.streak(&template.id).unwrap().current_streak, 0);

        let again = engine.run_daily(d(3), noon(3)).unwrap();
        assert_eq!(again.materialized.occurrences_created, 0);
        assert_eq!(again.misses_recorded, 0);
    }

    #[test]
    fn retry_gives_up_after_attempts() {
        let mut calls = 0;
        let result: Result<()> = retry_on_conflict(3, || {
            calls += 1;
            Err(CoreError::conflict("template", "t"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<()> = retry_on_conflict(3, || {
            calls += 1;
            Err(CoreError::not_found("task", "t"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
