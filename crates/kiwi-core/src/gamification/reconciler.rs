//! Streak and XP reconciliation.
//!
//! The reconciler is pure. State records are passed in and the updated
//! records come back in the outcome; the engine persists them in the same
//! transaction as the triggering task write.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use super::badges::{Badge, Progress};
use super::streak::{StreakDelta, StreakState};
use super::xp::{GamificationConfig, GamificationState};
use crate::clock::local_date;
use crate::events::Event;
use crate::task::{Task, TaskStatus};

/// A task that just entered `done`, with the context needed to score it.
#[derive(Debug, Clone, Copy)]
pub struct Completion<'a> {
    pub task: &'a Task,
    /// Set when the task is an occurrence of this template
    pub template_id: Option<&'a str>,
    /// The template's occurrence due immediately before this one
    pub previous: Option<&'a Task>,
    pub completed_at: DateTime<Utc>,
    pub offset: FixedOffset,
    /// The task already earned XP on an earlier completion
    pub already_credited: bool,
}

/// Result of reconciling one completion.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    /// Updated streak, if the task is a credited occurrence
    pub streak: Option<StreakState>,
    pub delta: Option<StreakDelta>,
    /// Updated gamification record; `None` when nothing changed
    pub gamification: Option<GamificationState>,
    pub xp_awarded: u64,
    pub events: Vec<Event>,
}

impl ReconcileOutcome {
    fn unchanged() -> Self {
        ReconcileOutcome {
            streak: None,
            delta: None,
            gamification: None,
            xp_awarded: 0,
            events: Vec::new(),
        }
    }
}

/// Result of a day rollover for one template.
#[derive(Debug, Clone, Serialize)]
pub struct RolloverOutcome {
    pub streak: StreakState,
    pub deltas: Vec<StreakDelta>,
    pub events: Vec<Event>,
}

/// Applies completion and rollover rules to streak and XP records.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: GamificationConfig,
}

impl Reconciler {
    pub fn new(config: GamificationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GamificationConfig {
        &self.config
    }

    /// Score a completion.
    ///
    /// For an occurrence the streak is extended when it was finished on or
    /// before its due date and the previous occurrence is done (or absent);
    /// otherwise the streak restarts at 1. XP is the base amount plus the
    /// capped streak bonus. A task that was already credited changes
    /// nothing.
    pub fn on_completed(
        &self,
        completion: Completion<'_>,
        streak: Option<StreakState>,
        gamification: Option<GamificationState>,
    ) -> ReconcileOutcome {
        if completion.already_credited {
            return ReconcileOutcome::unchanged();
        }
        let at = completion.completed_at;
        let completed_on = local_date(at, completion.offset);
        let mut events = Vec::new();

        let (streak, delta) = match completion.template_id {
            Some(template_id) => {
                let mut state = streak.unwrap_or_else(|| StreakState::new(template_id));
                let due = completion.task.due_date.unwrap_or(completed_on);
                let previous_done = completion
                    .previous
                    .map_or(true, |p| p.status == TaskStatus::Done);
                let delta = state.record_completion(due, completed_on, previous_done);
                events.push(Event::streak_changed(&delta, at));
                (Some(state), Some(delta))
            }
            None => (None, None),
        };

        let current_streak = streak.as_ref().map(|s| s.current_streak);
        let amount = self.config.xp_for_completion(current_streak);
        let mut profile = gamification.unwrap_or_else(|| GamificationState::new(at));
        self.award(&mut profile, amount, current_streak.unwrap_or(0), at, &mut events);
        events.insert(
            0,
            Event::XpAwarded {
                task_id: completion.task.id.clone(),
                amount,
                total_xp: profile.xp,
                at,
            },
        );

        ReconcileOutcome {
            streak,
            delta,
            gamification: Some(profile),
            xp_awarded: amount,
            events,
        }
    }

    /// Count every open occurrence due before `today` as a miss.
    ///
    /// Each missed due date resets the streak to 0 and pushes a `false` into
    /// the grid once; dates already counted are skipped. Returns `None` when
    /// nothing new was missed.
    pub fn on_day_rollover(
        &self,
        mut streak: StreakState,
        occurrences: &[Task],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<RolloverOutcome> {
        let mut missed: Vec<NaiveDate> = occurrences
            .iter()
            .filter(|t| t.status.is_open())
            .filter_map(|t| t.due_date)
            .filter(|due| *due < today)
            .collect();
        missed.sort_unstable();
        missed.dedup();

        let deltas: Vec<StreakDelta> = missed
            .into_iter()
            .filter_map(|due| streak.record_miss(due))
            .collect();
        if deltas.is_empty() {
            return None;
        }
        let events = deltas.iter().map(|d| Event::streak_changed(d, now)).collect();
        Some(RolloverOutcome {
            streak,
            deltas,
            events,
        })
    }

    fn award(
        &self,
        profile: &mut GamificationState,
        amount: u64,
        streak: u32,
        at: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) {
        profile.xp = profile.xp.saturating_add(amount);
        profile.completions = profile.completions.saturating_add(1);
        profile.updated_at = at;

        let level = self.config.level_for_xp(profile.xp);
        if level > profile.level {
            events.push(Event::LevelUp {
                from: profile.level,
                to: level,
                at,
            });
        }
        // level is derived from xp, which never decreases
        profile.level = profile.level.max(level);

        let progress = Progress {
            completions: profile.completions,
            xp: profile.xp,
            level: profile.level,
            streak,
        };
        for badge in Badge::earned(&progress) {
            if profile.badges.insert(badge) {
                events.push(Event::BadgeEarned { badge, at });
            }
        }
    }
}
