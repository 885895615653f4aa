use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::gamification::{Badge, StreakChange, StreakDelta};

/// Every state change the engine commits produces an Event.
/// The CLI prints them; a notification layer may surface them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// New occurrences were generated for a template.
    OccurrencesMaterialized {
        template_id: String,
        due_dates: Vec<NaiveDate>,
        last_materialized_date: Option<NaiveDate>,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        template_id: Option<String>,
        due_date: Option<NaiveDate>,
        completed_on: NaiveDate,
        at: DateTime<Utc>,
    },
    TaskReopened {
        task_id: String,
        at: DateTime<Utc>,
    },
    StreakChanged {
        template_id: String,
        change: StreakChange,
        previous_streak: u32,
        current_streak: u32,
        longest_streak: u32,
        at: DateTime<Utc>,
    },
    XpAwarded {
        task_id: String,
        amount: u64,
        total_xp: u64,
        at: DateTime<Utc>,
    },
    LevelUp {
        from: u32,
        to: u32,
        at: DateTime<Utc>,
    },
    BadgeEarned {
        badge: Badge,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn streak_changed(delta: &StreakDelta, at: DateTime<Utc>) -> Self {
        Event::StreakChanged {
            template_id: delta.template_id.clone(),
            change: delta.change,
            previous_streak: delta.previous_streak,
            current_streak: delta.current_streak,
            longest_streak: delta.longest_streak,
            at,
        }
    }

    /// Events worth a user-facing notification.
    pub fn is_milestone(&self) -> bool {
        matches!(self, Event::LevelUp { .. } | Event::BadgeEarned { .. })
    }
}
