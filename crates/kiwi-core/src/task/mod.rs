//! Task types.
//!
//! A task with a recurrence rule is a *template*: it is never completed
//! itself. The materializer generates concrete *occurrences* from it, each
//! pointing back through `parent_task_id`. Ordinary subtasks use the same
//! back-reference with a non-template parent.

pub mod query;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::recurrence::RecurrenceRule;

pub use query::{SortKey, TaskFilter, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// Maximum title length, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Task status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Done,
    Archived,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Todo,
        TaskStatus::Doing,
        TaskStatus::Done,
        TaskStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
            TaskStatus::Archived => "archived",
        }
    }

    /// Still waiting to be done (todo or doing).
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::Doing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            "archived" => Ok(TaskStatus::Archived),
            other => Err(ValidationError::invalid(
                "status",
                format!("'{other}' is not one of todo, doing, done, archived"),
            )),
        }
    }
}

/// Task priority. Ordered low < normal < high.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// Sortable rank stored alongside the name.
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(ValidationError::invalid(
                "priority",
                format!("'{other}' is not one of low, normal, high"),
            )),
        }
    }
}

/// One unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier, immutable
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Present only on templates
    pub recurrence: Option<RecurrenceRule>,
    /// Weak back-reference to a template or parent task
    pub parent_task_id: Option<String>,
    /// Most recent date an occurrence was generated for (templates only)
    pub last_materialized_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a status change did to completion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    /// Entered `done`
    Completed,
    /// Left `done`
    Reopened,
    /// Moved between non-done states
    Moved,
}

impl Task {
    /// Create a `todo` task stamped at `now`.
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Normal,
            due_date: None,
            tags: Vec::new(),
            recurrence: None,
            parent_task_id: None,
            last_materialized_date: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = Some(rule);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent_id.into());
        self
    }

    /// A task carrying a recurrence rule.
    pub fn is_template(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Open and due strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.due_date.is_some_and(|due| due < today)
    }

    /// Build the concrete occurrence of `template` due on `due_date`.
    ///
    /// Copies title, description, priority and tags; the occurrence starts
    /// as `todo` and points back at the template.
    pub fn occurrence_of(template: &Task, due_date: NaiveDate, now: DateTime<Utc>) -> Self {
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            title: template.title.clone(),
            description: template.description.clone(),
            status: TaskStatus::Todo,
            priority: template.priority,
            due_date: Some(due_date),
            tags: template.tags.clone(),
            recurrence: None,
            parent_task_id: Some(template.id.clone()),
            last_materialized_date: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a status change, maintaining `completed_at`.
    ///
    /// Entering `done` stamps `completed_at`; leaving it clears the stamp.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) -> StatusChange {
        let before = self.status;
        if before == status {
            return StatusChange::Unchanged;
        }
        self.status = status;
        self.updated_at = now;
        match (before, status) {
            (_, TaskStatus::Done) => {
                self.completed_at = Some(now);
                StatusChange::Completed
            }
            (TaskStatus::Done, _) => {
                self.completed_at = None;
                StatusChange::Reopened
            }
            _ => StatusChange::Moved,
        }
    }
}

/// Trim and check a title.
///
/// # Errors
/// Returns an error for empty titles or titles over [`MAX_TITLE_LEN`].
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::invalid("title", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::invalid(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim a description; blank becomes `None`.
pub fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Split a comma-separated tag list, dropping blanks and duplicates.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub recurrence: Option<RecurrenceRule>,
    pub parent_task_id: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        NewTask {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
    pub recurrence: Option<RecurrenceRule>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }
}
