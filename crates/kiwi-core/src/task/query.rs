//! Task list filtering and sorting.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{Priority, TaskStatus};
use crate::error::ValidationError;

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 100;
const MAX_QUERY_LEN: usize = 200;

/// Sortable task field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Priority,
    Status,
    Title,
    DueDate,
}

impl SortField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Priority => "priority_rank",
            SortField::Status => "status",
            SortField::Title => "title COLLATE NOCASE",
            SortField::DueDate => "due_date",
        }
    }
}

/// Sort order parsed from `field` or `-field` (descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl Default for SortKey {
    /// Newest first.
    fn default() -> Self {
        SortKey {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl SortKey {
    pub(crate) fn order_by(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        // id breaks ties so paging is stable
        format!("{} {dir}, id {dir}", self.field.column())
    }
}

impl FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "priority" => SortField::Priority,
            "status" => SortField::Status,
            "title" => SortField::Title,
            "due_date" => SortField::DueDate,
            _ => {
                return Err(ValidationError::invalid(
                    "sort",
                    format!(
                        "'{s}' must be one of created_at, updated_at, priority, status, title, due_date (prefix '-' for descending)"
                    ),
                ))
            }
        };
        Ok(SortKey { field, descending })
    }
}

/// Filters for listing tasks. Empty filter lists everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Case-insensitive title substring
    pub query: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// Match tasks carrying any of these tags
    pub tags: Vec<String>,
    /// Only children of this task
    pub parent_task_id: Option<String>,
    /// Only tasks without a parent
    pub top_level_only: bool,
    /// Only recurring templates
    pub templates_only: bool,
    pub sort: SortKey,
    pub limit: u32,
    pub offset: u32,
}

impl Default for TaskFilter {
    fn default() -> Self {
        TaskFilter {
            query: None,
            status: None,
            priority: None,
            tags: Vec::new(),
            parent_task_id: None,
            top_level_only: false,
            templates_only: false,
            sort: SortKey::default(),
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl TaskFilter {
    /// Check limits before the filter reaches the store.
    ///
    /// # Errors
    /// Returns an error for a limit outside 1..=100 or an overlong query.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == 0 || self.limit > MAX_LIST_LIMIT {
            return Err(ValidationError::invalid(
                "limit",
                format!("must be between 1 and {MAX_LIST_LIMIT}"),
            ));
        }
        if self.query.as_deref().is_some_and(|q| q.chars().count() > MAX_QUERY_LEN) {
            return Err(ValidationError::invalid(
                "query",
                format!("must be at most {MAX_QUERY_LEN} characters"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_parses_direction() {
        let key: SortKey = "-priority".parse().unwrap();
        assert_eq!(key.field, SortField::Priority);
        assert!(key.descending);
        let key: SortKey = "title".parse().unwrap();
        assert!(!key.descending);
        assert!("-colour".parse::<SortKey>().is_err());
    }

    #[test]
    fn order_by_includes_tiebreak() {
        assert_eq!(SortKey::default().order_by(), "created_at DESC, id DESC");
    }

    #[test]
    fn limit_bounds_checked() {
        let mut filter = TaskFilter::default();
        assert!(filter.validate().is_ok());
        filter.limit = 0;
        assert!(filter.validate().is_err());
        filter.limit = 101;
        assert!(filter.validate().is_err());
    }
}
