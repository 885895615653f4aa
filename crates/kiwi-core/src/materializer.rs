//! Occurrence materialization.
//!
//! Planning is pure: [`materialize_due`] looks only at the template it is
//! given, so the stored `last_materialized_date` is the sole record of what
//! has already been generated. The plan is written back by
//! [`TaskStore::save_occurrences_and_advance`](crate::storage::TaskStore::save_occurrences_and_advance),
//! which compares the template's cursor against [`Materialization::expected_last`]
//! and writes the occurrences and the new cursor in one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidRuleError;
use crate::recurrence;
use crate::task::Task;

/// Occurrences to create for one template, plus the advanced cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Materialization {
    pub template_id: String,
    /// Cursor observed when planning; the write is rejected if it moved
    pub expected_last: Option<NaiveDate>,
    /// Cursor after the write (unchanged when nothing was due)
    pub new_last: Option<NaiveDate>,
    pub occurrences: Vec<Task>,
}

impl Materialization {
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    /// Due dates of the planned occurrences, oldest first.
    pub fn due_dates(&self) -> Vec<NaiveDate> {
        self.occurrences.iter().filter_map(|t| t.due_date).collect()
    }
}

/// Plan every occurrence of `template` due on or before `as_of` that has not
/// been generated yet.
///
/// The series resumes strictly after `last_materialized_date`, or at the
/// anchor if nothing was generated before. Missed periods are all produced,
/// each with its own due date.
///
/// # Errors
/// Fails with [`InvalidRuleError`] if `template` has no rule or the rule is
/// malformed. Nothing is planned in that case.
pub fn materialize_due(
    template: &Task,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Materialization, InvalidRuleError> {
    let rule = template
        .recurrence
        .as_ref()
        .ok_or_else(|| InvalidRuleError::NotATemplate(template.id.clone()))?;
    let expected_last = template.last_materialized_date;

    let occurrences: Vec<Task> = recurrence::occurrences(rule, expected_last, as_of)?
        .map(|due| Task::occurrence_of(template, due, now))
        .collect();
    let new_last = occurrences
        .last()
        .and_then(|t| t.due_date)
        .or(expected_last);

    Ok(Materialization {
        template_id: template.id.clone(),
        expected_last,
        new_last,
        occurrences,
    })
}

/// Outcome of materializing every template in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollforwardStats {
    pub templates_scanned: usize,
    pub templates_advanced: usize,
    pub occurrences_created: usize,
    /// Templates skipped because another writer advanced them first
    pub conflicts: usize,
    /// Templates skipped because of a malformed rule or store failure
    pub errors: usize,
}

impl RollforwardStats {
    pub fn record(&mut self, created: usize) {
        self.templates_scanned += 1;
        if created > 0 {
            self.templates_advanced += 1;
            self.occurrences_created += created;
        }
    }
}
