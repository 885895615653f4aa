//! Stepping a rule through its occurrence series.
//!
//! Every date is computed directly as the k-th member of the series from the
//! anchor, never by adding a step to the previous member. For monthly rules
//! this keeps a clamped short month from dragging later occurrences to an
//! earlier day of the month.

use chrono::{Datelike, Days, Months, NaiveDate};

use super::{Frequency, RecurrenceRule};
use crate::error::InvalidRuleError;

/// The `k`-th date of the series (`k = 0` is the anchor), ignoring `end_date`.
///
/// Returns `None` if the date falls outside chrono's representable range.
pub fn nth_occurrence(rule: &RecurrenceRule, k: u32) -> Option<NaiveDate> {
    let step = k.checked_mul(rule.interval)?;
    match rule.frequency {
        Frequency::Daily => rule.anchor_date.checked_add_days(Days::new(u64::from(step))),
        Frequency::Weekly => rule
            .anchor_date
            .checked_add_days(Days::new(u64::from(step) * 7)),
        Frequency::Monthly => rule.anchor_date.checked_add_months(Months::new(step)),
    }
}

/// Index of the first series member strictly after `after`.
fn first_index_after(rule: &RecurrenceRule, after: NaiveDate) -> Option<u32> {
    if after < rule.anchor_date {
        return Some(0);
    }
    let interval = i64::from(rule.interval);
    match rule.frequency {
        Frequency::Daily | Frequency::Weekly => {
            let unit = if rule.frequency == Frequency::Weekly { 7 } else { 1 };
            let elapsed = (after - rule.anchor_date).num_days();
            u32::try_from(elapsed / (interval * unit) + 1).ok()
        }
        Frequency::Monthly => {
            let months = i64::from(after.year() - rule.anchor_date.year()) * 12
                + i64::from(after.month()) - i64::from(rule.anchor_date.month());
            let k = u32::try_from(months / interval).ok()?;
            // Clamping can put the k-th member on or before `after` within
            // the same month; the next one is then the answer.
            match nth_occurrence(rule, k) {
                Some(date) if date > after => Some(k),
                _ => k.checked_add(1),
            }
        }
    }
}

/// Next occurrence strictly after `after`.
///
/// If `after` is before the anchor the anchor itself is returned. Returns
/// `Ok(None)` once the series has passed `end_date`.
///
/// # Errors
/// Fails with [`InvalidRuleError`] if the rule is malformed.
pub fn next_occurrence(
    rule: &RecurrenceRule,
    after: NaiveDate,
) -> Result<Option<NaiveDate>, InvalidRuleError> {
    rule.validate()?;
    Ok(first_index_after(rule, after)
        .and_then(|k| nth_occurrence(rule, k))
        .filter(|date| !rule.is_past_end(*date)))
}

/// Iterate the series from just after `after` (or from the anchor when
/// `after` is `None`) through `through`, inclusive.
///
/// # Errors
/// Fails with [`InvalidRuleError`] if the rule is malformed.
pub fn occurrences(
    rule: &RecurrenceRule,
    after: Option<NaiveDate>,
    through: NaiveDate,
) -> Result<Occurrences, InvalidRuleError> {
    rule.validate()?;
    let next = match after {
        None => Some(0),
        Some(after) => first_index_after(rule, after),
    };
    Ok(Occurrences {
        rule: *rule,
        next,
        through,
    })
}

/// Iterator over a bounded stretch of a rule's series.
#[derive(Debug, Clone)]
pub struct Occurrences {
    rule: RecurrenceRule,
    next: Option<u32>,
    through: NaiveDate,
}

impl Iterator for Occurrences {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let k = self.next?;
        let date = nth_occurrence(&self.rule, k)
            .filter(|date| *date <= self.through && !self.rule.is_past_end(*date));
        self.next = match date {
            Some(_) => k.checked_add(1),
            None => None,
        };
        date
    }
}
