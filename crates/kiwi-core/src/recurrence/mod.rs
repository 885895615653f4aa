//! Recurrence rules for template tasks.
//!
//! A rule is a frequency tag plus shared fields. The occurrence series of a
//! rule is `anchor, anchor + 1·step, anchor + 2·step, …` where the step is
//! `interval` days, weeks or months, cut off after `end_date`.

mod evaluator;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidRuleError;

pub use evaluator::{next_occurrence, nth_occurrence, occurrences, Occurrences};

/// How often a rule repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = InvalidRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(InvalidRuleError::UnknownFrequency(other.to_string())),
        }
    }
}

/// A recurrence rule: every `interval` units of `frequency`, starting at
/// `anchor_date`, optionally ending on `end_date` (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub anchor_date: NaiveDate,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_interval() -> u32 {
    1
}

impl RecurrenceRule {
    /// Every single unit of `frequency` from `anchor_date`, open-ended.
    pub fn new(frequency: Frequency, anchor_date: NaiveDate) -> Self {
        RecurrenceRule {
            frequency,
            anchor_date,
            interval: 1,
            end_date: None,
        }
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn until(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Build a rule from loosely-typed parts (CLI flags, stored columns).
    ///
    /// # Errors
    /// Fails with [`InvalidRuleError`] on an unknown frequency, an interval
    /// below 1, unparseable dates or an end date before the anchor.
    pub fn parse(
        frequency: &str,
        anchor_date: &str,
        interval: i64,
        end_date: Option<&str>,
    ) -> Result<Self, InvalidRuleError> {
        let frequency: Frequency = frequency.parse()?;
        let interval = u32::try_from(interval)
            .ok()
            .filter(|i| *i >= 1)
            .ok_or(InvalidRuleError::NonPositiveInterval(interval))?;
        let rule = RecurrenceRule {
            frequency,
            anchor_date: parse_date(anchor_date)?,
            interval,
            end_date: end_date.map(parse_date).transpose()?,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Check the rule is well-formed.
    ///
    /// # Errors
    /// Fails if `interval < 1` or `end_date < anchor_date`.
    pub fn validate(&self) -> Result<(), InvalidRuleError> {
        if self.interval < 1 {
            return Err(InvalidRuleError::NonPositiveInterval(i64::from(self.interval)));
        }
        if let Some(end) = self.end_date {
            if end < self.anchor_date {
                return Err(InvalidRuleError::EndBeforeAnchor {
                    anchor: self.anchor_date,
                    end,
                });
            }
        }
        Ok(())
    }

    /// Whether `date` lies past the rule's end.
    pub fn is_past_end(&self, date: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| date > end)
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.frequency, self.anchor_date)?;
        if self.interval > 1 {
            write!(f, " every {}", self.interval)?;
        }
        if let Some(end) = self.end_date {
            write!(f, " until {end}")?;
        }
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
/// Returns [`InvalidRuleError::InvalidDate`] on malformed input.
pub fn parse_date(s: &str) -> Result<NaiveDate, InvalidRuleError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| InvalidRuleError::InvalidDate(s.to_string()))
}
