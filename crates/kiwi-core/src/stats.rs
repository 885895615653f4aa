//! Task analytics.
//!
//! Pure functions over a slice of tasks. Templates are skipped everywhere:
//! they are never completed, their occurrences are what gets counted.
//! Completion timestamps are bucketed by the caller's timezone.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::local_date;
use crate::task::{Priority, Task, TaskStatus};

fn work_items(tasks: &[Task]) -> impl Iterator<Item = &Task> {
    tasks.iter().filter(|t| !t.is_template())
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Counts by status and priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
}

pub fn summary(tasks: &[Task]) -> Summary {
    let mut out = Summary {
        by_status: TaskStatus::ALL.iter().map(|s| (s.to_string(), 0)).collect(),
        by_priority: Priority::ALL.iter().map(|p| (p.to_string(), 0)).collect(),
        ..Default::default()
    };
    for task in work_items(tasks) {
        out.total += 1;
        *out.by_status.entry(task.status.to_string()).or_default() += 1;
        *out.by_priority.entry(task.priority.to_string()).or_default() += 1;
    }
    out
}

/// Share of tasks that are done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRate {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Percentage, one decimal place
    pub completion_rate: f64,
}

pub fn completion_rate(tasks: &[Task]) -> CompletionRate {
    let total = work_items(tasks).count();
    let completed = work_items(tasks)
        .filter(|t| t.status == TaskStatus::Done)
        .count();
    CompletionRate {
        total,
        completed,
        pending: total - completed,
        completion_rate: percent(completed, total),
    }
}

/// Completions on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub completed: usize,
}

/// Completions per day for the `days` days ending on `today`, oldest first.
///
/// Days without completions are present with a count of zero.
pub fn daily_completions(
    tasks: &[Task],
    today: NaiveDate,
    days: u32,
    offset: FixedOffset,
) -> Vec<DailyCount> {
    if days == 0 {
        return Vec::new();
    }
    let Some(start) = today.checked_sub_days(Days::new(u64::from(days - 1))) else {
        return Vec::new();
    };

    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for done_on in completion_dates(tasks, offset) {
        if (start..=today).contains(&done_on) {
            *counts.entry(done_on).or_default() += 1;
        }
    }

    start
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|date| DailyCount {
            date,
            completed: counts.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

/// Completions in one Monday-based week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCount {
    /// `YYYY-WW`, Monday-based week of the year
    pub week: String,
    pub week_start: NaiveDate,
    pub completed: usize,
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// Completions per week for the `weeks` weeks ending with the one holding
/// `today`, oldest first. Empty weeks are present with a count of zero.
pub fn weekly_completions(
    tasks: &[Task],
    today: NaiveDate,
    weeks: u32,
    offset: FixedOffset,
) -> Vec<WeeklyCount> {
    if weeks == 0 {
        return Vec::new();
    }
    let last = monday_of(today);
    let Some(first) = last.checked_sub_days(Days::new(7 * u64::from(weeks - 1))) else {
        return Vec::new();
    };

    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for done_on in completion_dates(tasks, offset).filter(|d| (first..=today).contains(d)) {
        *counts.entry(monday_of(done_on)).or_default() += 1;
    }

    first
        .iter_weeks()
        .take_while(|w| *w <= last)
        .map(|week_start| WeeklyCount {
            week: week_start.format("%Y-%W").to_string(),
            week_start,
            completed: counts.get(&week_start).copied().unwrap_or(0),
        })
        .collect()
}

fn completion_dates(tasks: &[Task], offset: FixedOffset) -> impl Iterator<Item = NaiveDate> + '_ {
    work_items(tasks)
        .filter_map(|t| t.completed_at)
        .map(move |at| local_date(at, offset))
}

/// Dashboard numbers relative to `today`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Productivity {
    pub today_completed: usize,
    /// Since Monday of the current ISO week
    pub week_completed: usize,
    pub month_completed: usize,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub overdue: usize,
    pub completion_rate: f64,
}

pub fn productivity(tasks: &[Task], today: NaiveDate, offset: FixedOffset) -> Productivity {
    let week_start = monday_of(today);
    let month_start = today.with_day(1).unwrap_or(today);

    let mut out = Productivity::default();
    for done_on in completion_dates(tasks, offset).filter(|d| *d <= today) {
        if done_on == today {
            out.today_completed += 1;
        }
        if done_on >= week_start {
            out.week_completed += 1;
        }
        if done_on >= month_start {
            out.month_completed += 1;
        }
    }

    let rate = completion_rate(tasks);
    out.total_tasks = rate.total;
    out.completion_rate = rate.completion_rate;
    out.pending_tasks = work_items(tasks).filter(|t| t.status.is_open()).count();
    out.overdue = work_items(tasks).filter(|t| t.is_overdue(today)).count();
    out
}

/// Mean time from creation to completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionTime {
    /// Hours, one decimal place
    pub average_hours: f64,
    pub task_count: usize,
}

pub fn average_completion_hours(tasks: &[Task]) -> CompletionTime {
    let spans: Vec<f64> = work_items(tasks)
        .filter_map(|t| t.completed_at.map(|done| hours_between(t.created_at, done)))
        .collect();
    if spans.is_empty() {
        return CompletionTime::default();
    }
    let mean = spans.iter().sum::<f64>() / spans.len() as f64;
    CompletionTime {
        average_hours: (mean * 10.0).round() / 10.0,
        task_count: spans.len(),
    }
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::{Frequency, RecurrenceRule};
    use chrono::{Duration, TimeZone};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn done_at(title: &str, created: DateTime<Utc>, done: DateTime<Utc>) -> Task {
        let mut task = Task::new(title, created);
        task.set_status(TaskStatus::Done, done);
        task
    }

    fn utc_offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn summary_counts_every_bucket_and_skips_templates() {
        let now = utc(2024, 3, 1, 9);
        let template = Task::new("Water plants", now)
            .with_recurrence(RecurrenceRule::new(Frequency::Daily, date(2024, 3, 1)));
        let tasks = vec![
            Task::new("a", now).with_priority(Priority::High),
            done_at("b", now, now),
            template,
        ];
        let s = summary(&tasks);
        assert_eq!(s.total, 2);
        assert_eq!(s.by_status["todo"], 1);
        assert_eq!(s.by_status["done"], 1);
        assert_eq!(s.by_status["archived"], 0);
        assert_eq!(s.by_priority["high"], 1);
        assert_eq!(s.by_priority["normal"], 1);
    }

    #[test]
    fn completion_rate_rounds_to_one_decimal() {
        let now = utc(2024, 3, 1, 9);
        let tasks = vec![
            done_at("a", now, now),
            Task::new("b", now),
            Task::new("c", now),
        ];
        let rate = completion_rate(&tasks);
        assert_eq!(rate.completed, 1);
        assert_eq!(rate.pending, 2);
        assert_eq!(rate.completion_rate, 33.3);
        assert_eq!(completion_rate(&[]).completion_rate, 0.0);
    }

    #[test]
    fn daily_completions_fills_gaps() {
        let created = utc(2024, 2, 1, 9);
        let tasks = vec![
            done_at("a", created, utc(2024, 3, 1, 10)),
            done_at("b", created, utc(2024, 3, 1, 18)),
            done_at("c", created, utc(2024, 3, 3, 8)),
            done_at("too old", created, utc(2024, 2, 20, 8)),
        ];
        let days = daily_completions(&tasks, date(2024, 3, 3), 3, utc_offset());
        assert_eq!(
            days,
            vec![
                DailyCount { date: date(2024, 3, 1), completed: 2 },
                DailyCount { date: date(2024, 3, 2), completed: 0 },
                DailyCount { date: date(2024, 3, 3), completed: 1 },
            ]
        );
        assert!(daily_completions(&tasks, date(2024, 3, 3), 0, utc_offset()).is_empty());
    }

    #[test]
    fn daily_completions_uses_local_dates() {
        let created = utc(2024, 2, 1, 9);
        // 23:30 UTC on the 1st is already the 2nd in UTC+9
        let done = utc(2024, 3, 1, 23) + Duration::minutes(30);
        let tasks = vec![done_at("a", created, done)];
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let days = daily_completions(&tasks, date(2024, 3, 2), 2, tokyo);
        assert_eq!(days[0].completed, 0);
        assert_eq!(days[1].completed, 1);
    }

    #[test]
    fn weekly_completions_fills_gaps() {
        // 2024-03-13 is a Wednesday; its week starts on the 11th
        let today = date(2024, 3, 13);
        let created = utc(2024, 2, 1, 9);
        let tasks = vec![
            done_at("this week", created, utc(2024, 3, 11, 9)),
            done_at("also this week", created, utc(2024, 3, 13, 9)),
            done_at("two weeks ago", created, utc(2024, 2, 29, 9)),
            done_at("too old", created, utc(2024, 2, 20, 9)),
        ];
        let weeks = weekly_completions(&tasks, today, 3, utc_offset());
        assert_eq!(
            weeks.iter().map(|w| (w.week_start, w.completed)).collect::<Vec<_>>(),
            vec![
                (date(2024, 2, 26), 1),
                (date(2024, 3, 4), 0),
                (date(2024, 3, 11), 2),
            ]
        );
        assert_eq!(weeks[2].week, "2024-11");
        assert!(weekly_completions(&tasks, today, 0, utc_offset()).is_empty());
    }

    #[test]
    fn productivity_windows() {
        // 2024-03-13 is a Wednesday
        let today = date(2024, 3, 13);
        let created = utc(2024, 2, 1, 9);
        let tasks = vec![
            done_at("today", created, utc(2024, 3, 13, 9)),
            done_at("monday", created, utc(2024, 3, 11, 9)),
            done_at("last week", created, utc(2024, 3, 8, 9)),
            done_at("last month", created, utc(2024, 2, 28, 9)),
            Task::new("overdue", created).with_due_date(date(2024, 3, 12)),
            Task::new("due today", created).with_due_date(today),
        ];
        let p = productivity(&tasks, today, utc_offset());
        assert_eq!(p.today_completed, 1);
        assert_eq!(p.week_completed, 2);
        assert_eq!(p.month_completed, 3);
        assert_eq!(p.total_tasks, 6);
        assert_eq!(p.pending_tasks, 2);
        assert_eq!(p.overdue, 1);
        assert_eq!(p.completion_rate, 66.7);
    }

    #[test]
    fn average_completion_time() {
        let created = utc(2024, 3, 1, 0);
        let tasks = vec![
            done_at("a", created, utc(2024, 3, 1, 2)),
            done_at("b", created, utc(2024, 3, 1, 5)),
            Task::new("open", created),
        ];
        let avg = average_completion_hours(&tasks);
        assert_eq!(avg.task_count, 2);
        assert_eq!(avg.average_hours, 3.5);
        assert_eq!(average_completion_hours(&[]), CompletionTime::default());
    }
}
