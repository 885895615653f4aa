//! Property-based tests for recurrence and materialization.
//!
//! - Idempotence: a second materialization for the same date creates nothing
//! - No skipped periods: an offline gap is backfilled one occurrence per period
//! - Series shape: every occurrence lies on the rule's series, in order,
//!   never after the end date
//! - Month clamp: monthly occurrences keep the anchor's day, clamped to
//!   the month's last day

use chrono::{Datelike, Days, FixedOffset, NaiveDate};
use proptest::prelude::*;

use kiwi_core::recurrence::{nth_occurrence, occurrences};
use kiwi_core::{
    Clock, FixedClock, Frequency, GamificationConfig, NewTask, RecurrenceRule, TaskDb, TaskEngine,
    TaskFilter,
};

// =============================================================================
// Generators
// =============================================================================

fn any_date() -> impl Strategy<Value = NaiveDate> {
    // Days past the month's end fall back to its last day, so month ends
    // come up often.
    (2000i32..2040, 1u32..=12, 1u32..=31).prop_map(|(y, m, d)| {
        (0..4)
            .find_map(|back| NaiveDate::from_ymd_opt(y, m, d - back))
            .unwrap()
    })
}

fn any_frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
    ]
}

fn any_rule() -> impl Strategy<Value = RecurrenceRule> {
    (any_frequency(), any_date(), 1u32..5, proptest::option::of(0u64..400)).prop_map(
        |(frequency, anchor, interval, end_after)| {
            let rule = RecurrenceRule::new(frequency, anchor).every(interval);
            match end_after {
                Some(days) => rule.until(anchor + Days::new(days)),
                None => rule,
            }
        },
    )
}

fn engine() -> TaskEngine<TaskDb> {
    TaskEngine::new(
        TaskDb::open_memory().unwrap(),
        GamificationConfig::default(),
        FixedOffset::east_opt(0).unwrap(),
    )
}

fn create_template(engine: &TaskEngine<TaskDb>, rule: RecurrenceRule) -> String {
    let mut new = NewTask::titled("Habit");
    new.recurrence = Some(rule);
    engine
        .create(new, FixedClock::at_date(rule.anchor_date).now())
        .unwrap()
        .id
}

fn occurrence_count(engine: &TaskEngine<TaskDb>, template_id: &str) -> usize {
    let mut filter = TaskFilter::default();
    filter.parent_task_id = Some(template_id.to_string());
    filter.limit = 100;
    engine.list(&filter).unwrap().len()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn materialization_is_idempotent(rule in any_rule(), ahead in 0u64..90) {
        let engine = engine();
        let id = create_template(&engine, rule);
        let as_of = rule.anchor_date + Days::new(ahead);
        let now = FixedClock::at_date(as_of).now();

        let first = engine.materialize(&id, as_of, now).unwrap();
        let stored_after_first = occurrence_count(&engine, &id);
        let second = engine.materialize(&id, as_of, now).unwrap();

        prop_assert!(second.created.is_empty());
        prop_assert_eq!(occurrence_count(&engine, &id), stored_after_first);
        prop_assert_eq!(stored_after_first, first.created.len());
        prop_assert_eq!(
            engine.get(&id).unwrap().last_materialized_date,
            first.last_materialized_date
        );
    }

    #[test]
    fn offline_gap_is_backfilled(anchor in any_date(), gap in 0u64..60) {
        let engine = engine();
        let id = create_template(&engine, RecurrenceRule::new(Frequency::Daily, anchor));
        let as_of = anchor + Days::new(gap);

        let result = engine
            .materialize(&id, as_of, FixedClock::at_date(as_of).now())
            .unwrap();
        let due: Vec<NaiveDate> = result.created.iter().filter_map(|t| t.due_date).collect();
        let expected: Vec<NaiveDate> = anchor.iter_days().take(gap as usize + 1).collect();
        prop_assert_eq!(due, expected);
    }

    #[test]
    fn split_materialization_matches_one_pass(rule in any_rule(), a in 0u64..60, b in 0u64..60) {
        let one = engine();
        let split = engine();
        let one_id = create_template(&one, rule);
        let split_id = create_template(&split, rule);
        let mid = rule.anchor_date + Days::new(a.min(b));
        let end = rule.anchor_date + Days::new(a.max(b));

        let all = one.materialize(&one_id, end, FixedClock::at_date(end).now()).unwrap();
        let first = split.materialize(&split_id, mid, FixedClock::at_date(mid).now()).unwrap();
        let rest = split.materialize(&split_id, end, FixedClock::at_date(end).now()).unwrap();

        let dates = |tasks: &[kiwi_core::Task]| -> Vec<NaiveDate> {
            tasks.iter().filter_map(|t| t.due_date).collect()
        };
        let mut joined = dates(&first.created);
        joined.extend(dates(&rest.created));
        prop_assert_eq!(joined, dates(&all.created));
    }

    #[test]
    fn occurrences_stay_on_the_series(rule in any_rule(), ahead in 0u64..800) {
        let through = rule.anchor_date + Days::new(ahead);
        let dates: Vec<NaiveDate> = occurrences(&rule, None, through).unwrap().collect();

        for (k, date) in dates.iter().enumerate() {
            prop_assert_eq!(Some(*date), nth_occurrence(&rule, k as u32));
            prop_assert!(*date >= rule.anchor_date);
            prop_assert!(*date <= through);
            if let Some(end) = rule.end_date {
                prop_assert!(*date <= end);
            }
        }
        prop_assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn monthly_keeps_day_of_month(anchor in any_date(), interval in 1u32..4, k in 0u32..48) {
        let rule = RecurrenceRule::new(Frequency::Monthly, anchor).every(interval);
        let date = nth_occurrence(&rule, k).unwrap();
        let next_month = date
            .with_day(1)
            .and_then(|first| first.checked_add_months(chrono::Months::new(1)))
            .unwrap();
        let last_day = next_month.pred_opt().unwrap().day();
        prop_assert_eq!(date.day(), anchor.day().min(last_day));
    }
}
