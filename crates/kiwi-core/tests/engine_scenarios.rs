//! End-to-end scenarios through the engine and the SQLite store.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use std::sync::Arc;
use std::thread;

use kiwi_core::gamification::StreakChange;
use kiwi_core::{
    retry_on_conflict, Event, Frequency, GamificationConfig, NewTask, RecurrenceRule, Task,
    TaskDb, TaskEngine, TaskFilter, TaskStatus, TaskStore,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn noon(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn engine_over(db: TaskDb) -> TaskEngine<TaskDb> {
    TaskEngine::new(db, GamificationConfig::default(), utc())
}

fn engine() -> TaskEngine<TaskDb> {
    engine_over(TaskDb::open_memory().unwrap())
}

fn template(engine: &TaskEngine<TaskDb>, rule: RecurrenceRule) -> Task {
    let mut new = NewTask::titled("Run");
    new.description = Some("5k loop".into());
    new.tags = vec!["health".into()];
    new.recurrence = Some(rule);
    engine.create(new, noon(rule.anchor_date)).unwrap()
}

fn occurrences(engine: &TaskEngine<TaskDb>, template_id: &str) -> Vec<Task> {
    let mut filter = TaskFilter::default();
    filter.parent_task_id = Some(template_id.to_string());
    filter.sort = "due_date".parse().unwrap();
    filter.limit = 100;
    engine.list(&filter).unwrap()
}

fn due_on(engine: &TaskEngine<TaskDb>, template_id: &str, due: NaiveDate) -> Task {
    occurrences(engine, template_id)
        .into_iter()
        .find(|t| t.due_date == Some(due))
        .unwrap()
}

#[test]
fn weekly_template_materializes_four_mondays() {
    let engine = engine();
    let monday = date(2024, 4, 1);
    assert_eq!(chrono::Datelike::weekday(&monday), Weekday::Mon);
    let template = template(&engine, RecurrenceRule::new(Frequency::Weekly, monday));

    let result = engine
        .materialize(&template.id, monday + Duration::days(21), noon(monday))
        .unwrap();

    let due: Vec<NaiveDate> = result.created.iter().filter_map(|t| t.due_date).collect();
    assert_eq!(
        due,
        vec![
            monday,
            monday + Duration::days(7),
            monday + Duration::days(14),
            monday + Duration::days(21),
        ]
    );
    assert_eq!(
        engine.get(&template.id).unwrap().last_materialized_date,
        Some(monday + Duration::days(21))
    );

    for occ in occurrences(&engine, &template.id) {
        assert_eq!(occ.parent_task_id.as_deref(), Some(template.id.as_str()));
        assert_eq!(occ.status, TaskStatus::Todo);
        assert_eq!(occ.title, "Run");
        assert_eq!(occ.description.as_deref(), Some("5k loop"));
        assert_eq!(occ.tags, vec!["health".to_string()]);
        assert!(!occ.is_template());
    }
}

#[test]
fn monthly_template_clamps_and_reanchors() {
    let engine = engine();
    let template = template(
        &engine,
        RecurrenceRule::new(Frequency::Monthly, date(2023, 1, 31)),
    );
    let result = engine
        .materialize(&template.id, date(2023, 4, 30), noon(date(2023, 4, 30)))
        .unwrap();
    let due: Vec<NaiveDate> = result.created.iter().filter_map(|t| t.due_date).collect();
    assert_eq!(
        due,
        vec![
            date(2023, 1, 31),
            date(2023, 2, 28),
            date(2023, 3, 31),
            date(2023, 4, 30),
        ]
    );
}

#[test]
fn end_date_stops_the_series() {
    let engine = engine();
    let rule = RecurrenceRule::new(Frequency::Daily, date(2024, 1, 1)).until(date(2024, 1, 3));
    let template = template(&engine, rule);
    let result = engine
        .materialize(&template.id, date(2024, 1, 10), noon(date(2024, 1, 10)))
        .unwrap();
    assert_eq!(result.created.len(), 3);
    assert_eq!(result.last_materialized_date, Some(date(2024, 1, 3)));
}

#[test]
fn streak_restarts_at_one_after_a_missed_occurrence() {
    let engine = engine();
    let anchor = date(2024, 5, 1);
    let template = template(&engine, RecurrenceRule::new(Frequency::Daily, anchor));
    engine.materialize(&template.id, date(2024, 5, 3), noon(anchor)).unwrap();

    // N on time
    let first = due_on(&engine, &template.id, date(2024, 5, 1));
    engine.complete(&first.id, noon(date(2024, 5, 1))).unwrap();
    assert_eq!(engine.streak(&template.id).unwrap().current_streak, 1);

    // N+1 missed entirely
    let events = engine.day_rollover(date(2024, 5, 3), noon(date(2024, 5, 3))).unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::StreakChanged { change: StreakChange::Broken, .. }
    )));
    assert_eq!(engine.streak(&template.id).unwrap().current_streak, 0);

    // N+2 completed late
    let third = due_on(&engine, &template.id, date(2024, 5, 3));
    engine.complete(&third.id, noon(date(2024, 5, 4))).unwrap();

    let streak = engine.streak(&template.id).unwrap();
    assert_eq!(streak.current_streak, 1);
    assert_eq!(streak.longest_streak, 1);
    assert_eq!(streak.grid.to_bits(), "0000101");
}

#[test]
fn completing_a_missed_occurrence_adds_a_success_after_the_miss() {
    let engine = engine();
    let anchor = date(2024, 5, 1);
    let template = template(&engine, RecurrenceRule::new(Frequency::Daily, anchor));
    engine.materialize(&template.id, anchor, noon(anchor)).unwrap();

    engine.day_rollover(date(2024, 5, 2), noon(date(2024, 5, 2))).unwrap();
    assert_eq!(engine.streak(&template.id).unwrap().grid.to_bits(), "0000000");

    let missed = due_on(&engine, &template.id, anchor);
    engine.complete(&missed.id, noon(date(2024, 5, 2))).unwrap();

    // the grid keeps the miss and appends the late success
    let streak = engine.streak(&template.id).unwrap();
    assert_eq!(streak.grid.to_bits(), "0000001");
    assert_eq!(streak.current_streak, 1);
    assert!(engine
        .day_rollover(date(2024, 5, 2), noon(date(2024, 5, 2)))
        .unwrap()
        .is_empty());
}

#[test]
fn late_completion_counts_but_restarts_the_streak() {
    let engine = engine();
    let anchor = date(2024, 5, 1);
    let template = template(&engine, RecurrenceRule::new(Frequency::Daily, anchor));
    engine.materialize(&template.id, date(2024, 5, 3), noon(anchor)).unwrap();

    for day in [1, 2] {
        let occ = due_on(&engine, &template.id, date(2024, 5, day));
        engine.complete(&occ.id, noon(date(2024, 5, day))).unwrap();
    }
    let third = due_on(&engine, &template.id, date(2024, 5, 3));
    let update = engine.complete(&third.id, noon(date(2024, 5, 4))).unwrap();

    assert!(update.events.iter().any(|e| matches!(
        e,
        Event::StreakChanged { change: StreakChange::Restarted, current_streak: 1, .. }
    )));
    let streak = engine.streak(&template.id).unwrap();
    assert_eq!(streak.current_streak, 1);
    assert_eq!(streak.longest_streak, 2);
}

#[test]
fn deleting_a_template_keeps_its_history() {
    let engine = engine();
    let anchor = date(2024, 5, 1);
    let template = template(&engine, RecurrenceRule::new(Frequency::Daily, anchor));
    engine.materialize(&template.id, date(2024, 5, 3), noon(anchor)).unwrap();
    let first = due_on(&engine, &template.id, anchor);
    engine.complete(&first.id, noon(anchor)).unwrap();

    assert_eq!(engine.delete(&template.id).unwrap(), 1);
    assert_eq!(occurrences(&engine, &template.id).len(), 3);
    assert!(engine.store().get_streak_state(&template.id).unwrap().is_none());

    // A surviving occurrence still completes; it just earns base XP.
    let second = due_on(&engine, &template.id, date(2024, 5, 2));
    let update = engine.complete(&second.id, noon(date(2024, 5, 2))).unwrap();
    assert!(update
        .events
        .iter()
        .any(|e| matches!(e, Event::XpAwarded { amount: 10, .. })));
}

#[test]
fn level_ups_and_badges_are_reported_once() {
    let engine = engine();
    let mut seen_first_completion = 0;
    let mut level_ups = 0;
    for i in 0..12 {
        let task = engine
            .create(NewTask::titled(format!("Chore {i}")), noon(date(2024, 5, 1)))
            .unwrap();
        let update = engine.complete(&task.id, noon(date(2024, 5, 1))).unwrap();
        for event in &update.events {
            match event {
                Event::BadgeEarned { badge, .. }
                    if *badge == kiwi_core::Badge::FirstCompletion =>
                {
                    seen_first_completion += 1
                }
                Event::LevelUp { .. } => level_ups += 1,
                _ => {}
            }
        }
    }

    let profile = engine.profile(noon(date(2024, 5, 1))).unwrap();
    assert_eq!(profile.state.xp, 120);
    assert_eq!(profile.state.level, 2);
    assert_eq!(seen_first_completion, 1);
    assert_eq!(level_ups, 1);
    assert!(profile.state.badges.contains(&kiwi_core::Badge::Xp100));
    assert_eq!(profile.xp_to_next_level, Some(180));
}

#[test]
fn concurrent_materialization_in_one_process_creates_each_date_once() {
    let engine = Arc::new(engine());
    let anchor = date(2024, 5, 1);
    let template = template(&engine, RecurrenceRule::new(Frequency::Daily, anchor));
    let as_of = date(2024, 5, 20);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let id = template.id.clone();
            thread::spawn(move || engine.materialize(&id, as_of, noon(as_of)).unwrap())
        })
        .collect();
    let created: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap().created.len())
        .sum();

    assert_eq!(created, 20);
    assert_eq!(occurrences(&engine, &template.id).len(), 20);
}

#[test]
fn concurrent_materialization_across_connections_creates_each_date_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiwi.db");
    let anchor = date(2024, 5, 1);
    let as_of = date(2024, 5, 15);

    let setup = engine_over(TaskDb::open_at(&path).unwrap());
    let template_id = template(&setup, RecurrenceRule::new(Frequency::Daily, anchor)).id;

    // Separate engines share no in-process locks; only the store's
    // compare-and-set on the cursor keeps them apart.
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let id = template_id.clone();
            thread::spawn(move || {
                let engine = engine_over(TaskDb::open_at(&path).unwrap());
                retry_on_conflict(5, || engine.materialize(&id, as_of, noon(as_of)))
                    .unwrap()
                    .created
                    .len()
            })
        })
        .collect();
    let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(created, 15);
    assert_eq!(occurrences(&setup, &template_id).len(), 15);
    assert_eq!(setup.store().count_tasks().unwrap(), 16);
}

#[test]
fn concurrent_daily_runs_across_connections_retry_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiwi.db");
    let anchor = date(2024, 5, 1);
    let as_of = date(2024, 5, 15);

    let setup = engine_over(TaskDb::open_at(&path).unwrap());
    let template_id = template(&setup, RecurrenceRule::new(Frequency::Daily, anchor)).id;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let engine = engine_over(TaskDb::open_at(&path).unwrap());
                engine.run_daily(as_of, noon(as_of)).unwrap().materialized
            })
        })
        .collect();
    let stats: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // a losing writer re-reads the cursor, finds nothing left and succeeds
    assert!(stats.iter().all(|s| s.conflicts == 0 && s.errors == 0));
    assert_eq!(stats.iter().map(|s| s.occurrences_created).sum::<usize>(), 15);
    assert_eq!(occurrences(&setup, &template_id).len(), 15);
}

#[test]
fn concurrent_completions_keep_xp_consistent() {
    let engine = Arc::new(engine());
    let tasks: Vec<Task> = (0..10)
        .map(|i| {
            engine
                .create(NewTask::titled(format!("Task {i}")), noon(date(2024, 5, 1)))
                .unwrap()
        })
        .collect();

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.complete(&task.id, noon(date(2024, 5, 1))).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let profile = engine.profile(noon(date(2024, 5, 1))).unwrap();
    assert_eq!(profile.state.xp, 100);
    assert_eq!(profile.state.completions, 10);
}

#[test]
fn run_daily_twice_is_a_no_op() {
    let engine = engine();
    let anchor = date(2024, 5, 1);
    let template = template(&engine, RecurrenceRule::new(Frequency::Daily, anchor));

    let first = engine.run_daily(date(2024, 5, 4), noon(date(2024, 5, 4))).unwrap();
    let before = engine.streak(&template.id).unwrap();
    let second = engine.run_daily(date(2024, 5, 4), noon(date(2024, 5, 4))).unwrap();

    assert_eq!(first.materialized.occurrences_created, 4);
    assert_eq!(second.materialized.occurrences_created, 0);
    assert!(second.events.is_empty());
    assert_eq!(engine.streak(&template.id).unwrap(), before);
}
