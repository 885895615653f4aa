//! SQLite-backed [`TaskStore`].
//!
//! One connection behind a mutex. Every compound write runs inside
//! `BEGIN IMMEDIATE`, which takes SQLite's write lock up front so a second
//! process (the daemon and a CLI call, say) cannot interleave with it.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::data_dir;
use super::migrations;
use super::store::{CompletionCommit, TaskStore};
use crate::error::{CoreError, DatabaseError, InvalidRuleError, Result};
use crate::gamification::{Badge, CompletionGrid, GamificationState, StreakState};
use crate::recurrence::RecurrenceRule;
use crate::task::{Task, TaskFilter};

const DB_FILE: &str = "kiwi.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TASK_COLUMNS: &str = "id, title, description, status, priority, due_date, tags, \
     recurrence_frequency, recurrence_anchor, recurrence_interval, recurrence_end, \
     parent_task_id, last_materialized_date, created_at, updated_at, completed_at";

// === Helper Functions ===

/// Format a timestamp for storage. Fixed precision keeps the text sortable
/// and comparable for compare-and-set.
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn corrupt(table: &str, message: impl Into<String>) -> CoreError {
    DatabaseError::Corrupt {
        table: table.to_string(),
        message: message.into(),
    }
    .into()
}

fn parse_ts(table: &str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("bad timestamp '{s}': {e}")))
}

fn parse_stored_date(table: &str, s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| corrupt(table, format!("bad date '{s}': {e}")))
}

fn parse_opt_date(table: &str, s: Option<String>) -> Result<Option<NaiveDate>> {
    s.as_deref().map(|s| parse_stored_date(table, s)).transpose()
}

fn to_db_int(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| DatabaseError::QueryFailed(format!("{value} does not fit an INTEGER column")).into())
}

fn from_db_int<T: TryFrom<i64>>(table: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| corrupt(table, format!("value {value} out of range")))
}

/// Raw `tasks` row, decoded into a [`Task`] after the statement finishes.
struct TaskRow {
    id: String,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    due_date: Option<String>,
    tags: String,
    frequency: Option<String>,
    anchor: Option<String>,
    interval: Option<i64>,
    end: Option<String>,
    parent_task_id: Option<String>,
    last_materialized_date: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TaskRow {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            due_date: row.get(5)?,
            tags: row.get(6)?,
            frequency: row.get(7)?,
            anchor: row.get(8)?,
            interval: row.get(9)?,
            end: row.get(10)?,
            parent_task_id: row.get(11)?,
            last_materialized_date: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            completed_at: row.get(15)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let id = self.id.clone();
        let bad = |field: &str, e: &dyn std::fmt::Display| {
            corrupt("tasks", format!("task {id}: {field}: {e}"))
        };
        let recurrence = match (&self.frequency, &self.anchor) {
            (Some(frequency), Some(anchor)) => Some(
                RecurrenceRule::parse(
                    frequency,
                    anchor,
                    self.interval.unwrap_or(1),
                    self.end.as_deref(),
                )
                .map_err(|e| bad("recurrence", &e))?,
            ),
            (None, None) => None,
            _ => return Err(bad("recurrence", &"frequency and anchor must be set together")),
        };
        let tags: Vec<String> =
            serde_json::from_str(&self.tags).map_err(|e| bad("tags", &e))?;

        Ok(Task {
            status: self.status.parse().map_err(|e| bad("status", &e))?,
            priority: self.priority.parse().map_err(|e| bad("priority", &e))?,
            due_date: parse_opt_date("tasks", self.due_date)?,
            last_materialized_date: parse_opt_date("tasks", self.last_materialized_date)?,
            created_at: parse_ts("tasks", &self.created_at)?,
            updated_at: parse_ts("tasks", &self.updated_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|s| parse_ts("tasks", s))
                .transpose()?,
            recurrence,
            tags,
            id: self.id,
            title: self.title,
            description: self.description,
            parent_task_id: self.parent_task_id,
        })
    }
}

fn query_tasks<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, TaskRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(TaskRow::into_task).collect()
}

fn fetch_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    Ok(query_tasks(conn, &sql, params![id])?.into_iter().next())
}

fn recurrence_params(
    rule: Option<&RecurrenceRule>,
) -> (Option<&'static str>, Option<String>, Option<i64>, Option<String>) {
    match rule {
        Some(rule) => (
            Some(rule.frequency.as_str()),
            Some(format_date(rule.anchor_date)),
            Some(i64::from(rule.interval)),
            rule.end_date.map(format_date),
        ),
        None => (None, None, None, None),
    }
}

fn insert_task_row(conn: &Connection, task: &Task) -> Result<()> {
    let tags = serde_json::to_string(&task.tags)?;
    let (frequency, anchor, interval, end) = recurrence_params(task.recurrence.as_ref());
    conn.execute(
        "INSERT INTO tasks (
            id, title, description, status, priority, priority_rank, due_date, tags,
            recurrence_frequency, recurrence_anchor, recurrence_interval, recurrence_end,
            parent_task_id, last_materialized_date, created_at, updated_at, completed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            task.id,
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.priority.rank(),
            task.due_date.map(format_date),
            tags,
            frequency,
            anchor,
            interval,
            end,
            task.parent_task_id,
            task.last_materialized_date.map(format_date),
            format_ts(task.created_at),
            format_ts(task.updated_at),
            task.completed_at.map(format_ts),
        ],
    )?;
    Ok(())
}

/// Compare-and-set update of a task row. The materialization cursor is left
/// alone; only [`TaskStore::save_occurrences_and_advance`] moves it.
fn update_task_row(conn: &Connection, task: &Task, expected_updated_at: DateTime<Utc>) -> Result<()> {
    let tags = serde_json::to_string(&task.tags)?;
    let (frequency, anchor, interval, end) = recurrence_params(task.recurrence.as_ref());
    let changed = conn.execute(
        "UPDATE tasks
         SET title = ?2, description = ?3, status = ?4, priority = ?5, priority_rank = ?6,
             due_date = ?7, tags = ?8, recurrence_frequency = ?9, recurrence_anchor = ?10,
             recurrence_interval = ?11, recurrence_end = ?12, parent_task_id = ?13,
             updated_at = ?14, completed_at = ?15
         WHERE id = ?1 AND updated_at = ?16",
        params![
            task.id,
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.priority.rank(),
            task.due_date.map(format_date),
            tags,
            frequency,
            anchor,
            interval,
            end,
            task.parent_task_id,
            format_ts(task.updated_at),
            task.completed_at.map(format_ts),
            format_ts(expected_updated_at),
        ],
    )?;
    if changed == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
            params![task.id],
            |row| row.get(0),
        )?;
        return Err(if exists {
            CoreError::conflict("task", &task.id)
        } else {
            CoreError::not_found("task", &task.id)
        });
    }
    Ok(())
}

fn write_streak(conn: &Connection, state: &StreakState) -> Result<()> {
    let current = i64::from(state.current_streak);
    let longest = i64::from(state.longest_streak);
    let completed = state.last_completed_date.map(format_date);
    let missed = state.last_missed_due_date.map(format_date);
    let grid = state.grid.to_bits();
    let changed = if state.version == 0 {
        conn.execute(
            "INSERT INTO streaks (
                template_id, current_streak, longest_streak, last_completed_date,
                last_missed_due_date, grid, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
             ON CONFLICT(template_id) DO NOTHING",
            params![state.template_id, current, longest, completed, missed, grid],
        )?
    } else {
        conn.execute(
            "UPDATE streaks
             SET current_streak = ?2, longest_streak = ?3, last_completed_date = ?4,
                 last_missed_due_date = ?5, grid = ?6, version = version + 1
             WHERE template_id = ?1 AND version = ?7",
            params![state.template_id, current, longest, completed, missed, grid, state.version],
        )?
    };
    if changed == 0 {
        return Err(CoreError::conflict("streak", &state.template_id));
    }
    Ok(())
}

fn write_gamification(conn: &Connection, state: &GamificationState) -> Result<()> {
    let xp = to_db_int(state.xp)?;
    let level = i64::from(state.level);
    let completions = to_db_int(state.completions)?;
    let updated_at = format_ts(state.updated_at);
    let changed = if state.version == 0 {
        conn.execute(
            "INSERT INTO gamification (id, xp, level, completions, version, created_at, updated_at)
             VALUES (1, ?1, ?2, ?3, 1, ?4, ?5)
             ON CONFLICT(id) DO NOTHING",
            params![xp, level, completions, format_ts(state.created_at), updated_at],
        )?
    } else {
        conn.execute(
            "UPDATE gamification
             SET xp = ?1, level = ?2, completions = ?3, version = version + 1, updated_at = ?4
             WHERE id = 1 AND version = ?5",
            params![xp, level, completions, updated_at, state.version],
        )?
    };
    if changed == 0 {
        return Err(CoreError::conflict("gamification", "profile"));
    }
    for badge in &state.badges {
        conn.execute(
            "INSERT OR IGNORE INTO badges (badge, earned_at) VALUES (?1, ?2)",
            params![badge.as_str(), updated_at],
        )?;
    }
    Ok(())
}

/// SQLite task database.
pub struct TaskDb {
    conn: Mutex<Connection>,
}

impl TaskDb {
    /// Open the database at `<data_dir>/kiwi.db`, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(data_dir()?.join(DB_FILE))
    }

    /// Open (or create) a database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "opened task database");
        Self::init(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if migration fails.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::QueryFailed("connection mutex poisoned".into()).into())
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling
    /// back on any error.
    fn with_tx<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result = f(&conn).and_then(|value| {
            conn.execute_batch("COMMIT;")?;
            Ok(value)
        });
        if result.is_err() && !conn.is_autocommit() {
            let _ = conn.execute_batch("ROLLBACK;");
        }
        result
    }

    /// Number of stored tasks.
    pub fn count_tasks(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        from_db_int("tasks", n)
    }
}

impl TaskStore for TaskDb {
    fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = self.lock()?;
        insert_task_row(&conn, task)
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.lock()?;
        fetch_task(&conn, id)
    }

    fn update_task(&self, task: &Task, expected_updated_at: DateTime<Utc>) -> Result<()> {
        self.with_tx(|conn| update_task_row(conn, task, expected_updated_at))
    }

    fn delete_task(&self, id: &str) -> Result<usize> {
        self.with_tx(|conn| {
            // Descend through plain tasks only; a template's occurrences stay.
            let mut stmt = conn.prepare(
                "WITH RECURSIVE tree(id, template) AS (
                    SELECT id, recurrence_frequency IS NOT NULL FROM tasks WHERE id = ?1
                    UNION
                    SELECT t.id, t.recurrence_frequency IS NOT NULL
                    FROM tasks t JOIN tree ON t.parent_task_id = tree.id
                    WHERE tree.template = 0
                 )
                 SELECT id, template FROM tree",
            )?;
            let doomed = stmt
                .query_map(params![id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if doomed.is_empty() {
                return Err(CoreError::not_found("task", id));
            }
            for (task_id, template) in &doomed {
                if *template {
                    conn.execute("DELETE FROM streaks WHERE template_id = ?1", params![task_id])?;
                }
                conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            }
            Ok(doomed.len())
        })
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        filter.validate()?;
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(q) = filter.query.as_deref().filter(|q| !q.is_empty()) {
            clauses.push("instr(lower(title), lower(?)) > 0".into());
            values.push(Value::Text(q.to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?".into());
            values.push(Value::Text(status.as_str().into()));
        }
        if let Some(priority) = filter.priority {
            clauses.push("priority = ?".into());
            values.push(Value::Text(priority.as_str().into()));
        }
        if !filter.tags.is_empty() {
            let slots = vec!["lower(?)"; filter.tags.len()].join(", ");
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(tasks.tags) WHERE lower(json_each.value) IN ({slots}))"
            ));
            values.extend(filter.tags.iter().map(|t| Value::Text(t.clone())));
        }
        if let Some(parent) = filter.parent_task_id.as_deref() {
            clauses.push("parent_task_id = ?".into());
            values.push(Value::Text(parent.to_string()));
        }
        if filter.top_level_only {
            clauses.push("parent_task_id IS NULL".into());
        }
        if filter.templates_only {
            clauses.push("recurrence_frequency IS NOT NULL".into());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks {where_sql} ORDER BY {} LIMIT ? OFFSET ?",
            filter.sort.order_by()
        );
        values.push(Value::Integer(i64::from(filter.limit)));
        values.push(Value::Integer(i64::from(filter.offset)));

        let conn = self.lock()?;
        query_tasks(&conn, &sql, params_from_iter(values))
    }

    fn all_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at, id");
        query_tasks(&conn, &sql, [])
    }

    fn all_tags(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT json_each.value FROM tasks, json_each(tasks.tags) ORDER BY 1",
        )?;
        let tags = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    fn template_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM tasks WHERE recurrence_frequency IS NOT NULL ORDER BY created_at, id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn save_occurrences_and_advance(
        &self,
        template_id: &str,
        expected_last: Option<NaiveDate>,
        new_last: NaiveDate,
        occurrences: &[Task],
    ) -> Result<()> {
        self.with_tx(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET last_materialized_date = ?2
                 WHERE id = ?1 AND recurrence_frequency IS NOT NULL
                   AND last_materialized_date IS ?3",
                params![
                    template_id,
                    format_date(new_last),
                    expected_last.map(format_date)
                ],
            )?;
            if changed == 0 {
                return Err(match fetch_task(conn, template_id)? {
                    Some(t) if t.is_template() => CoreError::conflict("template", template_id),
                    Some(_) => InvalidRuleError::NotATemplate(template_id.into()).into(),
                    None => CoreError::not_found("template", template_id),
                });
            }
            for occurrence in occurrences {
                insert_task_row(conn, occurrence)?;
                conn.execute(
                    "UPDATE tasks SET is_occurrence = 1 WHERE id = ?1",
                    params![occurrence.id],
                )?;
            }
            Ok(())
        })
    }

    fn get_streak_state(&self, template_id: &str) -> Result<Option<StreakState>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT current_streak, longest_streak, last_completed_date,
                        last_missed_due_date, grid, version
                 FROM streaks WHERE template_id = ?1",
                params![template_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((current, longest, completed, missed, grid, version)) = row else {
            return Ok(None);
        };
        Ok(Some(StreakState {
            template_id: template_id.to_string(),
            current_streak: from_db_int("streaks", current)?,
            longest_streak: from_db_int("streaks", longest)?,
            last_completed_date: parse_opt_date("streaks", completed)?,
            last_missed_due_date: parse_opt_date("streaks", missed)?,
            grid: CompletionGrid::from_bits(&grid)
                .ok_or_else(|| corrupt("streaks", format!("bad grid '{grid}'")))?,
            version,
        }))
    }

    fn save_streak_state(&self, state: &StreakState) -> Result<()> {
        self.with_tx(|conn| write_streak(conn, state))
    }

    fn get_gamification(&self) -> Result<Option<GamificationState>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT xp, level, completions, version, created_at, updated_at
                 FROM gamification WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((xp, level, completions, version, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare("SELECT badge FROM badges ORDER BY badge")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let badges = names
            .iter()
            .map(|name| {
                name.parse::<Badge>()
                    .map_err(|e| corrupt("badges", e.to_string()))
            })
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(Some(GamificationState {
            xp: from_db_int("gamification", xp)?,
            level: from_db_int("gamification", level)?,
            badges,
            completions: from_db_int("gamification", completions)?,
            version,
            created_at: parse_ts("gamification", &created_at)?,
            updated_at: parse_ts("gamification", &updated_at)?,
        }))
    }

    fn previous_occurrence(&self, template_id: &str, due: NaiveDate) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE parent_task_id = ?1 AND recurrence_frequency IS NULL
               AND due_date IS NOT NULL AND due_date < ?2
             ORDER BY due_date DESC, created_at DESC LIMIT 1"
        );
        Ok(query_tasks(&conn, &sql, params![template_id, format_date(due)])?
            .into_iter()
            .next())
    }

    fn open_occurrences_due_before(&self, template_id: &str, date: NaiveDate) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE parent_task_id = ?1 AND recurrence_frequency IS NULL
               AND status IN ('todo', 'doing')
               AND due_date IS NOT NULL AND due_date < ?2
             ORDER BY due_date"
        );
        query_tasks(&conn, &sql, params![template_id, format_date(date)])
    }

    fn is_credited(&self, task_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM xp_awards WHERE task_id = ?1)",
            params![task_id],
            |row| row.get(0),
        )?)
    }

    fn commit_completion(&self, commit: CompletionCommit<'_>) -> Result<()> {
        self.with_tx(|conn| {
            update_task_row(conn, commit.task, commit.expected_updated_at)?;
            if let Some(streak) = commit.streak {
                write_streak(conn, streak)?;
            }
            if let Some(profile) = commit.gamification {
                write_gamification(conn, profile)?;
                let changed = conn.execute(
                    "INSERT INTO xp_awards (task_id, amount, awarded_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(task_id) DO NOTHING",
                    params![
                        commit.task.id,
                        to_db_int(commit.xp_awarded)?,
                        format_ts(profile.updated_at)
                    ],
                )?;
                if changed == 0 {
                    return Err(CoreError::conflict("task", &commit.task.id));
                }
            }
            Ok(())
        })
    }
}
