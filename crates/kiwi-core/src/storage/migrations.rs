//! Database schema migrations for kiwi.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use indoc::indoc;
use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 4;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }
    if current_version < 4 {
        migrate_v4(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version, assuming 0");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Run one migration step in its own transaction.
fn apply(conn: &Connection, version: i32, sql: &str) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    set_schema_version(&tx, version)?;
    tx.commit()?;
    tracing::debug!(version, "applied schema migration");
    Ok(())
}

/// Migration v1: tasks.
///
/// Dates are `YYYY-MM-DD`, timestamps RFC 3339 UTC, tags a JSON array.
/// A row with a non-null `recurrence_frequency` is a template.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    apply(
        conn,
        1,
        indoc! {"
            CREATE TABLE IF NOT EXISTS tasks (
                id                      TEXT PRIMARY KEY,
                title                   TEXT NOT NULL,
                description             TEXT,
                status                  TEXT NOT NULL DEFAULT 'todo',
                priority                TEXT NOT NULL DEFAULT 'normal',
                priority_rank           INTEGER NOT NULL DEFAULT 1,
                due_date                TEXT,
                tags                    TEXT NOT NULL DEFAULT '[]',
                recurrence_frequency    TEXT,
                recurrence_anchor       TEXT,
                recurrence_interval     INTEGER,
                recurrence_end          TEXT,
                parent_task_id          TEXT,
                last_materialized_date  TEXT,
                created_at              TEXT NOT NULL,
                updated_at              TEXT NOT NULL,
                completed_at            TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id, due_date);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks(created_at);
        "},
    )
}

/// Migration v2: per-template streaks.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    apply(
        conn,
        2,
        indoc! {"
            CREATE TABLE IF NOT EXISTS streaks (
                template_id           TEXT PRIMARY KEY,
                current_streak        INTEGER NOT NULL DEFAULT 0,
                longest_streak        INTEGER NOT NULL DEFAULT 0,
                last_completed_date   TEXT,
                last_missed_due_date  TEXT,
                grid                  TEXT NOT NULL DEFAULT '0000000',
                version               INTEGER NOT NULL DEFAULT 1
            );
        "},
    )
}

/// Migration v3: the single gamification record, earned badges and the XP
/// ledger (one row per credited task).
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    apply(
        conn,
        3,
        indoc! {"
            CREATE TABLE IF NOT EXISTS gamification (
                id           INTEGER PRIMARY KEY CHECK (id = 1),
                xp           INTEGER NOT NULL DEFAULT 0,
                level        INTEGER NOT NULL DEFAULT 1,
                completions  INTEGER NOT NULL DEFAULT 0,
                version      INTEGER NOT NULL DEFAULT 1,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS badges (
                badge      TEXT PRIMARY KEY,
                earned_at  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS xp_awards (
                task_id     TEXT PRIMARY KEY,
                amount      INTEGER NOT NULL,
                awarded_at  TEXT NOT NULL
            );
        "},
    )
}

/// Migration v4: flag materialized occurrences and allow one per template
/// and due date.
///
/// Existing children of a template are flagged one per due date; any extra
/// hand-made child keeps the flag unset.
fn migrate_v4(conn: &Connection) -> SqliteResult<()> {
    apply(
        conn,
        4,
        indoc! {"
            ALTER TABLE tasks ADD COLUMN is_occurrence INTEGER NOT NULL DEFAULT 0;
            UPDATE tasks SET is_occurrence = 1
            WHERE rowid IN (
                SELECT MIN(c.rowid)
                FROM tasks c JOIN tasks p ON p.id = c.parent_task_id
                WHERE p.recurrence_frequency IS NOT NULL
                  AND c.recurrence_frequency IS NULL
                  AND c.due_date IS NOT NULL
                GROUP BY c.parent_task_id, c.due_date
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_occurrence
                ON tasks(parent_task_id, due_date) WHERE is_occurrence = 1;
        "},
    )
}
