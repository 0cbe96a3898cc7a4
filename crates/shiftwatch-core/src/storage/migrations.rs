//! Database schema migrations for shiftwatch.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

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

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (fresh database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: time entries and breaks.
///
/// The partial unique index enforces "at most one open entry per staff".
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS time_entries (
            id                   TEXT PRIMARY KEY,
            staff_id             TEXT NOT NULL,
            clock_in             TEXT NOT NULL,
            clock_out            TEXT,
            total_hours          REAL,
            was_late             INTEGER NOT NULL DEFAULT 0,
            late_by              INTEGER,
            late_reason          TEXT,
            was_early            INTEGER NOT NULL DEFAULT 0,
            early_by             INTEGER,
            was_early_clock_out  INTEGER NOT NULL DEFAULT 0,
            early_clock_out_by   INTEGER,
            clock_out_reason     TEXT,
            clock_out_notes      TEXT,
            worked_full_shift    INTEGER NOT NULL DEFAULT 0,
            break_plan           TEXT NOT NULL DEFAULT 'pending',
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_time_entries_open
            ON time_entries(staff_id) WHERE clock_out IS NULL;
        CREATE INDEX IF NOT EXISTS idx_time_entries_staff_clock_in
            ON time_entries(staff_id, clock_in);

        CREATE TABLE IF NOT EXISTS breaks (
            id               TEXT PRIMARY KEY,
            time_entry_id    TEXT NOT NULL REFERENCES time_entries(id),
            break_type       TEXT NOT NULL,
            scheduled_start  TEXT,
            scheduled_end    TEXT,
            actual_start     TEXT,
            actual_end       TEXT,
            duration_minutes INTEGER NOT NULL,
            active_secs      INTEGER,
            is_paused        INTEGER NOT NULL DEFAULT 0,
            paused_duration  INTEGER,
            paused_at        TEXT,
            resumed_at       TEXT,
            pause_used       INTEGER NOT NULL DEFAULT 0,
            is_late          INTEGER NOT NULL DEFAULT 0,
            late_by          INTEGER,
            away_reason      TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_breaks_time_entry ON breaks(time_entry_id);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: persisted alert bookkeeping.
///
/// Adds:
/// - time_entries.last_warning_minutes: smallest shift-end warning already sent
/// - time_entries.blocked_alert_for: break an auto clock-out block was reported for
/// - breaks.auto_started: started by the scheduled-break scanner
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE time_entries ADD COLUMN last_warning_minutes INTEGER;
         ALTER TABLE time_entries ADD COLUMN blocked_alert_for TEXT;
         ALTER TABLE breaks ADD COLUMN auto_started INTEGER NOT NULL DEFAULT 0;",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: at most one started, unended break per time entry.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_breaks_unresolved
            ON breaks(time_entry_id) WHERE actual_start IS NOT NULL AND actual_end IS NULL;",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}
