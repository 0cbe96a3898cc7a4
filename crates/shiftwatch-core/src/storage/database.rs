//! SQLite-backed repository.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so lexical order matches chronological order; scheduled break boundaries
//! use the "h:mm AM" encoding.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{error, info};

use super::{data_dir, migrations, Repository};
use crate::error::{CoreError, DatabaseError, Result, ShiftError};
use crate::models::{Break, BreakPlanStatus, BreakType, ClockOutReason, TimeEntry};
use crate::schedule::{format_time_of_day, parse_time_of_day};

const ENTRY_COLUMNS: &str = "id, staff_id, clock_in, clock_out, total_hours, was_late, late_by,
     late_reason, was_early, early_by, was_early_clock_out, early_clock_out_by,
     clock_out_reason, clock_out_notes, worked_full_shift, break_plan,
     last_warning_minutes, blocked_alert_for, created_at, updated_at";

const BREAK_COLUMNS: &str = "id, time_entry_id, break_type, scheduled_start, scheduled_end,
     actual_start, actual_end, duration_minutes, active_secs, is_paused, paused_duration,
     paused_at, resumed_at, pause_used, is_late, late_by, away_reason, auto_started,
     created_at, updated_at";

/// SQLite repository. One connection behind a mutex. Other processes may
/// hold the same file, so every update carries its own state guard.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open the database at `<data_dir>/<file_name>`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(file_name: &str) -> Result<Self> {
        let path = data_dir()?.join(file_name);
        Self::open_at(&path)
    }

    /// Open (and migrate) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!(error = %err, "failed to enable WAL mode");
        }
        // The CLI and a running `watch` share the file.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let repo = Self::from_connection(conn)?;
        info!(path = %path.display(), "database opened");
        Ok(repo)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_opt(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(ts)
}

fn parse_ts(table: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            DatabaseError::CorruptRow {
                table,
                message: format!("invalid timestamp '{raw}': {e}"),
            }
            .into()
        })
}

fn parse_ts_opt(table: &'static str, raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|r| parse_ts(table, &r)).transpose()
}

fn corrupt(table: &'static str, message: String) -> crate::error::CoreError {
    DatabaseError::CorruptRow { table, message }.into()
}

fn row_to_entry(row: &Row) -> Result<TimeEntry> {
    const T: &str = "time_entries";
    let reason: Option<String> = row.get("clock_out_reason")?;
    let plan: String = row.get("break_plan")?;
    Ok(TimeEntry {
        id: row.get("id")?,
        staff_id: row.get("staff_id")?,
        clock_in: parse_ts(T, &row.get::<_, String>("clock_in")?)?,
        clock_out: parse_ts_opt(T, row.get("clock_out")?)?,
        total_hours: row.get("total_hours")?,
        was_late: row.get("was_late")?,
        late_by: row.get("late_by")?,
        late_reason: row.get("late_reason")?,
        was_early: row.get("was_early")?,
        early_by: row.get("early_by")?,
        was_early_clock_out: row.get("was_early_clock_out")?,
        early_clock_out_by: row.get("early_clock_out_by")?,
        clock_out_reason: reason
            .map(|r| {
                ClockOutReason::parse(&r).ok_or_else(|| corrupt(T, format!("unknown reason '{r}'")))
            })
            .transpose()?,
        clock_out_notes: row.get("clock_out_notes")?,
        worked_full_shift: row.get("worked_full_shift")?,
        break_plan: BreakPlanStatus::parse(&plan)
            .ok_or_else(|| corrupt(T, format!("unknown break plan '{plan}'")))?,
        last_warning_minutes: row.get("last_warning_minutes")?,
        blocked_alert_for: row.get("blocked_alert_for")?,
        created_at: parse_ts(T, &row.get::<_, String>("created_at")?)?,
        updated_at: parse_ts(T, &row.get::<_, String>("updated_at")?)?,
    })
}

fn row_to_break(row: &Row) -> Result<Break> {
    const T: &str = "breaks";
    let kind: String = row.get("break_type")?;
    let time = |col: &str| -> Result<_> {
        row.get::<_, Option<String>>(col)?
            .map(|raw| parse_time_of_day(&raw).map_err(|e| corrupt(T, e.to_string())))
            .transpose()
    };
    Ok(Break {
        id: row.get("id")?,
        time_entry_id: row.get("time_entry_id")?,
        break_type: BreakType::parse(&kind)
            .ok_or_else(|| corrupt(T, format!("unknown break type '{kind}'")))?,
        scheduled_start: time("scheduled_start")?,
        scheduled_end: time("scheduled_end")?,
        actual_start: parse_ts_opt(T, row.get("actual_start")?)?,
        actual_end: parse_ts_opt(T, row.get("actual_end")?)?,
        duration_minutes: row.get("duration_minutes")?,
        active_secs: row.get("active_secs")?,
        is_paused: row.get("is_paused")?,
        paused_duration: row.get("paused_duration")?,
        paused_at: parse_ts_opt(T, row.get("paused_at")?)?,
        resumed_at: parse_ts_opt(T, row.get("resumed_at")?)?,
        pause_used: row.get("pause_used")?,
        is_late: row.get("is_late")?,
        late_by: row.get("late_by")?,
        away_reason: row.get("away_reason")?,
        auto_started: row.get("auto_started")?,
        created_at: parse_ts(T, &row.get::<_, String>("created_at")?)?,
        updated_at: parse_ts(T, &row.get::<_, String>("updated_at")?)?,
    })
}

fn insert_break_row(conn: &Connection, b: &Break) -> Result<()> {
    let inserted = conn.execute(
        &format!(
            "INSERT INTO breaks ({BREAK_COLUMNS})
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
             WHERE EXISTS (SELECT 1 FROM time_entries WHERE id = ?2 AND clock_out IS NULL)"
        ),
        params![
            b.id,
            b.time_entry_id,
            b.break_type.as_str(),
            b.scheduled_start.map(format_time_of_day),
            b.scheduled_end.map(format_time_of_day),
            ts_opt(b.actual_start),
            ts_opt(b.actual_end),
            b.duration_minutes,
            b.active_secs,
            b.is_paused,
            b.paused_duration,
            ts_opt(b.paused_at),
            ts_opt(b.resumed_at),
            b.pause_used,
            b.is_late,
            b.late_by,
            b.away_reason,
            b.auto_started,
            ts(b.created_at),
            ts(b.updated_at),
        ],
    )?;
    if inserted == 0 {
        return Err(closed_parent(conn, &b.time_entry_id));
    }
    Ok(())
}

/// Stored `clock_out` of an entry: `None` if the row is missing.
fn stored_clock_out(conn: &Connection, id: &str) -> rusqlite::Result<Option<Option<String>>> {
    conn.query_row(
        "SELECT clock_out FROM time_entries WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .optional()
}

fn unresolved_break_id(conn: &Connection, time_entry_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM breaks
         WHERE time_entry_id = ?1 AND actual_start IS NOT NULL AND actual_end IS NULL
         LIMIT 1",
        params![time_entry_id],
        |row| row.get(0),
    )
    .optional()
}

fn closed_parent(conn: &Connection, time_entry_id: &str) -> CoreError {
    match stored_clock_out(conn, time_entry_id) {
        Err(err) => err.into(),
        Ok(None) => ShiftError::TimeEntryNotFound(time_entry_id.to_string()).into(),
        Ok(Some(_)) => ShiftError::TimeEntryClosed(time_entry_id.to_string()).into(),
    }
}

/// Why a guarded time entry update matched no row.
fn entry_refusal(conn: &Connection, e: &TimeEntry) -> CoreError {
    match stored_clock_out(conn, &e.id) {
        Err(err) => return err.into(),
        Ok(None) => return ShiftError::TimeEntryNotFound(e.id.clone()).into(),
        Ok(Some(Some(_))) => return ShiftError::TimeEntryClosed(e.id.clone()).into(),
        Ok(Some(None)) => {}
    }
    if e.clock_out.is_some() {
        match unresolved_break_id(conn, &e.id) {
            Err(err) => return err.into(),
            Ok(Some(break_id)) => return ShiftError::ActiveBreakBlocksClockOut { break_id }.into(),
            Ok(None) => {}
        }
    }
    DatabaseError::WriteConflict {
        table: "time_entries",
        id: e.id.clone(),
    }
    .into()
}

/// Why a guarded break update matched no row.
fn break_refusal(conn: &Connection, b: &Break) -> CoreError {
    let stored: rusqlite::Result<Option<String>> = conn
        .query_row(
            "SELECT time_entry_id FROM breaks WHERE id = ?1",
            params![b.id],
            |row| row.get(0),
        )
        .optional();
    match stored {
        Err(err) => err.into(),
        Ok(None) => ShiftError::BreakNotFound(b.id.clone()).into(),
        Ok(Some(entry_id)) => match stored_clock_out(conn, &entry_id) {
            Ok(Some(Some(_))) => ShiftError::TimeEntryClosed(entry_id).into(),
            Err(err) => err.into(),
            _ => DatabaseError::WriteConflict {
                table: "breaks",
                id: b.id.clone(),
            }
            .into(),
        },
    }
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row) -> Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(map(row)?);
    }
    Ok(out)
}

impl Repository for SqliteRepository {
    fn insert_time_entry(&self, e: &TimeEntry) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO time_entries ({ENTRY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
            ),
            params![
                e.id,
                e.staff_id,
                ts(e.clock_in),
                ts_opt(e.clock_out),
                e.total_hours,
                e.was_late,
                e.late_by,
                e.late_reason,
                e.was_early,
                e.early_by,
                e.was_early_clock_out,
                e.early_clock_out_by,
                e.clock_out_reason.map(|r| r.as_str()),
                e.clock_out_notes,
                e.worked_full_shift,
                e.break_plan.as_str(),
                e.last_warning_minutes,
                e.blocked_alert_for,
                ts(e.created_at),
                ts(e.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_time_entry(&self, e: &TimeEntry, seen: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE time_entries
             SET clock_out = ?2, total_hours = ?3, was_late = ?4, late_by = ?5,
                 late_reason = ?6, was_early = ?7, early_by = ?8,
                 was_early_clock_out = ?9, early_clock_out_by = ?10,
                 clock_out_reason = ?11, clock_out_notes = ?12,
                 worked_full_shift = ?13, break_plan = ?14,
                 last_warning_minutes = ?15, blocked_alert_for = ?16, updated_at = ?17
             WHERE id = ?1 AND clock_out IS NULL AND updated_at = ?18
               AND (?2 IS NULL OR NOT EXISTS (
                   SELECT 1 FROM breaks
                   WHERE time_entry_id = ?1 AND actual_start IS NOT NULL AND actual_end IS NULL))",
            params![
                e.id,
                ts_opt(e.clock_out),
                e.total_hours,
                e.was_late,
                e.late_by,
                e.late_reason,
                e.was_early,
                e.early_by,
                e.was_early_clock_out,
                e.early_clock_out_by,
                e.clock_out_reason.map(|r| r.as_str()),
                e.clock_out_notes,
                e.worked_full_shift,
                e.break_plan.as_str(),
                e.last_warning_minutes,
                e.blocked_alert_for,
                ts(e.updated_at),
                ts(seen),
            ],
        )?;
        if changed == 0 {
            return Err(entry_refusal(&conn, e));
        }
        Ok(())
    }

    fn set_late_reason(&self, id: &str, reason: &str, at: DateTime<Utc>) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE time_entries SET late_reason = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, reason, ts(at)],
        )?;
        if changed == 0 {
            return Err(ShiftError::TimeEntryNotFound(id.to_string()).into());
        }
        Ok(())
    }

    fn time_entry(&self, id: &str) -> Result<Option<TimeEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ?1"))?;
        let found = stmt.query_row(params![id], |row| Ok(row_to_entry(row))).optional()?;
        found.transpose()
    }

    fn open_time_entry(&self, staff_id: &str) -> Result<Option<TimeEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE staff_id = ?1 AND clock_out IS NULL"
        ))?;
        let found = stmt.query_row(params![staff_id], |row| Ok(row_to_entry(row))).optional()?;
        found.transpose()
    }

    fn time_entries_between(
        &self,
        staff_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>> {
        collect(
            &self.conn(),
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries
                 WHERE staff_id = ?1 AND clock_in >= ?2 AND clock_in < ?3
                 ORDER BY clock_in"
            ),
            params![staff_id, ts(from), ts(to)],
            row_to_entry,
        )
    }

    fn open_time_entries(&self) -> Result<Vec<TimeEntry>> {
        collect(
            &self.conn(),
            &format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE clock_out IS NULL ORDER BY clock_in"),
            [],
            row_to_entry,
        )
    }

    fn insert_break(&self, brk: &Break) -> Result<()> {
        insert_break_row(&self.conn(), brk)
    }

    fn insert_breaks(&self, breaks: &[Break]) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        for brk in breaks {
            insert_break_row(&tx, brk)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_break(&self, b: &Break, seen: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE breaks
             SET actual_start = ?2, actual_end = ?3, active_secs = ?4, is_paused = ?5,
                 paused_duration = ?6, paused_at = ?7, resumed_at = ?8, pause_used = ?9,
                 is_late = ?10, late_by = ?11, away_reason = ?12, auto_started = ?13,
                 updated_at = ?14
             WHERE id = ?1 AND actual_end IS NULL AND updated_at = ?15
               AND EXISTS (SELECT 1 FROM time_entries t
                           WHERE t.id = breaks.time_entry_id AND t.clock_out IS NULL)",
            params![
                b.id,
                ts_opt(b.actual_start),
                ts_opt(b.actual_end),
                b.active_secs,
                b.is_paused,
                b.paused_duration,
                ts_opt(b.paused_at),
                ts_opt(b.resumed_at),
                b.pause_used,
                b.is_late,
                b.late_by,
                b.away_reason,
                b.auto_started,
                ts(b.updated_at),
                ts(seen),
            ],
        )?;
        if changed == 0 {
            return Err(break_refusal(&conn, b));
        }
        Ok(())
    }

    fn break_by_id(&self, id: &str) -> Result<Option<Break>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {BREAK_COLUMNS} FROM breaks WHERE id = ?1"))?;
        let found = stmt.query_row(params![id], |row| Ok(row_to_break(row))).optional()?;
        found.transpose()
    }

    fn breaks_for_entry(&self, time_entry_id: &str) -> Result<Vec<Break>> {
        collect(
            &self.conn(),
            &format!(
                "SELECT {BREAK_COLUMNS} FROM breaks WHERE time_entry_id = ?1
                 ORDER BY created_at, rowid"
            ),
            params![time_entry_id],
            row_to_break,
        )
    }
}
