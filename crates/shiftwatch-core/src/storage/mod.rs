mod config;
pub mod database;
mod memory;
pub mod migrations;
mod schedule_file;

pub use config::{BreakDefaults, EngineConfig};
pub use database::SqliteRepository;
pub use memory::MemoryRepository;
pub use schedule_file::{FileScheduleStore, ScheduleFile};

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, Result};
use crate::models::{Break, TimeEntry};

/// The narrow persistence interface the engine depends on.
///
/// Every call either commits or fails; the engine never treats in-memory
/// state as authoritative before the call returns `Ok`.
///
/// Updates are compare-and-set: `seen` is the `updated_at` the caller read,
/// and the write is refused with a conflict if the stored row has moved on
/// since. Several processes may share one database, so the per-staff actor
/// alone does not serialize writers.
pub trait Repository: Send + Sync {
    fn insert_time_entry(&self, entry: &TimeEntry) -> Result<()>;
    /// Rewrite an open entry. Refused once the stored row is closed, and a
    /// closing write is refused while one of its breaks is unresolved.
    fn update_time_entry(&self, entry: &TimeEntry, seen: DateTime<Utc>) -> Result<()>;
    /// Touch only `late_reason` and `updated_at`; the one edit a closed entry takes.
    fn set_late_reason(&self, id: &str, reason: &str, at: DateTime<Utc>) -> Result<()>;
    fn time_entry(&self, id: &str) -> Result<Option<TimeEntry>>;
    /// The staff member's entry with `clock_out == None`, if any.
    fn open_time_entry(&self, staff_id: &str) -> Result<Option<TimeEntry>>;
    /// Entries whose `clock_in` falls in `[from, to)`, oldest first.
    fn time_entries_between(
        &self,
        staff_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>>;
    /// Every open entry across all staff.
    fn open_time_entries(&self) -> Result<Vec<TimeEntry>>;

    /// Insert a break under an open entry.
    fn insert_break(&self, brk: &Break) -> Result<()>;
    /// Insert several breaks under an open entry, atomically.
    fn insert_breaks(&self, breaks: &[Break]) -> Result<()>;
    /// Rewrite a break that has not ended and whose entry is still open.
    fn update_break(&self, brk: &Break, seen: DateTime<Utc>) -> Result<()>;
    fn break_by_id(&self, id: &str) -> Result<Option<Break>>;
    /// Breaks of one entry, in creation order.
    fn breaks_for_entry(&self, time_entry_id: &str) -> Result<Vec<Break>>;
}

/// Returns `~/.config/shiftwatch[-dev]/`.
///
/// `SHIFTWATCH_HOME` overrides the location outright; otherwise
/// `SHIFTWATCH_ENV=dev` selects the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("SHIFTWATCH_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("SHIFTWATCH_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("shiftwatch-dev")
            } else {
                base_dir.join("shiftwatch")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
