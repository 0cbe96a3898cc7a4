//! Core error types for shiftwatch-core.
//!
//! The hierarchy is rooted at [`CoreError`]. Domain failures raised by the
//! session, break and shift components live in [`ShiftError`]; storage,
//! configuration and input parsing each get their own enum.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{BreakAction, BreakState};

/// Core error type for shiftwatch-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Domain rule violations (conflicts and validation failures)
    #[error(transparent)]
    Shift(#[from] ShiftError),

    /// Repository errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input parsing errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The staff actor is gone (engine shut down)
    #[error("engine is shut down")]
    EngineStopped,
}

impl CoreError {
    /// Conflict errors must be resolved by the caller; the engine never retries them.
    pub fn is_conflict(&self) -> bool {
        match self {
            CoreError::Shift(e) => e.is_conflict(),
            CoreError::Database(e) => matches!(
                e,
                DatabaseError::WriteConflict { .. } | DatabaseError::ConstraintViolation(_)
            ),
            _ => false,
        }
    }

    /// Bad input, rejected before any state change.
    pub fn is_validation(&self) -> bool {
        match self {
            CoreError::Shift(e) => e.is_validation(),
            CoreError::Validation(_) => true,
            _ => false,
        }
    }

    /// Repository failures worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Database(DatabaseError::Locked | DatabaseError::Unavailable(_))
        )
    }
}

/// Domain errors for clock-in/out and breaks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShiftError {
    #[error("staff {staff_id} is already clocked in (entry {time_entry_id})")]
    AlreadyClockedIn {
        staff_id: String,
        time_entry_id: String,
    },

    #[error("staff {staff_id} is not clocked in")]
    NotClockedIn { staff_id: String },

    #[error("staff {staff_id} already completed a shift today")]
    ShiftAlreadyCompletedToday { staff_id: String },

    #[error("time entry {time_entry_id} already has an unresolved break ({break_id})")]
    ConcurrentBreakExists {
        time_entry_id: String,
        break_id: String,
    },

    #[error("cannot clock out while break {break_id} is unresolved")]
    ActiveBreakBlocksClockOut { break_id: String },

    #[error("break {break_id} has already used its pause")]
    PauseAlreadyUsed { break_id: String },

    #[error("an away break requires a reason")]
    MissingAwayReason,

    #[error("clock-out reason requires notes")]
    MissingClockOutReason,

    #[error("time entry {0} not found")]
    TimeEntryNotFound(String),

    #[error("break {0} not found")]
    BreakNotFound(String),

    #[error("time entry {0} is already closed")]
    TimeEntryClosed(String),

    #[error("cannot {action} a break that is {from}")]
    InvalidBreakTransition { from: BreakState, action: BreakAction },

    #[error("breaks for time entry {0} were already scheduled or skipped")]
    BreaksAlreadyScheduled(String),

    #[error("no workday schedule for staff {staff_id} on {date}")]
    NoWorkdaySchedule {
        staff_id: String,
        date: chrono::NaiveDate,
    },
}

impl ShiftError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ShiftError::AlreadyClockedIn { .. }
                | ShiftError::NotClockedIn { .. }
                | ShiftError::ShiftAlreadyCompletedToday { .. }
                | ShiftError::ConcurrentBreakExists { .. }
                | ShiftError::ActiveBreakBlocksClockOut { .. }
                | ShiftError::PauseAlreadyUsed { .. }
                | ShiftError::TimeEntryClosed(_)
                | ShiftError::InvalidBreakTransition { .. }
                | ShiftError::BreaksAlreadyScheduled(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ShiftError::MissingAwayReason | ShiftError::MissingClockOutReason
        )
    }
}

/// Repository errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The row changed since it was read, or left the state the write requires
    #[error("{table} row {id} was changed by another writer")]
    WriteConflict { table: &'static str, id: String },

    /// A uniqueness rule rejected the write
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// Backend temporarily unreachable
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home directory could not be resolved
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Input validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Unparseable time of day
    #[error("Invalid time of day '{0}': expected \"h:mm AM/PM\" or \"HH:MM\"")]
    InvalidTimeOfDay(String),

    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be after start ({start})")]
    InvalidTimeRange { start: String, end: String },

    /// Overlapping items in a plan
    #[error("Planned breaks overlap: {first} and {second}")]
    OverlappingBreaks { first: String, second: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => match code.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    DatabaseError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    DatabaseError::ConstraintViolation(err.to_string())
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_validation_are_disjoint() {
        let conflict: CoreError = ShiftError::PauseAlreadyUsed {
            break_id: "b1".into(),
        }
        .into();
        assert!(conflict.is_conflict());
        assert!(!conflict.is_validation());

        let invalid: CoreError = ShiftError::MissingAwayReason.into();
        assert!(invalid.is_validation());
        assert!(!invalid.is_conflict());
    }

    #[test]
    fn locked_database_is_transient() {
        let err: CoreError = DatabaseError::Locked.into();
        assert!(err.is_transient());
        let err: CoreError = DatabaseError::QueryFailed("syntax".into()).into();
        assert!(!err.is_transient());
    }

    #[test]
    fn stale_writes_are_conflicts() {
        let err: CoreError = DatabaseError::WriteConflict {
            table: "breaks",
            id: "b1".into(),
        }
        .into();
        assert!(err.is_conflict());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("b1"));
    }

    #[test]
    fn shift_errors_render_ids() {
        let err = ShiftError::ActiveBreakBlocksClockOut {
            break_id: "brk-9".into(),
        };
        assert!(err.to_string().contains("brk-9"));
    }
}
