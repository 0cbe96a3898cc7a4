//! # Shiftwatch Core Library
//!
//! Staff shift and break tracking. A live state machine per staff member
//! tracks clock-in and clock-out, scheduled and ad-hoc breaks (with one
//! pause per break), and a countdown that auto-clocks-out at shift end.
//! The `shiftwatch` CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **SessionManager**: clock-in/clock-out lifecycle of a [`TimeEntry`]
//! - **BreakScheduler**: proposes and commits a day's break plan
//! - **BreakRuntime**: per-break state machine plus the auto-start scanner
//! - **ShiftClock**: shift-end warnings and automatic clock-out
//! - **ShiftEngine**: per-staff actors that serialize commands and publish
//!   [`Event`]s on the [`Bus`]
//! - **Storage**: SQLite or in-memory [`Repository`] and TOML configuration
//!
//! All components read time from a [`Clock`], so tests drive them with a
//! [`ManualClock`] instead of sleeping.

pub mod breaks;
pub mod bus;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod schedule;
pub mod session;
pub mod shift_clock;
pub mod storage;
pub mod subscribers;

pub use breaks::{BreakPlan, BreakRuntime, BreakScheduler, PlannedBreak, StartBreak};
pub use bus::Bus;
pub use clock::{Clock, LocalZone, ManualClock, SystemClock};
pub use engine::ShiftEngine;
pub use error::{ConfigError, CoreError, DatabaseError, ShiftError, ValidationError};
pub use events::{BlockCause, BreakChange, Envelope, Event, SessionChange, StaffSnapshot};
pub use models::{Break, BreakPlanStatus, BreakState, BreakType, ClockOutReason, TimeEntry};
pub use schedule::{
    DaySchedule, MemoryScheduleStore, ScheduleStore, ShiftWindow, WeeklySchedule,
};
pub use session::SessionManager;
pub use shift_clock::ShiftClock;
pub use storage::{
    BreakDefaults, EngineConfig, FileScheduleStore, MemoryRepository, Repository,
    SqliteRepository,
};
pub use subscribers::{spawn_subscriber, LogSubscriber, Subscribe};
