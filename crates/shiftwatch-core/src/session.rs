//! Clock-in/clock-out lifecycle of a [`TimeEntry`].
//!
//! `SessionManager` is the only writer of time entries. The break scheduler
//! and the shift clock record their bookkeeping (plan status, warnings sent,
//! blocked alerts) through it rather than touching rows themselves.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::LocalZone;
use crate::error::{Result, ShiftError};
use crate::models::{minutes_ceil, Break, BreakPlanStatus, ClockOutReason, TimeEntry};
use crate::schedule::{ScheduleStore, ShiftWindow};
use crate::storage::Repository;

#[derive(Clone)]
pub struct SessionManager {
    repo: Arc<dyn Repository>,
    schedules: Arc<dyn ScheduleStore>,
    zone: LocalZone,
}

impl SessionManager {
    pub fn new(
        repo: Arc<dyn Repository>,
        schedules: Arc<dyn ScheduleStore>,
        zone: LocalZone,
    ) -> Self {
        Self {
            repo,
            schedules,
            zone,
        }
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub fn open_entry(&self, staff_id: &str) -> Result<Option<TimeEntry>> {
        self.repo.open_time_entry(staff_id)
    }

    /// Load an entry or fail with `TimeEntryNotFound`.
    pub fn entry(&self, time_entry_id: &str) -> Result<TimeEntry> {
        self.repo
            .time_entry(time_entry_id)?
            .ok_or_else(|| ShiftError::TimeEntryNotFound(time_entry_id.to_string()).into())
    }

    /// The staff member's shift on a local date, `None` on days off.
    pub fn shift_window(&self, staff_id: &str, date: NaiveDate) -> Result<Option<ShiftWindow>> {
        Ok(self
            .schedules
            .weekly_schedule(staff_id)?
            .and_then(|week| week.window_on(date, &self.zone)))
    }

    /// The shift an entry belongs to: the one on the local date of its clock-in.
    pub fn shift_window_for(&self, entry: &TimeEntry) -> Result<Option<ShiftWindow>> {
        self.shift_window(&entry.staff_id, self.zone.today(entry.clock_in))
    }

    /// Open a new session.
    ///
    /// # Errors
    ///
    /// `AlreadyClockedIn` if the staff member has an open entry,
    /// `ShiftAlreadyCompletedToday` if an entry that started today is closed.
    pub fn clock_in(&self, staff_id: &str, now: DateTime<Utc>) -> Result<TimeEntry> {
        if let Some(open) = self.repo.open_time_entry(staff_id)? {
            return Err(ShiftError::AlreadyClockedIn {
                staff_id: staff_id.to_string(),
                time_entry_id: open.id,
            }
            .into());
        }

        let today = self.zone.today(now);
        let (day_start, day_end) = self.zone.day_bounds(today);
        let completed = self
            .repo
            .time_entries_between(staff_id, day_start, day_end)?
            .into_iter()
            .any(|e| !e.is_open());
        if completed {
            return Err(ShiftError::ShiftAlreadyCompletedToday {
                staff_id: staff_id.to_string(),
            }
            .into());
        }

        let mut entry = TimeEntry::open(Uuid::new_v4().to_string(), staff_id.to_string(), now);
        if let Some(window) = self.shift_window(staff_id, today)? {
            if now > window.start {
                entry.was_late = true;
                entry.late_by = Some(minutes_ceil(now - window.start));
            } else if now < window.start {
                entry.was_early = true;
                entry.early_by = Some(minutes_ceil(window.start - now));
            }
        } else {
            debug!(staff_id, %today, "clock-in on a day without a shift");
        }

        self.repo.insert_time_entry(&entry)?;
        info!(
            staff_id,
            time_entry_id = %entry.id,
            was_late = entry.was_late,
            late_by = ?entry.late_by,
            was_early = entry.was_early,
            "clocked in"
        );
        Ok(entry)
    }

    /// Close a session.
    ///
    /// Worked hours are wall time from clock-in to clock-out minus the
    /// counted (active) time of every ended break. The same rule applies
    /// to manual, early and automatic clock-outs.
    ///
    /// # Errors
    ///
    /// `MissingClockOutReason` when `reason` is `Other` without notes,
    /// `TimeEntryClosed` if already closed, `ActiveBreakBlocksClockOut`
    /// while a break is active or paused.
    pub fn clock_out(
        &self,
        time_entry_id: &str,
        reason: ClockOutReason,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry> {
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if reason == ClockOutReason::Other && notes.is_none() {
            return Err(ShiftError::MissingClockOutReason.into());
        }

        let mut entry = self.entry(time_entry_id)?;
        if !entry.is_open() {
            return Err(ShiftError::TimeEntryClosed(entry.id).into());
        }

        let breaks = self.repo.breaks_for_entry(&entry.id)?;
        if let Some(active) = breaks.iter().find(|b| b.is_unresolved()) {
            warn!(
                staff_id = %entry.staff_id,
                time_entry_id = %entry.id,
                break_id = %active.id,
                "clock-out rejected while a break is unresolved"
            );
            return Err(ShiftError::ActiveBreakBlocksClockOut {
                break_id: active.id.clone(),
            }
            .into());
        }

        let clock_out = now.max(entry.clock_in);
        entry.clock_out = Some(clock_out);
        entry.total_hours = Some(worked_hours(&entry, &breaks, clock_out));
        entry.clock_out_reason = Some(reason);
        entry.clock_out_notes = notes;
        entry.last_warning_minutes = None;
        entry.blocked_alert_for = None;

        match self.shift_window_for(&entry)? {
            Some(window) if clock_out < window.end => {
                entry.was_early_clock_out = true;
                entry.early_clock_out_by = Some(minutes_ceil(window.end - clock_out));
                entry.worked_full_shift = false;
            }
            Some(_) => entry.worked_full_shift = true,
            None => entry.worked_full_shift = false,
        }
        let seen = std::mem::replace(&mut entry.updated_at, now);

        self.repo.update_time_entry(&entry, seen)?;
        info!(
            staff_id = %entry.staff_id,
            time_entry_id = %entry.id,
            reason = reason.as_str(),
            total_hours = ?entry.total_hours,
            early = entry.was_early_clock_out,
            "clocked out"
        );
        Ok(entry)
    }

    /// Attach or replace the explanation for a late clock-in.
    ///
    /// Allowed on closed entries: reason edits are the one mutation a
    /// completed session accepts.
    pub fn set_late_reason(
        &self,
        time_entry_id: &str,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "late_reason".into(),
                message: "must not be empty".into(),
            }
            .into());
        }
        self.repo.set_late_reason(time_entry_id, &reason, now)?;
        self.entry(time_entry_id)
    }

    pub fn set_break_plan(
        &self,
        time_entry_id: &str,
        status: BreakPlanStatus,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry> {
        let mut entry = self.open(time_entry_id)?;
        entry.break_plan = status;
        let seen = std::mem::replace(&mut entry.updated_at, now);
        self.repo.update_time_entry(&entry, seen)?;
        debug!(time_entry_id, status = status.as_str(), "break plan updated");
        Ok(entry)
    }

    /// Remember the smallest shift-end warning threshold already emitted.
    pub fn record_warning(
        &self,
        time_entry_id: &str,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry> {
        let mut entry = self.open(time_entry_id)?;
        entry.last_warning_minutes = Some(minutes);
        let seen = std::mem::replace(&mut entry.updated_at, now);
        self.repo.update_time_entry(&entry, seen)?;
        Ok(entry)
    }

    /// Remember the break an auto clock-out block was reported for.
    pub fn record_blocked_alert(
        &self,
        time_entry_id: &str,
        break_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry> {
        let mut entry = self.open(time_entry_id)?;
        entry.blocked_alert_for = Some(break_id.to_string());
        let seen = std::mem::replace(&mut entry.updated_at, now);
        self.repo.update_time_entry(&entry, seen)?;
        Ok(entry)
    }

    fn open(&self, time_entry_id: &str) -> Result<TimeEntry> {
        let entry = self.entry(time_entry_id)?;
        if !entry.is_open() {
            return Err(ShiftError::TimeEntryClosed(entry.id).into());
        }
        Ok(entry)
    }
}

/// Hours from clock-in to `clock_out` net of counted break time, to two decimals.
pub(crate) fn worked_hours(entry: &TimeEntry, breaks: &[Break], clock_out: DateTime<Utc>) -> f64 {
    let elapsed = (clock_out - entry.clock_in).num_seconds();
    let on_break: i64 = breaks
        .iter()
        .filter(|b| b.actual_end.is_some())
        .map(|b| b.active_secs.unwrap_or_else(|| b.active_secs_at(clock_out)))
        .sum();
    let secs = (elapsed - on_break).max(0);
    (secs as f64 / 3600.0 * 100.0).round() / 100.0
}
