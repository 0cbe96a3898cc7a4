//! Countdown to shift end for one open session.
//!
//! The caller must invoke [`ShiftClock::tick`] periodically. Everything a
//! tick decides is derived from the shift window and the persisted entry:
//! the smallest warning already sent and the break a block was reported
//! for are stored on the [`TimeEntry`], so a clock rebuilt after a restart
//! does not repeat them. Only the retry counter for a failing auto
//! clock-out lives in memory.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::breaks::BreakRuntime;
use crate::events::{BlockCause, Event, SessionChange};
use crate::models::{ClockOutReason, TimeEntry};
use crate::schedule::ShiftWindow;
use crate::session::SessionManager;

pub struct ShiftClock {
    staff_id: String,
    time_entry_id: String,
    window: ShiftWindow,
    /// Minutes before shift end, largest first.
    thresholds: Vec<u32>,
    retry_limit: u32,
    failed_attempts: u32,
    exhausted_reported: bool,
    finished: bool,
}

impl ShiftClock {
    /// A clock for `entry`, or `None` when the session has no shift to
    /// count down to (day off, or clocked in after the shift ended).
    pub fn activate(
        entry: &TimeEntry,
        window: Option<ShiftWindow>,
        thresholds: Vec<u32>,
        retry_limit: u32,
    ) -> Option<Self> {
        let window = window.filter(|w| entry.is_open() && entry.clock_in < w.end)?;
        let mut thresholds = thresholds;
        thresholds.sort_unstable_by(|a, b| b.cmp(a));
        thresholds.dedup();
        Some(Self {
            staff_id: entry.staff_id.clone(),
            time_entry_id: entry.id.clone(),
            window,
            thresholds,
            retry_limit: retry_limit.max(1),
            failed_attempts: 0,
            exhausted_reported: false,
            finished: false,
        })
    }

    pub fn time_entry_id(&self) -> &str {
        &self.time_entry_id
    }

    pub fn window(&self) -> ShiftWindow {
        self.window
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.window.end - now).num_seconds()
    }

    /// The session was closed; the clock should be dropped.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn tick(
        &mut self,
        sessions: &SessionManager,
        runtime: &BreakRuntime,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        if self.finished {
            return Vec::new();
        }
        let entry = match sessions.entry(&self.time_entry_id) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(time_entry_id = %self.time_entry_id, error = %e, "shift clock could not read entry");
                return Vec::new();
            }
        };
        if !entry.is_open() {
            self.finished = true;
            return Vec::new();
        }

        let remaining = self.seconds_remaining(now);
        if remaining > 0 {
            self.warn_if_due(sessions, &entry, remaining, now)
        } else {
            self.end_of_shift(sessions, runtime, &entry, now)
        }
    }

    /// Smallest threshold crossed, if it is below the last one sent.
    pub fn due_warning(&self, last_sent: Option<u32>, remaining_secs: i64) -> Option<u32> {
        let crossed = self
            .thresholds
            .iter()
            .copied()
            .filter(|m| remaining_secs <= i64::from(*m) * 60)
            .min()?;
        match last_sent {
            Some(last) if crossed >= last => None,
            _ => Some(crossed),
        }
    }

    fn warn_if_due(
        &mut self,
        sessions: &SessionManager,
        entry: &TimeEntry,
        remaining: i64,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let Some(level) = self.due_warning(entry.last_warning_minutes, remaining) else {
            return Vec::new();
        };
        match sessions.record_warning(&entry.id, level, now) {
            Ok(_) => {
                info!(staff_id = %self.staff_id, level_minutes = level, "shift ending soon");
                vec![Event::ShiftWarning {
                    staff_id: self.staff_id.clone(),
                    time_entry_id: entry.id.clone(),
                    level_minutes: level,
                    seconds_remaining: remaining,
                    at: now,
                }]
            }
            Err(e) => {
                warn!(time_entry_id = %entry.id, error = %e, "could not record shift warning, will retry");
                Vec::new()
            }
        }
    }

    fn end_of_shift(
        &mut self,
        sessions: &SessionManager,
        runtime: &BreakRuntime,
        entry: &TimeEntry,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let unresolved = match runtime.unresolved(&entry.id) {
            Ok(found) => found,
            Err(e) => return self.failed(entry, e.to_string(), now),
        };

        if let Some(active) = unresolved {
            if entry.blocked_alert_for.as_deref() == Some(active.id.as_str()) {
                return Vec::new();
            }
            return match sessions.record_blocked_alert(&entry.id, &active.id, now) {
                Ok(_) => {
                    warn!(
                        staff_id = %self.staff_id,
                        time_entry_id = %entry.id,
                        break_id = %active.id,
                        "auto clock-out blocked by unresolved break"
                    );
                    vec![Event::AutoClockOutBlocked {
                        staff_id: self.staff_id.clone(),
                        time_entry_id: entry.id.clone(),
                        cause: BlockCause::ActiveBreak {
                            break_id: active.id,
                        },
                        at: now,
                    }]
                }
                Err(e) => {
                    warn!(time_entry_id = %entry.id, error = %e, "could not record blocked alert, will retry");
                    Vec::new()
                }
            };
        }

        match sessions.clock_out(&entry.id, ClockOutReason::EndOfShift, None, now) {
            Ok(closed) => {
                self.finished = true;
                info!(staff_id = %self.staff_id, time_entry_id = %closed.id, "auto clock-out at shift end");
                vec![
                    Event::session(SessionChange::ClockedOut, &closed, now),
                    Event::AutoClockOutExecuted {
                        staff_id: self.staff_id.clone(),
                        entry: closed,
                        at: now,
                    },
                ]
            }
            Err(e) => self.failed(entry, e.to_string(), now),
        }
    }

    fn failed(&mut self, entry: &TimeEntry, message: String, now: DateTime<Utc>) -> Vec<Event> {
        self.failed_attempts += 1;
        warn!(
            time_entry_id = %entry.id,
            attempts = self.failed_attempts,
            error = %message,
            "auto clock-out failed, will retry"
        );
        if self.failed_attempts < self.retry_limit || self.exhausted_reported {
            return Vec::new();
        }
        self.exhausted_reported = true;
        error!(time_entry_id = %entry.id, attempts = self.failed_attempts, "auto clock-out retries exhausted");
        vec![Event::AutoClockOutBlocked {
            staff_id: self.staff_id.clone(),
            time_entry_id: entry.id.clone(),
            cause: BlockCause::RetriesExhausted {
                attempts: self.failed_attempts,
                error: message,
            },
            at: now,
        }]
    }
}
