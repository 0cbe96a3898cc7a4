//! Scheduled-break auto-start.
//!
//! On each tick, a Planned break whose scheduled start equals the current
//! local minute is started, provided the entry has no Active or Paused break
//! and no break of the same type was already taken. Whether a break is due
//! depends only on persisted rows and the time, so repeated scans in the
//! same minute start it once.
//!
//! Starts that fail on a transient repository error stay pending and are
//! retried on later ticks until they succeed or the break window closes.
//! A start still pending when its window closes is reported with
//! `BreakAutoStartFailed` unless the retry limit already reported it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use tracing::{debug, error, warn};

use super::BreakRuntime;
use crate::clock::LocalZone;
use crate::events::{BreakChange, Event};
use crate::models::{Break, BreakState, TimeEntry};

#[derive(Debug, Default, Clone)]
struct PendingStart {
    attempts: u32,
    alerted: bool,
    last_error: String,
}

pub struct AutoStartScanner {
    runtime: BreakRuntime,
    zone: LocalZone,
    retry_limit: u32,
    pending: HashMap<String, PendingStart>,
}

impl AutoStartScanner {
    pub fn new(runtime: BreakRuntime, zone: LocalZone, retry_limit: u32) -> Self {
        Self {
            runtime,
            zone,
            retry_limit: retry_limit.max(1),
            pending: HashMap::new(),
        }
    }

    /// Forget retry bookkeeping; called when the session closes.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn scan(&mut self, entry: &TimeEntry, now: DateTime<Utc>) -> Vec<Event> {
        let breaks = match self.runtime.breaks_for(&entry.id) {
            Ok(breaks) => breaks,
            Err(e) => {
                warn!(time_entry_id = %entry.id, error = %e, "break scan could not read breaks");
                return Vec::new();
            }
        };

        self.pending
            .retain(|id, _| breaks.iter().any(|b| &b.id == id && startable(b, &breaks)));
        let mut events = self.expire_closed_windows(entry, &breaks, now);

        let retry = breaks.iter().find(|b| self.pending.contains_key(&b.id));
        let local_now = self.zone.time_of_day(now);
        let Some(due) = retry.or_else(|| due_break(&breaks, local_now)) else {
            return events;
        };

        match self.runtime.auto_start(&entry.id, due, now) {
            Ok(started) => {
                self.pending.remove(&started.id);
                events.push(Event::brk(&entry.staff_id, BreakChange::Started, &started, now));
            }
            Err(e) if e.is_transient() => {
                let limit = self.retry_limit;
                let pending = self.pending.entry(due.id.clone()).or_default();
                pending.attempts += 1;
                pending.last_error = e.to_string();
                warn!(
                    staff_id = %entry.staff_id,
                    break_id = %due.id,
                    attempts = pending.attempts,
                    error = %e,
                    "scheduled break auto-start failed, will retry"
                );
                if pending.attempts >= limit && !pending.alerted {
                    pending.alerted = true;
                    error!(break_id = %due.id, attempts = pending.attempts, "auto-start retries exhausted");
                    events.push(failed_event(entry, &due.id, pending, now));
                }
            }
            Err(e) => {
                debug!(break_id = %due.id, error = %e, "scheduled break not started");
                self.pending.remove(&due.id);
            }
        }
        events
    }

    /// Drop pending starts whose break window has closed, alerting for
    /// those the retry limit never reported.
    fn expire_closed_windows(
        &mut self,
        entry: &TimeEntry,
        breaks: &[Break],
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        for brk in breaks {
            if !self.pending.contains_key(&brk.id) || now < self.window_end(brk, now) {
                continue;
            }
            let Some(pending) = self.pending.remove(&brk.id) else {
                continue;
            };
            if pending.alerted {
                continue;
            }
            error!(
                staff_id = %entry.staff_id,
                break_id = %brk.id,
                attempts = pending.attempts,
                "break window closed before auto-start succeeded"
            );
            events.push(failed_event(entry, &brk.id, &pending, now));
        }
        events
    }

    fn window_end(&self, brk: &Break, now: DateTime<Utc>) -> DateTime<Utc> {
        match (brk.scheduled_start, brk.scheduled_end) {
            (Some(start), Some(end)) => {
                let mut end_at = self.zone.at(self.zone.today(now), end);
                // Window crosses midnight and we are still before it.
                if end <= start && self.zone.time_of_day(now) >= start {
                    end_at += Duration::days(1);
                }
                end_at
            }
            _ => now,
        }
    }
}

fn failed_event(
    entry: &TimeEntry,
    break_id: &str,
    pending: &PendingStart,
    now: DateTime<Utc>,
) -> Event {
    Event::BreakAutoStartFailed {
        staff_id: entry.staff_id.clone(),
        time_entry_id: entry.id.clone(),
        break_id: break_id.to_string(),
        attempts: pending.attempts,
        error: pending.last_error.clone(),
        at: now,
    }
}

/// The Planned break to start at `local_now`, if any.
pub fn due_break(breaks: &[Break], local_now: NaiveTime) -> Option<&Break> {
    breaks.iter().find(|b| {
        b.scheduled_start
            .is_some_and(|start| same_minute(start, local_now))
            && startable(b, breaks)
    })
}

/// Planned, no other break running and no break of its type taken yet.
fn startable(brk: &Break, breaks: &[Break]) -> bool {
    brk.state() == BreakState::Planned
        && !breaks.iter().any(Break::is_unresolved)
        && !breaks
            .iter()
            .any(|other| other.break_type == brk.break_type && other.actual_start.is_some())
}

fn same_minute(a: NaiveTime, b: NaiveTime) -> bool {
    a.hour() == b.hour() && a.minute() == b.minute()
}
