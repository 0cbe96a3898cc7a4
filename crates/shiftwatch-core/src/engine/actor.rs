//! Per-staff actor.
//!
//! Owns the staff member's command queue and background timers. Commands
//! run one at a time, each to completion: validate, persist, publish,
//! reply. Timers are rebuilt from the repository whenever the open entry
//! changes, so an actor started after a restart behaves like one that
//! never stopped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::command::{Command, Reply};
use super::Context;
use crate::breaks::AutoStartScanner;
use crate::error::{Result, ShiftError};
use crate::events::{BreakChange, Event, SessionChange, StaffSnapshot};
use crate::models::{Break, TimeEntry};
use crate::shift_clock::ShiftClock;

pub(crate) struct StaffActor {
    staff_id: String,
    ctx: Arc<Context>,
    rx: mpsc::Receiver<Command>,
    scanner: AutoStartScanner,
    shift_clock: Option<ShiftClock>,
    /// Entry the shift clock was last derived for.
    clock_for: Option<String>,
}

impl StaffActor {
    pub(crate) fn new(staff_id: String, ctx: Arc<Context>, rx: mpsc::Receiver<Command>) -> Self {
        let scanner = AutoStartScanner::new(
            ctx.runtime.clone(),
            ctx.sessions.zone(),
            ctx.config.auto_retry_limit,
        );
        Self {
            staff_id,
            ctx,
            rx,
            scanner,
            shift_clock: None,
            clock_for: None,
        }
    }

    pub(crate) async fn run(mut self, token: CancellationToken) {
        debug!(staff_id = %self.staff_id, "staff actor started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                }
            }
        }
        debug!(staff_id = %self.staff_id, "staff actor stopped");
    }

    fn handle(&mut self, cmd: Command) {
        let now = self.ctx.clock.now();
        let name = cmd.name();
        match cmd {
            Command::ClockIn { reply } => {
                let result = self.ctx.sessions.clock_in(&self.staff_id, now).map(|entry| {
                    let events = vec![Event::session(SessionChange::ClockedIn, &entry, now)];
                    (entry, events)
                });
                if let Ok((entry, _)) = &result {
                    self.sync_clock(Some(entry));
                }
                self.finish(name, reply, result);
            }
            Command::ClockOut {
                reason,
                notes,
                reply,
            } => {
                let result = self.current_entry().and_then(|entry| {
                    let closed = self.ctx.sessions.clock_out(&entry.id, reason, notes, now)?;
                    let events = vec![Event::session(SessionChange::ClockedOut, &closed, now)];
                    Ok((closed, events))
                });
                if result.is_ok() {
                    self.sync_clock(None);
                }
                self.finish(name, reply, result);
            }
            Command::SetLateReason { reason, reply } => {
                let result = self.latest_entry(now).and_then(|entry| {
                    let updated = self.ctx.sessions.set_late_reason(&entry.id, reason, now)?;
                    let events = vec![Event::session(SessionChange::LateReasonSet, &updated, now)];
                    Ok((updated, events))
                });
                self.finish(name, reply, result);
            }
            Command::StartBreak { request, reply } => {
                let result = self.current_entry().and_then(|entry| {
                    let brk = self.ctx.runtime.start(&entry.id, request, now)?;
                    let events = vec![Event::brk(&self.staff_id, BreakChange::Started, &brk, now)];
                    Ok((brk, events))
                });
                self.finish(name, reply, result);
            }
            Command::PauseBreak { break_id, reply } => {
                let result = self.own_break(&break_id).and_then(|_| {
                    let brk = self.ctx.runtime.pause(&break_id, now)?;
                    let events = vec![Event::brk(&self.staff_id, BreakChange::Paused, &brk, now)];
                    Ok((brk, events))
                });
                self.finish(name, reply, result);
            }
            Command::ResumeBreak { break_id, reply } => {
                let result = self.own_break(&break_id).and_then(|_| {
                    let brk = self.ctx.runtime.resume(&break_id, now)?;
                    let events = vec![Event::brk(&self.staff_id, BreakChange::Resumed, &brk, now)];
                    Ok((brk, events))
                });
                self.finish(name, reply, result);
            }
            Command::EndBreak { break_id, reply } => {
                let result = self.own_break(&break_id).and_then(|_| {
                    let brk = self.ctx.runtime.end(&break_id, now)?;
                    let events = vec![Event::brk(&self.staff_id, BreakChange::Ended, &brk, now)];
                    Ok((brk, events))
                });
                self.finish(name, reply, result);
            }
            Command::ProposeBreaks { reply } => {
                let result = self
                    .current_entry()
                    .and_then(|entry| self.ctx.scheduler.propose(&entry.id, now))
                    .map(|plan| (plan, Vec::new()));
                self.finish(name, reply, result);
            }
            Command::ScheduleBreaks { plan, reply } => {
                let result = self.current_entry().and_then(|entry| {
                    if plan.time_entry_id != entry.id {
                        return Err(ShiftError::TimeEntryNotFound(plan.time_entry_id.clone()).into());
                    }
                    let rows = self.ctx.scheduler.commit(&plan, now)?;
                    let updated = self.ctx.sessions.entry(&entry.id)?;
                    let mut events: Vec<Event> = rows
                        .iter()
                        .map(|b| Event::brk(&self.staff_id, BreakChange::Planned, b, now))
                        .collect();
                    events.push(Event::session(SessionChange::BreakPlanChanged, &updated, now));
                    Ok((rows, events))
                });
                self.finish(name, reply, result);
            }
            Command::SkipBreaks { reply } => {
                let result = self.current_entry().and_then(|entry| {
                    let updated = self.ctx.scheduler.skip(&entry.id, now)?;
                    let events = vec![Event::session(SessionChange::BreakPlanChanged, &updated, now)];
                    Ok((updated, events))
                });
                self.finish(name, reply, result);
            }
            Command::Snapshot { reply } => {
                let result = self.snapshot(now).map(|snapshot| {
                    let events = vec![Event::SnapshotProvided {
                        snapshot: snapshot.clone(),
                        at: now,
                    }];
                    (snapshot, events)
                });
                self.finish(name, reply, result);
            }
            Command::Tick { now, done } => {
                let open = self.tick(now);
                let _ = done.send(open);
            }
        }
    }

    /// Returns false once the staff member has no open session.
    fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let entry = match self.ctx.sessions.open_entry(&self.staff_id) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(staff_id = %self.staff_id, error = %e, "tick could not read open entry");
                return true;
            }
        };
        self.sync_clock(entry.as_ref());
        let Some(entry) = entry else {
            return false;
        };

        let mut open = true;
        let mut events = self.scanner.scan(&entry, now);
        if let Some(clock) = self.shift_clock.as_mut() {
            events.extend(clock.tick(&self.ctx.sessions, &self.ctx.runtime, now));
            if clock.is_finished() {
                self.sync_clock(None);
                open = false;
            }
        }
        for event in events {
            self.ctx.bus.publish(event);
        }
        open
    }

    /// Rebuild or drop timers to match the open entry.
    fn sync_clock(&mut self, entry: Option<&TimeEntry>) {
        let Some(entry) = entry else {
            self.shift_clock = None;
            self.clock_for = None;
            self.scanner.reset();
            return;
        };
        if self.clock_for.as_deref() == Some(entry.id.as_str()) {
            return;
        }
        let window = match self.ctx.sessions.shift_window_for(entry) {
            Ok(window) => window,
            Err(e) => {
                warn!(staff_id = %self.staff_id, error = %e, "could not resolve shift window");
                return;
            }
        };
        self.shift_clock = ShiftClock::activate(
            entry,
            window,
            self.ctx.config.warning_thresholds(),
            self.ctx.config.auto_retry_limit,
        );
        self.clock_for = Some(entry.id.clone());
        self.scanner.reset();
        debug!(
            staff_id = %self.staff_id,
            time_entry_id = %entry.id,
            counting_down = self.shift_clock.is_some(),
            "shift clock derived"
        );
    }

    fn current_entry(&self) -> Result<TimeEntry> {
        self.ctx
            .sessions
            .open_entry(&self.staff_id)?
            .ok_or_else(|| {
                ShiftError::NotClockedIn {
                    staff_id: self.staff_id.clone(),
                }
                .into()
            })
    }

    /// The open entry, or the last one started today.
    fn latest_entry(&self, now: DateTime<Utc>) -> Result<TimeEntry> {
        if let Some(open) = self.ctx.sessions.open_entry(&self.staff_id)? {
            return Ok(open);
        }
        let zone = self.ctx.sessions.zone();
        let (from, to) = zone.day_bounds(zone.today(now));
        self.ctx
            .sessions
            .repository()
            .time_entries_between(&self.staff_id, from, to)?
            .pop()
            .ok_or_else(|| {
                ShiftError::NotClockedIn {
                    staff_id: self.staff_id.clone(),
                }
                .into()
            })
    }

    /// A break of this staff member's open entry.
    fn own_break(&self, break_id: &str) -> Result<Break> {
        let entry = self.current_entry()?;
        let brk = self.ctx.runtime.get(break_id)?;
        if brk.time_entry_id != entry.id {
            return Err(ShiftError::BreakNotFound(break_id.to_string()).into());
        }
        Ok(brk)
    }

    fn snapshot(&self, now: DateTime<Utc>) -> Result<StaffSnapshot> {
        let sessions = &self.ctx.sessions;
        let open = sessions.open_entry(&self.staff_id)?;
        let (breaks, window) = match &open {
            Some(entry) => (
                self.ctx.runtime.breaks_for(&entry.id)?,
                sessions.shift_window_for(entry)?,
            ),
            None => (
                Vec::new(),
                sessions.shift_window(&self.staff_id, sessions.zone().today(now))?,
            ),
        };
        Ok(StaffSnapshot::new(&self.staff_id, open, breaks, window, now))
    }

    /// Publish on success, then answer the caller.
    fn finish<T>(&self, command: &'static str, reply: Reply<T>, result: Result<(T, Vec<Event>)>) {
        let result = match result {
            Ok((value, events)) => {
                for event in events {
                    self.ctx.bus.publish(event);
                }
                Ok(value)
            }
            Err(e) => {
                if e.is_conflict() || e.is_validation() {
                    debug!(staff_id = %self.staff_id, command, error = %e, "command rejected");
                } else {
                    warn!(staff_id = %self.staff_id, command, error = %e, "command failed");
                }
                Err(e)
            }
        };
        if reply.send(result).is_err() {
            debug!(staff_id = %self.staff_id, command, "caller went away before the reply");
        }
    }
}
