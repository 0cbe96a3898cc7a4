use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Break, TimeEntry};
use crate::schedule::ShiftWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionChange {
    ClockedIn,
    ClockedOut,
    LateReasonSet,
    BreakPlanChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakChange {
    Planned,
    Started,
    Paused,
    Resumed,
    Ended,
}

/// Why the shift clock could not close a session at shift end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockCause {
    /// A break is Active or Paused; the staff member must end it.
    ActiveBreak { break_id: String },
    /// The clock-out write kept failing.
    RetriesExhausted { attempts: u32, error: String },
}

/// Every committed state change, warning and alert.
/// Published on the bus after the change is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStateChanged {
        staff_id: String,
        change: SessionChange,
        entry: TimeEntry,
        at: DateTime<Utc>,
    },
    BreakStateChanged {
        staff_id: String,
        change: BreakChange,
        #[serde(rename = "break")]
        brk: Break,
        at: DateTime<Utc>,
    },
    ShiftWarning {
        staff_id: String,
        time_entry_id: String,
        level_minutes: u32,
        seconds_remaining: i64,
        at: DateTime<Utc>,
    },
    AutoClockOutExecuted {
        staff_id: String,
        entry: TimeEntry,
        at: DateTime<Utc>,
    },
    AutoClockOutBlocked {
        staff_id: String,
        time_entry_id: String,
        cause: BlockCause,
        at: DateTime<Utc>,
    },
    /// A due scheduled break could not be started after repeated attempts.
    BreakAutoStartFailed {
        staff_id: String,
        time_entry_id: String,
        break_id: String,
        attempts: u32,
        error: String,
        at: DateTime<Utc>,
    },
    SnapshotProvided {
        snapshot: StaffSnapshot,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn staff_id(&self) -> &str {
        match self {
            Event::SessionStateChanged { staff_id, .. }
            | Event::BreakStateChanged { staff_id, .. }
            | Event::ShiftWarning { staff_id, .. }
            | Event::AutoClockOutExecuted { staff_id, .. }
            | Event::AutoClockOutBlocked { staff_id, .. }
            | Event::BreakAutoStartFailed { staff_id, .. } => staff_id,
            Event::SnapshotProvided { snapshot, .. } => &snapshot.staff_id,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::SessionStateChanged { at, .. }
            | Event::BreakStateChanged { at, .. }
            | Event::ShiftWarning { at, .. }
            | Event::AutoClockOutExecuted { at, .. }
            | Event::AutoClockOutBlocked { at, .. }
            | Event::BreakAutoStartFailed { at, .. }
            | Event::SnapshotProvided { at, .. } => *at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::SessionStateChanged { .. } => "SessionStateChanged",
            Event::BreakStateChanged { .. } => "BreakStateChanged",
            Event::ShiftWarning { .. } => "ShiftWarning",
            Event::AutoClockOutExecuted { .. } => "AutoClockOutExecuted",
            Event::AutoClockOutBlocked { .. } => "AutoClockOutBlocked",
            Event::BreakAutoStartFailed { .. } => "BreakAutoStartFailed",
            Event::SnapshotProvided { .. } => "SnapshotProvided",
        }
    }

    pub(crate) fn session(change: SessionChange, entry: &TimeEntry, at: DateTime<Utc>) -> Self {
        Event::SessionStateChanged {
            staff_id: entry.staff_id.clone(),
            change,
            entry: entry.clone(),
            at,
        }
    }

    pub(crate) fn brk(staff_id: &str, change: BreakChange, brk: &Break, at: DateTime<Utc>) -> Self {
        Event::BreakStateChanged {
            staff_id: staff_id.to_string(),
            change,
            brk: brk.clone(),
            at,
        }
    }
}

/// An event stamped with its position on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// Full state of one staff member, for resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffSnapshot {
    pub staff_id: String,
    pub open_entry: Option<TimeEntry>,
    pub breaks: Vec<Break>,
    pub active_break: Option<Break>,
    pub shift_window: Option<ShiftWindow>,
    /// Negative once the shift end has passed.
    pub seconds_to_shift_end: Option<i64>,
    /// Countdown of the active break; frozen while paused. `None` for Away.
    pub break_remaining_secs: Option<i64>,
    pub taken_at: DateTime<Utc>,
}

impl StaffSnapshot {
    pub fn new(
        staff_id: &str,
        open_entry: Option<TimeEntry>,
        breaks: Vec<Break>,
        shift_window: Option<ShiftWindow>,
        now: DateTime<Utc>,
    ) -> Self {
        let active_break = breaks.iter().find(|b| b.is_unresolved()).cloned();
        let break_remaining_secs = active_break
            .as_ref()
            .filter(|b| b.break_type.is_scheduled_type())
            .map(|b| b.remaining_secs_at(now));
        let seconds_to_shift_end = open_entry
            .as_ref()
            .and(shift_window)
            .map(|w| (w.end - now).num_seconds());
        Self {
            staff_id: staff_id.to_string(),
            open_entry,
            breaks,
            active_break,
            shift_window,
            seconds_to_shift_end,
            break_remaining_secs,
            taken_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BreakType;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn events_are_tagged_by_type() {
        let ev = Event::AutoClockOutBlocked {
            staff_id: "alice".into(),
            time_entry_id: "e1".into(),
            cause: BlockCause::ActiveBreak {
                break_id: "b1".into(),
            },
            at: noon(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "AutoClockOutBlocked");
        assert_eq!(json["cause"]["kind"], "active_break");
        assert_eq!(json["cause"]["break_id"], "b1");
    }

    #[test]
    fn envelope_flattens_event() {
        let env = Envelope {
            seq: 7,
            event: Event::ShiftWarning {
                staff_id: "alice".into(),
                time_entry_id: "e1".into(),
                level_minutes: 15,
                seconds_remaining: 900,
                at: noon(),
            },
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["type"], "ShiftWarning");
        assert_eq!(json["level_minutes"], 15);
        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn snapshot_reports_countdowns() {
        let entry = TimeEntry::open("e1".into(), "alice".into(), noon() - Duration::hours(3));
        let mut lunch = Break::ad_hoc("b1".into(), "e1".into(), BreakType::Lunch, 60, None, noon());
        lunch.actual_start = Some(noon());
        let window = ShiftWindow {
            date: noon().date_naive(),
            start: noon() - Duration::hours(3),
            end: noon() + Duration::hours(6),
        };
        let now = noon() + Duration::minutes(20);
        let snap = StaffSnapshot::new("alice", Some(entry), vec![lunch], Some(window), now);
        assert_eq!(snap.break_remaining_secs, Some(40 * 60));
        assert_eq!(snap.seconds_to_shift_end, Some((5 * 60 + 40) * 60));
        assert_eq!(snap.active_break.map(|b| b.id), Some("b1".to_string()));
    }
}
