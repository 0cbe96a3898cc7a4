use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::breaks::{BreakPlan, StartBreak};
use crate::error::Result;
use crate::events::StaffSnapshot;
use crate::models::{Break, ClockOutReason, TimeEntry};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// One unit of work in a staff member's queue.
pub(crate) enum Command {
    ClockIn {
        reply: Reply<TimeEntry>,
    },
    ClockOut {
        reason: ClockOutReason,
        notes: Option<String>,
        reply: Reply<TimeEntry>,
    },
    SetLateReason {
        reason: String,
        reply: Reply<TimeEntry>,
    },
    StartBreak {
        request: StartBreak,
        reply: Reply<Break>,
    },
    PauseBreak {
        break_id: String,
        reply: Reply<Break>,
    },
    ResumeBreak {
        break_id: String,
        reply: Reply<Break>,
    },
    EndBreak {
        break_id: String,
        reply: Reply<Break>,
    },
    ProposeBreaks {
        reply: Reply<BreakPlan>,
    },
    ScheduleBreaks {
        plan: BreakPlan,
        reply: Reply<Vec<Break>>,
    },
    SkipBreaks {
        reply: Reply<TimeEntry>,
    },
    Snapshot {
        reply: Reply<StaffSnapshot>,
    },
    /// Background work: break auto-start, then the shift clock. Answers
    /// whether the staff member still has an open session.
    Tick {
        now: DateTime<Utc>,
        done: oneshot::Sender<bool>,
    },
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::ClockIn { .. } => "clock_in",
            Command::ClockOut { .. } => "clock_out",
            Command::SetLateReason { .. } => "set_late_reason",
            Command::StartBreak { .. } => "start_break",
            Command::PauseBreak { .. } => "pause_break",
            Command::ResumeBreak { .. } => "resume_break",
            Command::EndBreak { .. } => "end_break",
            Command::ProposeBreaks { .. } => "propose_breaks",
            Command::ScheduleBreaks { .. } => "schedule_breaks",
            Command::SkipBreaks { .. } => "skip_breaks",
            Command::Snapshot { .. } => "snapshot",
            Command::Tick { .. } => "tick",
        }
    }
}
