use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockOutReason {
    EndOfShift,
    Emergency,
    Sick,
    Personal,
    /// Free-form; the notes carry the explanation.
    Other,
}

impl ClockOutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockOutReason::EndOfShift => "end_of_shift",
            ClockOutReason::Emergency => "emergency",
            ClockOutReason::Sick => "sick",
            ClockOutReason::Personal => "personal",
            ClockOutReason::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "end_of_shift" => Some(ClockOutReason::EndOfShift),
            "emergency" => Some(ClockOutReason::Emergency),
            "sick" => Some(ClockOutReason::Sick),
            "personal" => Some(ClockOutReason::Personal),
            "other" => Some(ClockOutReason::Other),
            _ => None,
        }
    }
}

/// Whether the day's breaks have been planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakPlanStatus {
    #[default]
    Pending,
    Scheduled,
    Skipped,
}

impl BreakPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakPlanStatus::Pending => "pending",
            BreakPlanStatus::Scheduled => "scheduled",
            BreakPlanStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BreakPlanStatus::Pending),
            "scheduled" => Some(BreakPlanStatus::Scheduled),
            "skipped" => Some(BreakPlanStatus::Skipped),
            _ => None,
        }
    }
}

/// One clock-in to clock-out session.
///
/// At most one entry per staff member has `clock_out == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: String,
    pub staff_id: String,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    /// Worked hours net of breaks, set on close.
    pub total_hours: Option<f64>,
    pub was_late: bool,
    /// Minutes, rounded up.
    pub late_by: Option<i64>,
    pub late_reason: Option<String>,
    pub was_early: bool,
    pub early_by: Option<i64>,
    pub was_early_clock_out: bool,
    pub early_clock_out_by: Option<i64>,
    pub clock_out_reason: Option<ClockOutReason>,
    pub clock_out_notes: Option<String>,
    pub worked_full_shift: bool,
    #[serde(default)]
    pub break_plan: BreakPlanStatus,
    /// Smallest shift-end warning threshold (minutes) already emitted.
    #[serde(default)]
    pub last_warning_minutes: Option<u32>,
    /// Break id an `AutoClockOutBlocked` alert was already raised for.
    #[serde(default)]
    pub blocked_alert_for: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    pub fn open(id: String, staff_id: String, clock_in: DateTime<Utc>) -> Self {
        Self {
            id,
            staff_id,
            clock_in,
            clock_out: None,
            total_hours: None,
            was_late: false,
            late_by: None,
            late_reason: None,
            was_early: false,
            early_by: None,
            was_early_clock_out: false,
            early_clock_out_by: None,
            clock_out_reason: None,
            clock_out_notes: None,
            worked_full_shift: false,
            break_plan: BreakPlanStatus::Pending,
            last_warning_minutes: None,
            blocked_alert_for: None,
            created_at: clock_in,
            updated_at: clock_in,
        }
    }

    pub fn is_open(&self) -> bool {
        self.clock_out.is_none()
    }
}
