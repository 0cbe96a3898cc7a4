use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::serde_time_opt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakType {
    Morning,
    Lunch,
    Afternoon,
    /// Ad hoc; requires a reason and never has scheduled times.
    Away,
}

impl BreakType {
    pub const SCHEDULED: [BreakType; 3] = [BreakType::Morning, BreakType::Lunch, BreakType::Afternoon];

    pub fn is_scheduled_type(&self) -> bool {
        !matches!(self, BreakType::Away)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakType::Morning => "morning",
            BreakType::Lunch => "lunch",
            BreakType::Afternoon => "afternoon",
            BreakType::Away => "away",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "morning" => Some(BreakType::Morning),
            "lunch" => Some(BreakType::Lunch),
            "afternoon" => Some(BreakType::Afternoon),
            "away" => Some(BreakType::Away),
            _ => None,
        }
    }
}

impl fmt::Display for BreakType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a break is in its lifecycle. Derived from the persisted fields,
/// never stored.
///
/// ```text
/// Planned -> Active -> Ended
///              |  ^
///              v  |  (once)
///             Paused -> Ended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakState {
    Planned,
    Active,
    Paused,
    Ended,
}

impl fmt::Display for BreakState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakState::Planned => "planned",
            BreakState::Active => "active",
            BreakState::Paused => "paused",
            BreakState::Ended => "ended",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakAction {
    Start,
    Pause,
    Resume,
    End,
}

impl fmt::Display for BreakAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakAction::Start => "start",
            BreakAction::Pause => "pause",
            BreakAction::Resume => "resume",
            BreakAction::End => "end",
        })
    }
}

/// A bounded pause within a time entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Break {
    pub id: String,
    pub time_entry_id: String,
    pub break_type: BreakType,
    #[serde(default, with = "serde_time_opt")]
    pub scheduled_start: Option<NaiveTime>,
    #[serde(default, with = "serde_time_opt")]
    pub scheduled_end: Option<NaiveTime>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    /// Planned length in minutes.
    pub duration_minutes: i64,
    /// Counted active seconds, excluding the paused gap. Set on end.
    pub active_secs: Option<i64>,
    pub is_paused: bool,
    /// Seconds left on the countdown when the pause began.
    pub paused_duration: Option<i64>,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub pause_used: bool,
    pub is_late: bool,
    pub late_by: Option<i64>,
    pub away_reason: Option<String>,
    #[serde(default)]
    pub auto_started: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Break {
    /// A scheduled break that has not started yet.
    pub fn planned(
        id: String,
        time_entry_id: String,
        break_type: BreakType,
        scheduled_start: NaiveTime,
        scheduled_end: NaiveTime,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            scheduled_start: Some(scheduled_start),
            scheduled_end: Some(scheduled_end),
            ..Self::blank(id, time_entry_id, break_type, duration_minutes, now)
        }
    }

    /// An unscheduled break row; the caller starts it immediately.
    pub fn ad_hoc(
        id: String,
        time_entry_id: String,
        break_type: BreakType,
        duration_minutes: i64,
        away_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            away_reason,
            ..Self::blank(id, time_entry_id, break_type, duration_minutes, now)
        }
    }

    fn blank(
        id: String,
        time_entry_id: String,
        break_type: BreakType,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            time_entry_id,
            break_type,
            scheduled_start: None,
            scheduled_end: None,
            actual_start: None,
            actual_end: None,
            duration_minutes,
            active_secs: None,
            is_paused: false,
            paused_duration: None,
            paused_at: None,
            resumed_at: None,
            pause_used: false,
            is_late: false,
            late_by: None,
            away_reason: None,
            auto_started: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> BreakState {
        match (self.actual_start, self.actual_end) {
            (None, _) => BreakState::Planned,
            (Some(_), Some(_)) => BreakState::Ended,
            (Some(_), None) if self.is_paused => BreakState::Paused,
            (Some(_), None) => BreakState::Active,
        }
    }

    /// Started and not yet ended (Active or Paused).
    pub fn is_unresolved(&self) -> bool {
        self.actual_start.is_some() && self.actual_end.is_none()
    }

    pub fn planned_secs(&self) -> i64 {
        self.duration_minutes.saturating_mul(60)
    }

    /// Active seconds up to `now` (or the end), excluding the paused gap.
    pub fn active_secs_at(&self, now: DateTime<Utc>) -> i64 {
        let Some(start) = self.actual_start else {
            return 0;
        };
        let until = self.actual_end.unwrap_or(now);
        let secs = match (self.paused_at, self.resumed_at) {
            (Some(paused), Some(resumed)) => {
                (paused - start).num_seconds() + (until - resumed).num_seconds()
            }
            (Some(paused), None) => (paused - start).num_seconds(),
            (None, _) => (until - start).num_seconds(),
        };
        secs.max(0)
    }

    /// Seconds spent paused up to `now` (or the end).
    pub fn paused_gap_secs_at(&self, now: DateTime<Utc>) -> i64 {
        let Some(paused) = self.paused_at else {
            return 0;
        };
        let until = self.resumed_at.or(self.actual_end).unwrap_or(now);
        (until - paused).num_seconds().max(0)
    }

    /// Countdown remaining; negative once the break overruns.
    pub fn remaining_secs_at(&self, now: DateTime<Utc>) -> i64 {
        self.planned_secs() - self.active_secs_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn lunch() -> Break {
        Break::planned(
            "b1".into(),
            "e1".into(),
            BreakType::Lunch,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            60,
            noon(),
        )
    }

    #[test]
    fn state_follows_fields() {
        let mut b = lunch();
        assert_eq!(b.state(), BreakState::Planned);
        b.actual_start = Some(noon());
        assert_eq!(b.state(), BreakState::Active);
        b.is_paused = true;
        assert_eq!(b.state(), BreakState::Paused);
        b.actual_end = Some(noon() + Duration::minutes(30));
        assert_eq!(b.state(), BreakState::Ended);
    }

    #[test]
    fn paused_gap_is_not_counted() {
        let mut b = lunch();
        b.actual_start = Some(noon());
        b.paused_at = Some(noon() + Duration::minutes(10));
        b.resumed_at = Some(noon() + Duration::minutes(40));
        let end = noon() + Duration::minutes(65);
        assert_eq!(b.active_secs_at(end), 35 * 60);
        assert_eq!(b.paused_gap_secs_at(end), 30 * 60);
        assert_eq!(b.remaining_secs_at(end), 25 * 60);
    }

    #[test]
    fn countdown_freezes_while_paused() {
        let mut b = lunch();
        b.actual_start = Some(noon());
        b.paused_at = Some(noon() + Duration::minutes(10));
        b.is_paused = true;
        let much_later = noon() + Duration::hours(3);
        assert_eq!(b.remaining_secs_at(much_later), 50 * 60);
    }

    #[test]
    fn break_type_round_trips_through_str() {
        for t in [BreakType::Morning, BreakType::Lunch, BreakType::Afternoon, BreakType::Away] {
            assert_eq!(BreakType::parse(t.as_str()), Some(t));
        }
        assert!(!BreakType::Away.is_scheduled_type());
    }
}
