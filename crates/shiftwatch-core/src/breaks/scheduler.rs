//! Day plan of scheduled breaks.
//!
//! A proposal is computed from the shift window and never persisted; a
//! commit validates the plan and stores it as Planned break rows.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::BreakRuntime;
use crate::error::{Result, ShiftError, ValidationError};
use crate::models::{Break, BreakPlanStatus, BreakType, TimeEntry};
use crate::schedule::{format_time_of_day, serde_time, ShiftWindow};
use crate::session::SessionManager;
use crate::storage::BreakDefaults;

/// One break window in a plan, as local times of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBreak {
    pub break_type: BreakType,
    #[serde(with = "serde_time")]
    pub start: NaiveTime,
    #[serde(with = "serde_time")]
    pub end: NaiveTime,
}

impl PlannedBreak {
    pub fn new(break_type: BreakType, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            break_type,
            start,
            end,
        }
    }

    /// Minutes from start to end, wrapping past midnight.
    pub fn duration_minutes(&self) -> i64 {
        let span = (self.end - self.start).num_minutes();
        if span < 0 {
            span + 24 * 60
        } else {
            span
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakPlan {
    pub time_entry_id: String,
    pub date: NaiveDate,
    pub breaks: Vec<PlannedBreak>,
}

#[derive(Clone)]
pub struct BreakScheduler {
    sessions: SessionManager,
    runtime: BreakRuntime,
    defaults: BreakDefaults,
}

impl BreakScheduler {
    pub fn new(sessions: SessionManager, runtime: BreakRuntime, defaults: BreakDefaults) -> Self {
        Self {
            sessions,
            runtime,
            defaults,
        }
    }

    /// Default Morning, Lunch and Afternoon windows for the entry's shift.
    ///
    /// Morning starts a fixed offset after shift start, Lunch is centred on
    /// the shift midpoint and Afternoon starts a fixed lead before shift end.
    /// Windows that fall outside the shift, overlap an earlier window or
    /// start before `now` are left out.
    pub fn propose(&self, time_entry_id: &str, now: DateTime<Utc>) -> Result<BreakPlan> {
        let (entry, window) = self.entry_and_window(time_entry_id)?;
        let d = &self.defaults;
        let half_shift = Duration::minutes(window.duration().num_minutes() / 2);
        let candidates = [
            (
                BreakType::Morning,
                window.start + Duration::minutes(d.morning_offset_minutes),
                d.morning_minutes,
            ),
            (
                BreakType::Lunch,
                window.start + half_shift - Duration::minutes(d.lunch_minutes / 2),
                d.lunch_minutes,
            ),
            (
                BreakType::Afternoon,
                window.end - Duration::minutes(d.afternoon_lead_minutes),
                d.afternoon_minutes,
            ),
        ];

        let zone = self.sessions.zone();
        let mut kept: Vec<(DateTime<Utc>, DateTime<Utc>, BreakType)> = Vec::new();
        for (break_type, start, minutes) in candidates {
            let end = start + Duration::minutes(minutes);
            let fits = minutes > 0 && start >= window.start && end <= window.end && start >= now;
            let clashes = kept.iter().any(|(s, e, _)| start < *e && *s < end);
            if fits && !clashes {
                kept.push((start, end, break_type));
            }
        }
        kept.sort_by_key(|(start, _, _)| *start);

        let breaks = kept
            .into_iter()
            .map(|(start, end, break_type)| {
                PlannedBreak::new(
                    break_type,
                    whole_minute(zone.time_of_day(start)),
                    whole_minute(zone.time_of_day(end)),
                )
            })
            .collect();
        Ok(BreakPlan {
            time_entry_id: entry.id,
            date: window.date,
            breaks,
        })
    }

    /// Validate and store a plan, then mark the entry's breaks as scheduled.
    ///
    /// # Errors
    ///
    /// `BreaksAlreadyScheduled` once a plan was committed or skipped,
    /// a `ValidationError` for empty, reversed, overlapping or out-of-shift
    /// windows and for Away items.
    pub fn commit(&self, plan: &BreakPlan, now: DateTime<Utc>) -> Result<Vec<Break>> {
        let (entry, window) = self.entry_and_window(&plan.time_entry_id)?;
        let existing = self.runtime.breaks_for(&entry.id)?;
        if entry.break_plan != BreakPlanStatus::Pending
            || existing.iter().any(|b| b.scheduled_start.is_some())
        {
            return Err(ShiftError::BreaksAlreadyScheduled(entry.id).into());
        }
        self.validate(plan, &window)?;

        let rows = self.runtime.create_planned(&entry.id, &plan.breaks, now)?;
        self.sessions
            .set_break_plan(&entry.id, BreakPlanStatus::Scheduled, now)?;
        info!(
            staff_id = %entry.staff_id,
            time_entry_id = %entry.id,
            count = rows.len(),
            "break plan committed"
        );
        Ok(rows)
    }

    /// Decline the day's plan. Ad-hoc breaks stay available.
    pub fn skip(&self, time_entry_id: &str, now: DateTime<Utc>) -> Result<TimeEntry> {
        let entry = self.sessions.entry(time_entry_id)?;
        if !entry.is_open() {
            return Err(ShiftError::TimeEntryClosed(entry.id).into());
        }
        if entry.break_plan != BreakPlanStatus::Pending {
            return Err(ShiftError::BreaksAlreadyScheduled(entry.id).into());
        }
        let entry = self
            .sessions
            .set_break_plan(time_entry_id, BreakPlanStatus::Skipped, now)?;
        info!(staff_id = %entry.staff_id, time_entry_id, "break plan skipped");
        Ok(entry)
    }

    fn validate(&self, plan: &BreakPlan, window: &ShiftWindow) -> Result<()> {
        let zone = self.sessions.zone();
        let mut spans = Vec::with_capacity(plan.breaks.len());
        for item in &plan.breaks {
            if item.break_type == BreakType::Away {
                return Err(ValidationError::InvalidValue {
                    field: "break_type".into(),
                    message: "away breaks cannot be planned".into(),
                }
                .into());
            }
            if item.start == item.end {
                return Err(range_error(item).into());
            }
            // First occurrence of the start time within the shift.
            let mut start = zone.at(window.date, item.start);
            if start < window.start {
                start += Duration::days(1);
            }
            let end = start + Duration::minutes(item.duration_minutes());
            if start < window.start || end > window.end {
                return Err(ValidationError::InvalidValue {
                    field: format!("{} break", item.break_type),
                    message: format!(
                        "{} - {} is outside the shift",
                        format_time_of_day(item.start),
                        format_time_of_day(item.end)
                    ),
                }
                .into());
            }
            spans.push((start, end, item));
        }

        spans.sort_by_key(|(start, _, _)| *start);
        for pair in spans.windows(2) {
            let (_, first_end, first) = pair[0];
            let (second_start, _, second) = pair[1];
            if second_start < first_end {
                return Err(ValidationError::OverlappingBreaks {
                    first: describe(first),
                    second: describe(second),
                }
                .into());
            }
        }
        Ok(())
    }

    fn entry_and_window(&self, time_entry_id: &str) -> Result<(TimeEntry, ShiftWindow)> {
        let entry = self.sessions.entry(time_entry_id)?;
        if !entry.is_open() {
            return Err(ShiftError::TimeEntryClosed(entry.id).into());
        }
        match self.sessions.shift_window_for(&entry)? {
            Some(window) => Ok((entry, window)),
            None => Err(ShiftError::NoWorkdaySchedule {
                date: self.sessions.zone().today(entry.clock_in),
                staff_id: entry.staff_id,
            }
            .into()),
        }
    }
}

fn whole_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

fn range_error(item: &PlannedBreak) -> ValidationError {
    ValidationError::InvalidTimeRange {
        start: format_time_of_day(item.start),
        end: format_time_of_day(item.end),
    }
}

fn describe(item: &PlannedBreak) -> String {
    format!(
        "{} {}-{}",
        item.break_type,
        format_time_of_day(item.start),
        format_time_of_day(item.end)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LocalZone;
    use crate::schedule::{MemoryScheduleStore, WeeklySchedule};
    use crate::storage::MemoryRepository;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn setup() -> (BreakScheduler, SessionManager, TimeEntry) {
        let repo = Arc::new(MemoryRepository::new());
        let schedules = Arc::new(MemoryScheduleStore::with_fallback(WeeklySchedule::standard(
            t(9, 0),
            t(18, 0),
        )));
        let sessions = SessionManager::new(repo.clone(), schedules, LocalZone::utc());
        let runtime = BreakRuntime::new(repo, LocalZone::utc(), BreakDefaults::default());
        let scheduler = BreakScheduler::new(sessions.clone(), runtime, BreakDefaults::default());
        let entry = sessions.clock_in("alice", at(9, 0)).unwrap();
        (scheduler, sessions, entry)
    }

    #[test]
    fn proposes_three_breaks_for_a_standard_day() {
        let (scheduler, _, entry) = setup();
        let plan = scheduler.propose(&entry.id, at(9, 0)).unwrap();
        assert_eq!(
            plan.breaks,
            vec![
                PlannedBreak::new(BreakType::Morning, t(11, 0), t(11, 15)),
                PlannedBreak::new(BreakType::Lunch, t(13, 0), t(14, 0)),
                PlannedBreak::new(BreakType::Afternoon, t(16, 0), t(16, 15)),
            ]
        );
    }

    #[test]
    fn proposal_drops_windows_already_past() {
        let (scheduler, _, entry) = setup();
        let plan = scheduler.propose(&entry.id, at(12, 0)).unwrap();
        let types: Vec<_> = plan.breaks.iter().map(|b| b.break_type).collect();
        assert_eq!(types, vec![BreakType::Lunch, BreakType::Afternoon]);
    }

    #[test]
    fn commit_stores_planned_rows_and_marks_entry() {
        let (scheduler, sessions, entry) = setup();
        let plan = scheduler.propose(&entry.id, at(9, 0)).unwrap();
        let rows = scheduler.commit(&plan, at(9, 1)).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|b| b.actual_start.is_none()));
        assert_eq!(rows[1].duration_minutes, 60);
        assert_eq!(
            sessions.entry(&entry.id).unwrap().break_plan,
            BreakPlanStatus::Scheduled
        );

        let again = scheduler.commit(&plan, at(9, 2)).unwrap_err();
        assert!(again.is_conflict());
    }

    #[test]
    fn commit_rejects_overlap_without_writing() {
        let (scheduler, sessions, entry) = setup();
        let plan = BreakPlan {
            time_entry_id: entry.id.clone(),
            date: entry.clock_in.date_naive(),
            breaks: vec![
                PlannedBreak::new(BreakType::Lunch, t(12, 0), t(13, 0)),
                PlannedBreak::new(BreakType::Afternoon, t(12, 45), t(13, 0)),
            ],
        };
        let err = scheduler.commit(&plan, at(9, 1)).unwrap_err();
        assert!(err.is_validation());
        assert!(sessions
            .repository()
            .breaks_for_entry(&entry.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn commit_rejects_out_of_shift_and_away_items() {
        let (scheduler, _, entry) = setup();
        for item in [
            PlannedBreak::new(BreakType::Lunch, t(17, 30), t(18, 30)),
            PlannedBreak::new(BreakType::Away, t(12, 0), t(12, 30)),
            PlannedBreak::new(BreakType::Morning, t(10, 0), t(10, 0)),
        ] {
            let plan = BreakPlan {
                time_entry_id: entry.id.clone(),
                date: entry.clock_in.date_naive(),
                breaks: vec![item],
            };
            assert!(scheduler.commit(&plan, at(9, 1)).unwrap_err().is_validation());
        }
    }

    #[test]
    fn skip_only_once() {
        let (scheduler, _, entry) = setup();
        let skipped = scheduler.skip(&entry.id, at(9, 5)).unwrap();
        assert_eq!(skipped.break_plan, BreakPlanStatus::Skipped);
        assert!(scheduler.skip(&entry.id, at(9, 6)).is_err());
        let plan = scheduler.propose(&entry.id, at(9, 6)).unwrap();
        assert!(scheduler.commit(&plan, at(9, 7)).is_err());
    }

    #[test]
    fn no_plan_on_a_day_off() {
        let (scheduler, sessions, _) = setup();
        let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let entry = sessions.clock_in("bob", saturday).unwrap();
        assert!(matches!(
            scheduler.propose(&entry.id, saturday).unwrap_err(),
            crate::CoreError::Shift(ShiftError::NoWorkdaySchedule { .. })
        ));
    }

    #[test]
    fn plan_serializes_boundaries_as_clock_strings() {
        let item = PlannedBreak::new(BreakType::Lunch, t(12, 0), t(13, 0));
        let json = serde_json::to_value(item).unwrap();
        assert_eq!(json["start"], "12:00 PM");
        assert_eq!(json["end"], "1:00 PM");
        assert_eq!(json["break_type"], "lunch");
    }
}
