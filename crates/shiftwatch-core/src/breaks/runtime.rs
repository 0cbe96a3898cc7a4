//! Break state machine.
//!
//! ```text
//! Planned ──start──► Active ──end──► Ended
//!                     │  ▲
//!               pause │  │ resume      (one pause per break)
//!                     ▼  │
//!                    Paused ──end──► Ended
//! ```
//!
//! Away breaks have no Planned row; they are created already Active.
//! `BreakRuntime` is the only writer of break rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::PlannedBreak;
use crate::clock::LocalZone;
use crate::error::{Result, ShiftError, ValidationError};
use crate::models::{minutes_ceil, Break, BreakAction, BreakState, BreakType, TimeEntry};
use crate::storage::{BreakDefaults, Repository};

/// Arguments of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartBreak {
    /// A specific Planned row to start. Without one, a scheduled type adopts
    /// its Planned row if the day has one.
    pub break_id: Option<String>,
    pub break_type: BreakType,
    pub away_reason: Option<String>,
}

impl StartBreak {
    pub fn of_type(break_type: BreakType) -> Self {
        Self {
            break_id: None,
            break_type,
            away_reason: None,
        }
    }

    pub fn away(reason: impl Into<String>) -> Self {
        Self {
            break_id: None,
            break_type: BreakType::Away,
            away_reason: Some(reason.into()),
        }
    }

    pub fn planned(break_id: impl Into<String>, break_type: BreakType) -> Self {
        Self {
            break_id: Some(break_id.into()),
            break_type,
            away_reason: None,
        }
    }
}

#[derive(Clone)]
pub struct BreakRuntime {
    repo: Arc<dyn Repository>,
    zone: LocalZone,
    defaults: BreakDefaults,
}

impl BreakRuntime {
    pub fn new(repo: Arc<dyn Repository>, zone: LocalZone, defaults: BreakDefaults) -> Self {
        Self {
            repo,
            zone,
            defaults,
        }
    }

    pub fn breaks_for(&self, time_entry_id: &str) -> Result<Vec<Break>> {
        self.repo.breaks_for_entry(time_entry_id)
    }

    /// The entry's Active or Paused break, if any.
    pub fn unresolved(&self, time_entry_id: &str) -> Result<Option<Break>> {
        Ok(self
            .repo
            .breaks_for_entry(time_entry_id)?
            .into_iter()
            .find(Break::is_unresolved))
    }

    pub fn get(&self, break_id: &str) -> Result<Break> {
        self.repo
            .break_by_id(break_id)?
            .ok_or_else(|| ShiftError::BreakNotFound(break_id.to_string()).into())
    }

    /// Persist a committed plan as Planned rows, all or nothing.
    pub fn create_planned(
        &self,
        time_entry_id: &str,
        items: &[PlannedBreak],
        now: DateTime<Utc>,
    ) -> Result<Vec<Break>> {
        self.open_entry(time_entry_id)?;
        let rows: Vec<Break> = items
            .iter()
            .map(|item| {
                Break::planned(
                    Uuid::new_v4().to_string(),
                    time_entry_id.to_string(),
                    item.break_type,
                    item.start,
                    item.end,
                    item.duration_minutes(),
                    now,
                )
            })
            .collect();
        self.repo.insert_breaks(&rows)?;
        debug!(time_entry_id, count = rows.len(), "planned breaks stored");
        Ok(rows)
    }

    /// Start a break on behalf of the staff member.
    ///
    /// # Errors
    ///
    /// `MissingAwayReason` for an Away break without a reason,
    /// `ConcurrentBreakExists` if another break is Active or Paused,
    /// `InvalidBreakTransition` if the named break is not Planned.
    pub fn start(
        &self,
        time_entry_id: &str,
        request: StartBreak,
        now: DateTime<Utc>,
    ) -> Result<Break> {
        self.start_inner(time_entry_id, request, false, now)
    }

    /// Start a Planned break because its scheduled minute arrived.
    pub fn auto_start(
        &self,
        time_entry_id: &str,
        planned: &Break,
        now: DateTime<Utc>,
    ) -> Result<Break> {
        self.start_inner(
            time_entry_id,
            StartBreak::planned(planned.id.clone(), planned.break_type),
            true,
            now,
        )
    }

    fn start_inner(
        &self,
        time_entry_id: &str,
        request: StartBreak,
        auto_started: bool,
        now: DateTime<Utc>,
    ) -> Result<Break> {
        let away_reason = request
            .away_reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if request.break_type == BreakType::Away && away_reason.is_none() {
            return Err(ShiftError::MissingAwayReason.into());
        }

        let entry = self.open_entry(time_entry_id)?;
        let breaks = self.repo.breaks_for_entry(&entry.id)?;
        if let Some(active) = breaks.iter().find(|b| b.is_unresolved()) {
            return Err(ShiftError::ConcurrentBreakExists {
                time_entry_id: entry.id.clone(),
                break_id: active.id.clone(),
            }
            .into());
        }

        let existing = match request.break_id.as_deref() {
            Some(id) => {
                let found = breaks
                    .iter()
                    .find(|b| b.id == id)
                    .ok_or_else(|| ShiftError::BreakNotFound(id.to_string()))?;
                if found.state() != BreakState::Planned {
                    return Err(ShiftError::InvalidBreakTransition {
                        from: found.state(),
                        action: BreakAction::Start,
                    }
                    .into());
                }
                if found.break_type != request.break_type {
                    return Err(ValidationError::InvalidValue {
                        field: "break_type".into(),
                        message: format!(
                            "break {id} is a {} break, not {}",
                            found.break_type, request.break_type
                        ),
                    }
                    .into());
                }
                Some(found.clone())
            }
            None if request.break_type.is_scheduled_type() => breaks
                .iter()
                .find(|b| b.break_type == request.break_type && b.state() == BreakState::Planned)
                .cloned(),
            None => None,
        };

        let is_new = existing.is_none();
        let mut brk = existing.unwrap_or_else(|| {
            let reason = if request.break_type == BreakType::Away {
                away_reason
            } else {
                None
            };
            Break::ad_hoc(
                Uuid::new_v4().to_string(),
                entry.id.clone(),
                request.break_type,
                self.defaults.minutes_for(request.break_type),
                reason,
                now,
            )
        });

        brk.actual_start = Some(now);
        brk.auto_started = auto_started;
        if let Some(scheduled_start) = brk.scheduled_start {
            let due = self.on_shift(&entry, scheduled_start);
            if now > due {
                brk.is_late = true;
                brk.late_by = Some(minutes_ceil(now - due));
            }
        }
        let seen = std::mem::replace(&mut brk.updated_at, now);

        if is_new {
            self.repo.insert_break(&brk)?;
        } else {
            self.repo.update_break(&brk, seen)?;
        }
        info!(
            staff_id = %entry.staff_id,
            time_entry_id = %entry.id,
            break_id = %brk.id,
            break_type = %brk.break_type,
            auto_started,
            late_by = ?brk.late_by,
            "break started"
        );
        Ok(brk)
    }

    /// Freeze the countdown. Each break may be paused once.
    pub fn pause(&self, break_id: &str, now: DateTime<Utc>) -> Result<Break> {
        let mut brk = self.get(break_id)?;
        match brk.state() {
            BreakState::Planned | BreakState::Ended => {
                return Err(invalid(brk.state(), BreakAction::Pause));
            }
            _ if brk.pause_used => {
                warn!(break_id, "second pause rejected");
                return Err(ShiftError::PauseAlreadyUsed {
                    break_id: brk.id,
                }
                .into());
            }
            BreakState::Paused => return Err(invalid(BreakState::Paused, BreakAction::Pause)),
            BreakState::Active => {}
        }

        brk.paused_duration = Some(brk.remaining_secs_at(now).max(0));
        brk.paused_at = Some(now);
        brk.is_paused = true;
        brk.pause_used = true;
        let seen = std::mem::replace(&mut brk.updated_at, now);
        self.repo.update_break(&brk, seen)?;
        info!(break_id, remaining_secs = ?brk.paused_duration, "break paused");
        Ok(brk)
    }

    /// Continue counting down from the remaining time at the pause.
    pub fn resume(&self, break_id: &str, now: DateTime<Utc>) -> Result<Break> {
        let mut brk = self.get(break_id)?;
        if brk.state() != BreakState::Paused {
            return Err(invalid(brk.state(), BreakAction::Resume));
        }
        brk.resumed_at = Some(now);
        brk.is_paused = false;
        let seen = std::mem::replace(&mut brk.updated_at, now);
        self.repo.update_break(&brk, seen)?;
        info!(break_id, "break resumed");
        Ok(brk)
    }

    /// Finish a break from Active or Paused.
    ///
    /// The break is late when it ends after its deadline: the scheduled end
    /// (or start plus planned length for unscheduled breaks) pushed back by
    /// the time spent paused. Away breaks are never late.
    pub fn end(&self, break_id: &str, now: DateTime<Utc>) -> Result<Break> {
        let mut brk = self.get(break_id)?;
        let Some(actual_start) = brk.actual_start.filter(|_| brk.is_unresolved()) else {
            return Err(invalid(brk.state(), BreakAction::End));
        };

        let end = now.max(actual_start);
        brk.actual_end = Some(end);
        brk.active_secs = Some(brk.active_secs_at(end));
        brk.is_paused = false;

        if brk.break_type != BreakType::Away {
            let deadline =
                self.deadline(&brk, actual_start) + Duration::seconds(brk.paused_gap_secs_at(end));
            if end > deadline {
                brk.is_late = true;
                brk.late_by = Some(minutes_ceil(end - deadline));
            }
        }
        let seen = std::mem::replace(&mut brk.updated_at, now);
        self.repo.update_break(&brk, seen)?;
        info!(
            break_id,
            active_secs = ?brk.active_secs,
            is_late = brk.is_late,
            late_by = ?brk.late_by,
            "break ended"
        );
        Ok(brk)
    }

    fn deadline(&self, brk: &Break, actual_start: DateTime<Utc>) -> DateTime<Utc> {
        match (brk.scheduled_start, brk.scheduled_end) {
            (Some(start), Some(end)) => {
                let mut deadline = self.resolve(actual_start, end);
                if end <= start && deadline < actual_start {
                    deadline += Duration::days(1);
                }
                deadline
            }
            _ => actual_start + Duration::seconds(brk.planned_secs()),
        }
    }

    /// A scheduled time of day placed in the shift `entry` belongs to: the
    /// occurrence within twelve hours of clock-in, so overnight shifts read
    /// times after midnight as the next day.
    fn on_shift(&self, entry: &TimeEntry, time: NaiveTime) -> DateTime<Utc> {
        let at = self.resolve(entry.clock_in, time);
        let half_day = Duration::hours(12);
        if at < entry.clock_in - half_day {
            at + Duration::days(1)
        } else if at >= entry.clock_in + half_day {
            at - Duration::days(1)
        } else {
            at
        }
    }

    /// A time of day on the local date of `anchor`.
    fn resolve(&self, anchor: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
        self.zone.at(self.zone.today(anchor), time)
    }

    fn open_entry(&self, time_entry_id: &str) -> Result<TimeEntry> {
        let entry = self
            .repo
            .time_entry(time_entry_id)?
            .ok_or_else(|| ShiftError::TimeEntryNotFound(time_entry_id.to_string()))?;
        if !entry.is_open() {
            return Err(ShiftError::TimeEntryClosed(entry.id).into());
        }
        Ok(entry)
    }
}

fn invalid(from: BreakState, action: BreakAction) -> crate::error::CoreError {
    ShiftError::InvalidBreakTransition { from, action }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRepository;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn setup() -> (BreakRuntime, Arc<MemoryRepository>, TimeEntry) {
        let repo = Arc::new(MemoryRepository::new());
        let entry = TimeEntry::open("e1".into(), "alice".into(), at(9, 0));
        repo.insert_time_entry(&entry).unwrap();
        let runtime = BreakRuntime::new(repo.clone(), LocalZone::utc(), BreakDefaults::default());
        (runtime, repo, entry)
    }

    fn plan_lunch(runtime: &BreakRuntime) -> Break {
        runtime
            .create_planned(
                "e1",
                &[PlannedBreak::new(BreakType::Lunch, t(12, 0), t(13, 0))],
                at(9, 30),
            )
            .unwrap()
            .remove(0)
    }

    #[test]
    fn pause_resume_end_excludes_paused_gap() {
        let (runtime, _, _) = setup();
        let lunch = plan_lunch(&runtime);
        runtime.start("e1", StartBreak::of_type(BreakType::Lunch), at(12, 0)).unwrap();

        let paused = runtime.pause(&lunch.id, at(12, 10)).unwrap();
        assert_eq!(paused.paused_duration, Some(50 * 60));
        assert!(paused.pause_used && paused.is_paused);

        runtime.resume(&lunch.id, at(12, 40)).unwrap();
        let ended = runtime.end(&lunch.id, at(13, 5)).unwrap();
        assert_eq!(ended.active_secs, Some(35 * 60));
        assert!(!ended.is_late);
    }

    #[test]
    fn lateness_boundary_includes_paused_gap() {
        for (end_at, late) in [(at(13, 30), None), (at(13, 31), Some(1))] {
            let (runtime, _, _) = setup();
            let lunch = plan_lunch(&runtime);
            runtime.start("e1", StartBreak::of_type(BreakType::Lunch), at(12, 0)).unwrap();
            runtime.pause(&lunch.id, at(12, 10)).unwrap();
            runtime.resume(&lunch.id, at(12, 40)).unwrap();
            let ended = runtime.end(&lunch.id, end_at).unwrap();
            assert_eq!(ended.is_late, late.is_some());
            assert_eq!(ended.late_by, late);
        }
    }

    #[test]
    fn second_pause_fails_and_leaves_row_unchanged() {
        let (runtime, repo, _) = setup();
        let lunch = plan_lunch(&runtime);
        runtime.start("e1", StartBreak::of_type(BreakType::Lunch), at(12, 0)).unwrap();
        runtime.pause(&lunch.id, at(12, 10)).unwrap();
        runtime.resume(&lunch.id, at(12, 20)).unwrap();

        let before = repo.break_by_id(&lunch.id).unwrap();
        let err = runtime.pause(&lunch.id, at(12, 30)).unwrap_err();
        assert!(matches!(
            err,
            crate::CoreError::Shift(ShiftError::PauseAlreadyUsed { .. })
        ));
        assert_eq!(repo.break_by_id(&lunch.id).unwrap(), before);
    }

    #[test]
    fn ending_while_paused_counts_time_before_pause() {
        let (runtime, _, _) = setup();
        let brk = runtime.start("e1", StartBreak::of_type(BreakType::Morning), at(11, 0)).unwrap();
        runtime.pause(&brk.id, at(11, 5)).unwrap();
        let ended = runtime.end(&brk.id, at(11, 50)).unwrap();
        assert_eq!(ended.active_secs, Some(5 * 60));
        assert_eq!(ended.state(), BreakState::Ended);
        assert!(!ended.is_late);
    }

    #[test]
    fn late_start_is_recorded() {
        let (runtime, _, _) = setup();
        plan_lunch(&runtime);
        let started = runtime
            .start("e1", StartBreak::of_type(BreakType::Lunch), at(12, 7))
            .unwrap();
        assert!(started.is_late);
        assert_eq!(started.late_by, Some(7));
    }

    #[test]
    fn away_without_reason_creates_nothing() {
        let (runtime, repo, _) = setup();
        let err = runtime
            .start("e1", StartBreak::away("   "), at(10, 0))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(repo.breaks_for_entry("e1").unwrap().is_empty());
    }

    #[test]
    fn away_breaks_are_unlimited_and_never_late() {
        let (runtime, _, _) = setup();
        for hour in [10, 14] {
            let away = runtime
                .start("e1", StartBreak::away("errand"), at(hour, 0))
                .unwrap();
            assert_eq!(away.away_reason.as_deref(), Some("errand"));
            let ended = runtime.end(&away.id, at(hour, 50)).unwrap();
            assert!(!ended.is_late);
        }
        assert_eq!(runtime.breaks_for("e1").unwrap().len(), 2);
    }

    #[test]
    fn concurrent_break_is_rejected() {
        let (runtime, _, _) = setup();
        runtime.start("e1", StartBreak::away("call"), at(10, 0)).unwrap();
        let err = runtime
            .start("e1", StartBreak::of_type(BreakType::Morning), at(10, 5))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn unscheduled_break_uses_default_length_for_lateness() {
        let (runtime, _, _) = setup();
        let brk = runtime
            .start("e1", StartBreak::of_type(BreakType::Afternoon), at(15, 0))
            .unwrap();
        assert_eq!(brk.duration_minutes, 15);
        assert!(brk.scheduled_start.is_none());
        let ended = runtime.end(&brk.id, at(15, 17)).unwrap();
        assert_eq!(ended.late_by, Some(2));
    }

    #[test]
    fn transitions_from_wrong_state_fail() {
        let (runtime, _, _) = setup();
        let lunch = plan_lunch(&runtime);
        assert!(runtime.pause(&lunch.id, at(11, 0)).is_err());
        assert!(runtime.resume(&lunch.id, at(11, 0)).is_err());
        assert!(runtime.end(&lunch.id, at(11, 0)).is_err());

        runtime.start("e1", StartBreak::planned(lunch.id.clone(), BreakType::Lunch), at(12, 0)).unwrap();
        assert!(runtime.resume(&lunch.id, at(12, 1)).is_err());
        runtime.end(&lunch.id, at(12, 30)).unwrap();
        let err = runtime
            .start("e1", StartBreak::planned(lunch.id.clone(), BreakType::Lunch), at(12, 31))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::CoreError::Shift(ShiftError::InvalidBreakTransition {
                from: BreakState::Ended,
                action: BreakAction::Start
            })
        ));
    }

    #[test]
    fn closed_entry_rejects_breaks() {
        let (runtime, repo, mut entry) = setup();
        entry.clock_out = Some(at(17, 0));
        repo.update_time_entry(&entry, entry.updated_at).unwrap();
        let err = runtime
            .start("e1", StartBreak::away("late errand"), at(17, 30))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    fn overnight() -> BreakRuntime {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert_time_entry(&TimeEntry::open("e1".into(), "alice".into(), at(22, 0)))
            .unwrap();
        let runtime = BreakRuntime::new(repo, LocalZone::utc(), BreakDefaults::default());
        runtime
            .create_planned(
                "e1",
                &[
                    PlannedBreak::new(BreakType::Morning, t(23, 50), t(23, 59)),
                    PlannedBreak::new(BreakType::Lunch, t(0, 10), t(0, 40)),
                ],
                at(22, 0),
            )
            .unwrap();
        runtime
    }

    #[test]
    fn overnight_break_before_midnight_is_on_time() {
        let runtime = overnight();
        let lunch = runtime
            .start("e1", StartBreak::of_type(BreakType::Lunch), at(23, 55))
            .unwrap();
        assert!(!lunch.is_late);
        assert_eq!(lunch.late_by, None);
    }

    #[test]
    fn overnight_break_started_after_midnight_is_late() {
        let runtime = overnight();
        let tuesday = at(0, 5) + Duration::days(1);
        let morning = runtime
            .start("e1", StartBreak::of_type(BreakType::Morning), tuesday)
            .unwrap();
        assert!(morning.is_late);
        assert_eq!(morning.late_by, Some(15));
    }

    #[test]
    fn sub_second_overrun_counts_as_a_late_minute() {
        let (runtime, _, _) = setup();
        let brk = runtime
            .start("e1", StartBreak::of_type(BreakType::Afternoon), at(15, 0))
            .unwrap();
        let ended = runtime
            .end(&brk.id, at(15, 15) + Duration::milliseconds(250))
            .unwrap();
        assert!(ended.is_late);
        assert_eq!(ended.late_by, Some(1));
    }
}
